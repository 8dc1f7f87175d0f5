use crate::kafka::message::Message;

/// Orders messages newest-first by broker timestamp and keeps `count` of them.
///
/// Partitions are only ordered internally, so this is what turns "whatever the
/// partitions delivered" into a single most-recent view. The sort is stable:
/// equal timestamps keep their input order.
pub fn merge(mut messages: Vec<Message>, count: usize) -> Vec<Message> {
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    messages.truncate(count);
    messages
}
