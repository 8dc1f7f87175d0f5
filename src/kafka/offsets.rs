//! Watermarks, topic metadata aggregation and the start-offset planner.

use std::collections::BTreeMap;

use serde::Serialize;

/// Low = oldest retained offset, high = offset of the next message to be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionWatermarks {
    pub partition: i32,
    pub low: i64,
    pub high: i64,
}

impl PartitionWatermarks {
    pub fn new(partition: i32, low: i64, high: i64) -> Self {
        Self { partition, low, high }
    }

    /// Approximate: compaction and retention make the range inexact.
    pub fn message_count(&self) -> i64 {
        (self.high - self.low).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }
}

/// Where to seek one partition before reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionStart {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Computes per-partition start offsets that together approximate the last
/// `target_count` messages of a topic.
///
/// Every non-empty partition gets the same share, `ceil(target / non_empty)`,
/// clipped to its low watermark. Partitions with very different write rates
/// make the window skewed towards the slow ones; that is accepted.
pub fn plan(topic: &str, watermarks: &[PartitionWatermarks], target_count: usize) -> Vec<PartitionStart> {
    let non_empty: Vec<&PartitionWatermarks> = watermarks.iter().filter(|w| !w.is_empty()).collect();
    if non_empty.is_empty() || target_count == 0 {
        return Vec::new();
    }

    let share = target_count.div_ceil(non_empty.len()) as i64;

    non_empty
        .into_iter()
        .map(|w| PartitionStart {
            topic: topic.to_string(),
            partition: w.partition,
            offset: w.low.max(w.high - share),
        })
        .collect()
}

/// Like [`plan`], but slots a short partition cannot use are handed to the
/// partitions that still have older records, until `target_count` records are
/// covered or the topic runs out. Used to fill a buffer of fixed size.
pub fn plan_filled(topic: &str, watermarks: &[PartitionWatermarks], target_count: usize) -> Vec<PartitionStart> {
    // uncovered range of each partition shrinks from the top as rounds go by
    let mut uncovered: Vec<PartitionWatermarks> = watermarks.to_vec();
    let mut starts: BTreeMap<i32, i64> = BTreeMap::new();
    let mut left = target_count as i64;

    while left > 0 {
        let round = plan(topic, &uncovered, left as usize);
        if round.is_empty() {
            break;
        }
        for start in round {
            if let Some(w) = uncovered.iter_mut().find(|w| w.partition == start.partition) {
                left -= w.high - start.offset;
                w.high = start.offset;
            }
            starts.insert(start.partition, start.offset);
        }
    }

    starts
        .into_iter()
        .map(|(partition, offset)| PartitionStart {
            topic: topic.to_string(),
            partition,
            offset,
        })
        .collect()
}

// ========================================
// TOPIC METADATA
// ========================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionMetadata {
    pub partition: i32,
    pub high_watermark: String,
    pub low_watermark: String,
    pub message_count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMetadata {
    pub topic: String,
    pub partitions: Vec<PartitionMetadata>,
    pub total_messages: i64,
}

impl TopicMetadata {
    pub fn from_watermarks(topic: &str, watermarks: &[PartitionWatermarks]) -> Self {
        let mut partitions: Vec<PartitionMetadata> = watermarks
            .iter()
            .map(|w| PartitionMetadata {
                partition: w.partition,
                high_watermark: w.high.to_string(),
                low_watermark: w.low.to_string(),
                message_count: w.message_count(),
            })
            .collect();
        partitions.sort_by_key(|p| p.partition);

        let total_messages = partitions.iter().map(|p| p.message_count).sum();

        Self {
            topic: topic.to_string(),
            partitions,
            total_messages,
        }
    }
}
