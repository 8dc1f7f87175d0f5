//! Bounded collection: adapts an open-ended record stream to
//! "at most N records, within at most T".

use std::time::Duration;

use futures_util::{Stream, StreamExt};

use crate::error::{Result, ViewerError};
use crate::kafka::message::Message;

/// Why a collection finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    TargetReached,
    DeadlineElapsed,
    StreamEnded,
    Failed,
}

/// Result of feeding one item to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Returned exactly once, by the item that closed the latch.
    Completed,
    Ignored,
}

#[derive(Debug)]
pub struct Collected {
    pub messages: Vec<Message>,
    pub completion: Completion,
}

impl Collected {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Accumulates records until the target is reached or the collection is
/// completed from outside. Once the latch is closed every further item,
/// record or error, is ignored.
#[derive(Debug)]
pub struct BoundedCollector {
    target: usize,
    messages: Vec<Message>,
    latch: Option<Completion>,
    failure: Option<ViewerError>,
}

impl BoundedCollector {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            messages: Vec::with_capacity(target.min(1024)),
            latch: if target == 0 { Some(Completion::TargetReached) } else { None },
            failure: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.latch.is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn offer(&mut self, message: Message) -> Offer {
        if self.latch.is_some() {
            return Offer::Ignored;
        }
        self.messages.push(message);
        if self.messages.len() >= self.target {
            self.latch = Some(Completion::TargetReached);
            Offer::Completed
        } else {
            Offer::Accepted
        }
    }

    /// A failure after completion is swallowed.
    pub fn fail(&mut self, error: ViewerError) -> Offer {
        if self.latch.is_some() {
            tracing::debug!(error = %error, "Ignoring stream error after completion");
            return Offer::Ignored;
        }
        self.latch = Some(Completion::Failed);
        self.failure = Some(error);
        Offer::Completed
    }

    /// Closes the latch for a reason other than reaching the target.
    /// Returns false when it was already closed.
    pub fn complete(&mut self, reason: Completion) -> bool {
        if self.latch.is_some() {
            return false;
        }
        self.latch = Some(reason);
        true
    }

    pub fn finish(self) -> Result<Collected> {
        if let Some(error) = self.failure {
            return Err(error);
        }
        Ok(Collected {
            messages: self.messages,
            completion: self.latch.unwrap_or(Completion::DeadlineElapsed),
        })
    }
}

/// Pulls from `stream` until `target` records arrived or `deadline` elapsed,
/// whichever comes first. The deadline starts now.
///
/// On deadline the pending `next()` is dropped but the stream itself is left
/// intact, so an in-flight broker call simply continues for the next caller.
pub async fn collect<S>(stream: &mut S, target: usize, deadline: Duration) -> Result<Collected>
where
    S: Stream<Item = Result<Message>> + Unpin,
{
    let mut collector = BoundedCollector::new(target);
    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    while !collector.is_complete() {
        tokio::select! {
            biased;
            _ = &mut timer => {
                collector.complete(Completion::DeadlineElapsed);
            }
            item = stream.next() => match item {
                Some(Ok(message)) => {
                    collector.offer(message);
                }
                Some(Err(error)) => {
                    collector.fail(error);
                }
                None => {
                    collector.complete(Completion::StreamEnded);
                }
            },
        }
    }

    collector.finish()
}
