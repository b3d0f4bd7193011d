//! Record-level error channel
//!
//! A failing record never aborts its page. Each failure is counted and the
//! first few are kept verbatim for the run report.

use serde::{Deserialize, Serialize};

/// One sampled record failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Product guid as stored (may itself be the malformed value)
    pub guid: String,
    pub message: String,
}

/// Failure count plus a bounded sample of messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorChannel {
    pub count: usize,
    pub samples: Vec<RecordError>,
    #[serde(skip)]
    sample_limit: usize,
}

impl ErrorChannel {
    /// Create a channel keeping at most `sample_limit` messages
    pub fn new(sample_limit: usize) -> Self {
        Self {
            count: 0,
            samples: Vec::new(),
            sample_limit,
        }
    }

    /// Count a failure, sampling it while there is room
    pub fn record(&mut self, guid: impl Into<String>, message: impl Into<String>) {
        self.count += 1;
        if self.samples.len() < self.sample_limit {
            self.samples.push(RecordError {
                guid: guid.into(),
                message: message.into(),
            });
        }
    }

    /// Fold another channel (e.g. one page's) into this one
    pub fn merge(&mut self, other: ErrorChannel) {
        self.count += other.count;
        let room = self.sample_limit.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
