// Batch completion policy: when a chat's batch has enough reports to flush.

use std::num::NonZeroUsize;

use crate::error::ConfigError;
use crate::tracker::Batch;

/// True iff the batch holds at least `required_count` distinct participants.
pub fn is_complete(batch: &Batch, required_count: usize) -> bool {
    batch.len() >= required_count
}

/// Quorum configured for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
    required_count: NonZeroUsize,
}

impl CompletionPolicy {
    pub fn new(required_count: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(required_count)
            .map(|required_count| Self { required_count })
            .ok_or_else(|| ConfigError::invalid("REQUIRED_PARTICIPANTS", "must be at least 1"))
    }

    pub fn required_count(&self) -> usize {
        self.required_count.get()
    }

    pub fn is_complete(&self, batch: &Batch) -> bool {
        is_complete(batch, self.required_count())
    }

    /// How many more participants are needed before the batch flushes.
    pub fn remaining(&self, batch: &Batch) -> usize {
        self.required_count().saturating_sub(batch.len())
    }
}
