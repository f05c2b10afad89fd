// Participant tracker: per-chat batches of station reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::map::stations::StationRegistry;
use crate::metrics;
use crate::policy::CompletionPolicy;

/// One participant's current report within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub participant: String,
    pub station: String,
    pub reported_at: DateTime<Utc>,
}

/// Reports accumulated for one chat since the last flush, in arrival order.
/// Holds at most one report per participant.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    reports: Vec<Report>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.reports
    }

    pub fn station_of(&self, participant: &str) -> Option<&str> {
        self.reports
            .iter()
            .find(|r| r.participant == participant)
            .map(|r| r.station.as_str())
    }

    /// When the first report still in the batch arrived.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.reports.iter().map(|r| r.reported_at).min()
    }

    /// Insert or overwrite the participant's report. Returns true if the
    /// participant is new to the batch.
    pub fn upsert(&mut self, participant: &str, station: &str) -> bool {
        let now = Utc::now();
        if let Some(existing) = self
            .reports
            .iter_mut()
            .find(|r| r.participant == participant)
        {
            existing.station = station.to_string();
            existing.reported_at = now;
            return false;
        }
        self.reports.push(Report {
            participant: participant.to_string(),
            station: station.to_string(),
            reported_at: now,
        });
        true
    }
}

/// Why a report was not accepted. Neither case mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("station is not in the registry")]
    UnknownStation,
    #[error("participant already reported and updates are disabled")]
    DuplicateReport,
}

/// Result of applying a single report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// New participant; carries the batch size after insertion.
    Registered(usize),
    /// Existing participant re-reported; carries the (unchanged) batch size.
    Updated(usize),
    Rejected(Rejection),
}

impl ReportOutcome {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ReportOutcome::Registered(_) => "registered",
            ReportOutcome::Updated(_) => "updated",
            ReportOutcome::Rejected(Rejection::UnknownStation) => "unknown_station",
            ReportOutcome::Rejected(Rejection::DuplicateReport) => "duplicate",
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, ReportOutcome::Rejected(_))
    }
}

/// Everything the caller needs after a report.
#[derive(Debug, Clone)]
pub struct Submission {
    pub outcome: ReportOutcome,
    /// The station now on record for the participant: the new one when
    /// accepted, the existing one on `DuplicateReport`, `None` otherwise.
    pub station: Option<String>,
    /// The batch taken out of the tracker when this report completed it.
    /// The chat is already reset when this is `Some`.
    pub flushed: Option<Batch>,
}

/// Thread-safe per-chat batch store.
///
/// Registration, the completion check and the reset on flush happen under a
/// single lock acquisition, so two concurrent reports can never both flush
/// the same batch.
#[derive(Debug, Clone)]
pub struct ParticipantTracker {
    registry: Arc<StationRegistry>,
    policy: CompletionPolicy,
    allow_updates: bool,
    batches: Arc<Mutex<HashMap<String, Batch>>>,
}

impl ParticipantTracker {
    pub fn new(registry: Arc<StationRegistry>, policy: CompletionPolicy, allow_updates: bool) -> Self {
        Self {
            registry,
            policy,
            allow_updates,
            batches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Batch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a participant's report of `station_text` to the chat's batch.
    ///
    /// When the report completes the batch, the batch is removed and handed
    /// back in [`Submission::flushed`].
    pub fn report(&self, chat_id: &str, participant: &str, station_text: &str) -> Submission {
        let Some(station) = self.registry.canonical_name(station_text) else {
            return Submission {
                outcome: ReportOutcome::Rejected(Rejection::UnknownStation),
                station: None,
                flushed: None,
            };
        };

        let mut batches = self.lock();

        if !self.allow_updates {
            if let Some(existing) = batches.get(chat_id).and_then(|b| b.station_of(participant)) {
                return Submission {
                    outcome: ReportOutcome::Rejected(Rejection::DuplicateReport),
                    station: Some(existing.to_string()),
                    flushed: None,
                };
            }
        }

        let batch = batches.entry(chat_id.to_string()).or_default();
        let outcome = if batch.upsert(participant, station) {
            ReportOutcome::Registered(batch.len())
        } else {
            ReportOutcome::Updated(batch.len())
        };

        let flushed = if self.policy.is_complete(batch) {
            batches.remove(chat_id)
        } else {
            None
        };
        metrics::OPEN_BATCHES.set(batches.len() as i64);

        Submission {
            outcome,
            station: Some(station.to_string()),
            flushed,
        }
    }

    /// Drop the chat's batch. Idempotent; returns whether anything was removed.
    pub fn reset(&self, chat_id: &str) -> bool {
        let mut batches = self.lock();
        let removed = batches.remove(chat_id).is_some();
        metrics::OPEN_BATCHES.set(batches.len() as i64);
        removed
    }

    /// Copy of the chat's open batch, if any.
    pub fn snapshot(&self, chat_id: &str) -> Option<Batch> {
        self.lock().get(chat_id).cloned()
    }

    /// Number of participants currently in the chat's batch.
    pub fn count(&self, chat_id: &str) -> usize {
        self.lock().get(chat_id).map_or(0, Batch::len)
    }

    pub fn open_batches(&self) -> usize {
        self.lock().len()
    }
}
