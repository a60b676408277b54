//! Session results aggregator: the ordered trial log plus exactly-once
//! submission bookkeeping.
//!
//! Submission is split in two halves so the sink call can run without holding
//! the engine: [`ResultsAggregator::begin_submission`] hands out the payload
//! (once), [`ResultsAggregator::complete_submission`] records the outcome.
//! A failed submission keeps the log; nothing retries automatically.

use serde::Serialize;
use tracing::{info, warn};

use crate::sink::{ResultsSink, SinkError};
use crate::types::{Group, ResultsPayload, Session, TrialResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "camelCase")]
pub enum SaveStatus {
    /// Test still running; results accumulating.
    Collecting,
    /// Payload handed to the sink, outcome outstanding.
    Saving,
    Saved,
    /// Human-readable failure reason from the sink.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct ResultsAggregator {
    group: Group,
    results: Vec<TrialResult>,
    status: SaveStatus,
}

impl ResultsAggregator {
    pub fn new(group: Group) -> Self {
        Self {
            group,
            results: Vec::with_capacity(crate::constants::TOTAL_TRIALS),
            status: SaveStatus::Collecting,
        }
    }

    /// Append a result. Order of calls is the order of the log.
    pub fn record(&mut self, result: TrialResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn is_saving(&self) -> bool {
        self.status == SaveStatus::Saving
    }

    /// Payload for the sink. Returns `Some` exactly once per session.
    pub fn begin_submission(&mut self) -> Option<ResultsPayload> {
        if self.status != SaveStatus::Collecting {
            return None;
        }
        self.status = SaveStatus::Saving;
        Some(ResultsPayload {
            group: self.group,
            data: self.results.clone(),
        })
    }

    /// Record the sink's answer. Ignored unless a submission is outstanding.
    pub fn complete_submission(&mut self, outcome: Result<(), SinkError>) -> &SaveStatus {
        if self.status == SaveStatus::Saving {
            self.status = match outcome {
                Ok(()) => {
                    info!(results = self.results.len(), "results saved");
                    SaveStatus::Saved
                }
                Err(e) => {
                    warn!(error = %e, results = self.results.len(), "results submission failed");
                    SaveStatus::Failed(e.to_string())
                }
            };
        }
        &self.status
    }

    /// Synchronous convenience: begin, call the sink, complete.
    /// Returns `None` when a submission already happened.
    pub fn submit_to(&mut self, session: &Session, sink: &dyn ResultsSink) -> Option<SaveStatus> {
        let payload = self.begin_submission()?;
        let outcome = sink.submit(session, &payload);
        Some(self.complete_submission(outcome).clone())
    }
}
