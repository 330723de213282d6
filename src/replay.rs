//! Sequential replay of a question/answer dataset through a chat model.
//!
//! Records are sent one at a time, in order, with a fixed pause before each
//! call. A failed call is recorded against its record and the run carries on;
//! only bad input (no records, blank model) rejects the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ChatError, RunError};
use crate::ollama::{ChatClient, ChatMessage};
use crate::records::QaRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Answered { actual: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub index: usize,
    pub question: String,
    pub expected: String,
    pub reply: Reply,
}

impl RecordOutcome {
    fn new(index: usize, record: &QaRecord, result: Result<String, ChatError>) -> Self {
        let reply = match result {
            Ok(actual) => Reply::Answered { actual },
            Err(e) => Reply::Failed {
                reason: e.to_string(),
            },
        };
        Self {
            index,
            question: record.question.clone(),
            expected: record.answer.clone(),
            reply,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.reply, Reply::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub model: String,
    pub processed: usize,
    pub cancelled: bool,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunSummary {
    pub fn answered(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Events pushed to channel-based observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Progress { percent: f64 },
    Finished { summary: RunSummary },
}

/// Receives progress for one run. `progress` may be called from inside the
/// run loop, so implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: f64);

    fn finished(&self, _summary: &RunSummary) {}
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn progress(&self, percent: f64) {
        self(percent)
    }
}

impl ProgressSink for watch::Sender<f64> {
    fn progress(&self, percent: f64) {
        self.send_replace(percent);
    }
}

impl ProgressSink for mpsc::UnboundedSender<ReplayEvent> {
    fn progress(&self, percent: f64) {
        if self.send(ReplayEvent::Progress { percent }).is_err() {
            debug!("Replay progress receiver dropped");
        }
    }

    fn finished(&self, summary: &RunSummary) {
        let event = ReplayEvent::Finished {
            summary: summary.clone(),
        };
        if self.send(event).is_err() {
            debug!("Replay progress receiver dropped");
        }
    }
}

/// Completion percentage of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplayProgress {
    percent: f64,
}

impl ReplayProgress {
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn reset(&mut self) {
        self.percent = 0.0;
    }

    /// Mark record `index` (0-based) of `total` as started.
    pub fn advance(&mut self, index: usize, total: usize) -> f64 {
        let next = ((index + 1) as f64 / total as f64) * 100.0;
        self.percent = next.clamp(self.percent, 100.0);
        self.percent
    }
}

/// Cooperative stop signal, checked before each chat call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Pause before each record's chat call.
    pub pacing: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(crate::constants::DEFAULT_REPLAY_DELAY_MS),
        }
    }
}

/// Rejects a run that could not make a single call.
pub fn validate_inputs(records: &[QaRecord], model: &str) -> Result<(), RunError> {
    if records.is_empty() {
        return Err(RunError::InvalidInput("no records to replay"));
    }
    if model.trim().is_empty() {
        return Err(RunError::InvalidInput("model name must not be blank"));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ReplayDriver {
    config: ReplayConfig,
    progress: ReplayProgress,
    cancel: CancelToken,
}

impl ReplayDriver {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            progress: ReplayProgress::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> f64 {
        self.progress.percent()
    }

    #[instrument(skip_all, fields(model = %model, records = records.len()))]
    pub async fn run<C, S>(
        &mut self,
        records: &[QaRecord],
        client: &C,
        model: &str,
        sink: &S,
    ) -> Result<RunSummary, RunError>
    where
        C: ChatClient + ?Sized,
        S: ProgressSink + ?Sized,
    {
        validate_inputs(records, model)?;

        let total = records.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;
        self.progress.reset();
        info!("Starting replay run");

        for (index, record) in records.iter().enumerate() {
            sink.progress(self.progress.advance(index, total));

            if !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }

            if self.cancel.is_cancelled() {
                warn!(index, "Replay run cancelled");
                cancelled = true;
                break;
            }

            let messages = [ChatMessage::user(record.question.as_str())];
            let result = client.chat(model, &messages).await;
            match &result {
                Ok(actual) => info!(
                    example = index + 1,
                    question = %record.question,
                    expected = %record.answer,
                    actual = %actual,
                    "Replayed example"
                ),
                Err(e) => error!(example = index + 1, error = %e, "Error replaying example"),
            }
            outcomes.push(RecordOutcome::new(index, record, result));
        }

        let summary = RunSummary {
            model: model.to_string(),
            processed: outcomes.len(),
            cancelled,
            outcomes,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed(),
            cancelled,
            "Replay run finished"
        );

        sink.finished(&summary);
        self.progress.reset();
        sink.progress(self.progress.percent());
        Ok(summary)
    }
}
