//! Batch runner: validates input records and fans tickets out over a bounded
//! worker pool.
//!
//! At most `max_in_flight` tickets are in the pipeline at once. Cancellation
//! and the run deadline stop *dispatch*; tickets already in flight finish and
//! are reported. Output entries keep input order regardless of completion
//! order.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertDispatcher;
use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::normalize::normalize;
use crate::stats::{RunCounters, RunSummary};
use crate::types::{ErrorOutput, InboundTicket, TriageOutcome};

/// One non-blank input line, parsed or rejected.
#[derive(Debug)]
pub struct Record {
  /// 1-based line number in the input.
  pub line: usize,
  pub parsed: Result<InboundTicket, ErrorOutput>,
}

/// Split JSON-lines input into records. Blank lines are skipped but still
/// counted for line numbers.
pub fn parse_records(input: &str) -> Vec<Record> {
  input
    .lines()
    .enumerate()
    .filter(|(_, l)| !l.trim().is_empty())
    .map(|(i, l)| Record {
      line: i + 1,
      parsed: serde_json::from_str::<InboundTicket>(l)
        .map_err(|e| error_output(&EngineError::from(e)).with_line(i + 1)),
    })
    .collect()
}

pub fn error_output(e: &EngineError) -> ErrorOutput {
  match e {
    EngineError::Validation { field, .. } | EngineError::Config { field, .. } => {
      ErrorOutput::new(e.to_string()).with_field(field.clone())
    }
    _ => ErrorOutput::new(e.to_string()),
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportEntry {
  Outcome(Box<TriageOutcome>),
  Rejected(ErrorOutput),
}

#[derive(Debug)]
pub struct BatchReport {
  /// Outcomes and rejections in input order.
  pub entries: Vec<ReportEntry>,
  pub summary: RunSummary,
}

impl BatchReport {
  pub fn outcomes(&self) -> impl Iterator<Item = &TriageOutcome> {
    self.entries.iter().filter_map(|e| match e {
      ReportEntry::Outcome(o) => Some(o.as_ref()),
      ReportEntry::Rejected(_) => None,
    })
  }
}

pub struct BatchRunner {
  engine: Arc<Engine>,
  dispatcher: Arc<AlertDispatcher>,
  max_in_flight: usize,
  run_timeout: Option<Duration>,
  cancel: CancellationToken,
}

impl BatchRunner {
  pub fn new(engine: Arc<Engine>, dispatcher: Arc<AlertDispatcher>, runtime: &RuntimeConfig) -> Self {
    Self {
      engine,
      dispatcher,
      max_in_flight: runtime.max_in_flight.max(1),
      run_timeout: runtime.run_timeout(),
      cancel: CancellationToken::new(),
    }
  }

  /// Token that stops dispatch when cancelled (e.g. on Ctrl-C).
  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub async fn run(&self, records: Vec<Record>) -> BatchReport {
    let counters = Arc::new(RunCounters::default());
    counters.record_received(records.len() as u64);

    let deadline = self.run_timeout.map(|t| Instant::now() + t);
    let sem = Arc::new(Semaphore::new(self.max_in_flight));
    let mut join_set: JoinSet<(usize, TriageOutcome)> = JoinSet::new();
    let mut entries: Vec<(usize, ReportEntry)> = Vec::new();

    let mut pending = records.into_iter();
    while let Some(record) = pending.next() {
      let raw = match record.parsed {
        Ok(raw) => raw,
        Err(e) => {
          warn!(line = record.line, error = %e.message, "rejecting unparsable record");
          counters.record_rejected();
          entries.push((record.line, ReportEntry::Rejected(e)));
          continue;
        }
      };
      let ticket = match normalize(&raw) {
        Ok(t) => t,
        Err(e) => {
          warn!(line = record.line, ticket_id = %raw.id, error = %e, "rejecting invalid ticket");
          counters.record_rejected();
          entries.push((record.line, ReportEntry::Rejected(error_output(&e).with_line(record.line))));
          continue;
        }
      };

      let permit = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => None,
        _ = deadline_elapsed(deadline) => None,
        p = sem.clone().acquire_owned() => p.ok(),
      };
      let Some(permit) = permit else {
        let skipped = 1 + pending.len() as u64;
        warn!(skipped, "dispatch stopped, draining in-flight tickets");
        counters.record_not_dispatched(skipped);
        break;
      };

      let engine = self.engine.clone();
      let dispatcher = self.dispatcher.clone();
      let counters = counters.clone();
      let line = record.line;
      join_set.spawn(async move {
        let mut outcome = engine.triage(&ticket).await;
        outcome.alerts = dispatcher.dispatch_for(&outcome).await;
        counters.record_outcome(&outcome);
        drop(permit);
        (line, outcome)
      });
    }

    while let Some(res) = join_set.join_next().await {
      match res {
        Ok((line, outcome)) => {
          debug!(line, ticket_id = %outcome.ticket_id, "ticket finished");
          entries.push((line, ReportEntry::Outcome(Box::new(outcome))));
        }
        Err(e) => {
          error!(error = %e, "ticket task failed");
          counters.record_failed();
        }
      }
    }

    entries.sort_by_key(|(line, _)| *line);
    let summary = counters.snapshot();
    info!(
      total = summary.total,
      processed = summary.processed,
      rejected = summary.rejected,
      not_dispatched = summary.not_dispatched,
      "batch complete"
    );

    BatchReport {
      entries: entries.into_iter().map(|(_, e)| e).collect(),
      summary,
    }
  }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
  match deadline {
    Some(d) => tokio::time::sleep_until(d).await,
    None => std::future::pending().await,
  }
}
