//! Run-level counters shared by concurrently processed tickets.
//!
//! Each ticket task records into the same `RunCounters` with relaxed atomic
//! increments; `snapshot` is taken once all tasks have joined.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::alerts::{AlertReceipt, DeliveryStatus};
use crate::types::{Capability, DecisionSource, TriageOutcome};

#[derive(Debug, Default)]
pub struct RunCounters {
  received: AtomicU64,
  processed: AtomicU64,
  rejected: AtomicU64,
  not_dispatched: AtomicU64,
  failed: AtomicU64,
  by_priority: [AtomicU64; 4],
  manual_review: AtomicU64,
  overrides: AtomicU64,
  classification_fallbacks: AtomicU64,
  intent_fallbacks: AtomicU64,
  faq_fallbacks: AtomicU64,
  draft_fallbacks: AtomicU64,
  drafts: AtomicU64,
  routed: AtomicU64,
  auto_send_candidates: AtomicU64,
  guardian_alerts: AtomicU64,
  opportunity_alerts: AtomicU64,
  alerts_sent: AtomicU64,
  alerts_outboxed: AtomicU64,
  alerts_suppressed: AtomicU64,
  alerts_undeliverable: AtomicU64,
}

fn bump(counter: &AtomicU64) {
  counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
  counter.load(Ordering::Relaxed)
}

fn rate(part: u64, whole: u64) -> f64 {
  if whole == 0 {
    return 0.0;
  }
  (part as f64 / whole as f64 * 10_000.0).round() / 10_000.0
}

impl RunCounters {
  pub fn record_received(&self, n: u64) {
    self.received.fetch_add(n, Ordering::Relaxed);
  }

  pub fn record_rejected(&self) {
    bump(&self.rejected);
  }

  pub fn record_not_dispatched(&self, n: u64) {
    self.not_dispatched.fetch_add(n, Ordering::Relaxed);
  }

  /// A ticket task that panicked or was aborted.
  pub fn record_failed(&self) {
    bump(&self.failed);
  }

  pub fn record_outcome(&self, outcome: &TriageOutcome) {
    bump(&self.processed);
    bump(&self.by_priority[outcome.priority.priority.index()]);
    if outcome.priority.manual_review {
      bump(&self.manual_review);
    }
    if outcome.priority.rationale.source == DecisionSource::Override {
      bump(&self.overrides);
    }
    for d in &outcome.degraded {
      match d.capability {
        Capability::Classification => bump(&self.classification_fallbacks),
        Capability::IntentDetection => bump(&self.intent_fallbacks),
        Capability::FaqLookup => bump(&self.faq_fallbacks),
        Capability::DraftReply => bump(&self.draft_fallbacks),
      }
    }
    let decision = &outcome.decision;
    if decision.generates_draft() {
      bump(&self.drafts);
    }
    if decision.routed_team().is_some() {
      bump(&self.routed);
    }
    if decision.is_auto_send_candidate() {
      bump(&self.auto_send_candidates);
    }
    if decision.alerts_kam() {
      bump(&self.guardian_alerts);
    }
    if decision.alerts_sales() {
      bump(&self.opportunity_alerts);
    }
    for receipt in &outcome.alerts {
      self.record_receipt(receipt);
    }
  }

  fn record_receipt(&self, receipt: &AlertReceipt) {
    match receipt.status {
      DeliveryStatus::Sent => bump(&self.alerts_sent),
      DeliveryStatus::Outboxed => bump(&self.alerts_outboxed),
      DeliveryStatus::Suppressed => bump(&self.alerts_suppressed),
      DeliveryStatus::Undeliverable => bump(&self.alerts_undeliverable),
    }
  }

  pub fn snapshot(&self) -> RunSummary {
    let processed = read(&self.processed);
    let drafts = read(&self.drafts);
    let auto_send = read(&self.auto_send_candidates);
    RunSummary {
      total: read(&self.received),
      processed,
      rejected: read(&self.rejected),
      not_dispatched: read(&self.not_dispatched),
      failed: read(&self.failed),
      priority_distribution: PriorityCounts {
        p0: read(&self.by_priority[0]),
        p1: read(&self.by_priority[1]),
        p2: read(&self.by_priority[2]),
        p3: read(&self.by_priority[3]),
      },
      manual_review: read(&self.manual_review),
      escalation_overrides: read(&self.overrides),
      fallbacks: FallbackCounts {
        classification: read(&self.classification_fallbacks),
        intent_detection: read(&self.intent_fallbacks),
        faq_lookup: read(&self.faq_fallbacks),
        draft_reply: read(&self.draft_fallbacks),
      },
      drafts,
      routed: read(&self.routed),
      auto_send_candidates: auto_send,
      auto_resolution_rate: rate(drafts, processed),
      auto_send_rate: rate(auto_send, processed),
      guardian_alerts: read(&self.guardian_alerts),
      opportunity_alerts: read(&self.opportunity_alerts),
      alert_delivery: DeliveryCounts {
        sent: read(&self.alerts_sent),
        outboxed: read(&self.alerts_outboxed),
        suppressed: read(&self.alerts_suppressed),
        undeliverable: read(&self.alerts_undeliverable),
      },
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityCounts {
  pub p0: u64,
  pub p1: u64,
  pub p2: u64,
  pub p3: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackCounts {
  pub classification: u64,
  pub intent_detection: u64,
  pub faq_lookup: u64,
  pub draft_reply: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCounts {
  pub sent: u64,
  pub outboxed: u64,
  pub suppressed: u64,
  pub undeliverable: u64,
}

/// Final line of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  /// Non-blank input records.
  pub total: u64,
  pub processed: u64,
  pub rejected: u64,
  pub not_dispatched: u64,
  pub failed: u64,
  pub priority_distribution: PriorityCounts,
  pub manual_review: u64,
  pub escalation_overrides: u64,
  pub fallbacks: FallbackCounts,
  pub drafts: u64,
  pub routed: u64,
  pub auto_send_candidates: u64,
  /// Share of processed tickets answered with a draft instead of a team route.
  pub auto_resolution_rate: f64,
  /// Share of processed tickets flagged for one-click approval.
  pub auto_send_rate: f64,
  pub guardian_alerts: u64,
  pub opportunity_alerts: u64,
  pub alert_delivery: DeliveryCounts,
}
