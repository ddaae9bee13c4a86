//! Text-understanding capability: the narrow seam between the engine and
//! whatever produces classification and intent judgments and draft replies.
//!
//! Adapters:
//! - `HttpUnderstanding` (http_client.rs): chat-completions endpoint.
//! - `RuleBasedUnderstanding` (rules.rs): deterministic phrase rules, offline.
//! - `ScriptedUnderstanding` (here): fixed per-ticket responses for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::CalibrationConfig;
use crate::error::CapabilityError;
use crate::rules;
use crate::types::{ClassificationJudgment, FaqMatch, IntentJudgment, IntentType, Team, Ticket};

#[async_trait]
pub trait TextUnderstanding: Send + Sync {
  /// Adapter name for logging.
  fn name(&self) -> &'static str;

  /// Judge category, priority candidates, sentiment and confidence.
  /// `rubric` carries category definitions and calibration targets.
  async fn classify(
    &self,
    ticket: &Ticket,
    rubric: &CalibrationConfig,
  ) -> Result<ClassificationJudgment, CapabilityError>;

  /// Judge commercial intent from context, not literal keywords.
  async fn detect_intent(&self, ticket: &Ticket) -> Result<IntentJudgment, CapabilityError>;

  /// Customer-facing reply for agent review, grounded in `faq` when an
  /// article matched and signed by the owning `team`.
  async fn draft_reply(
    &self,
    ticket: &Ticket,
    team: Team,
    faq: Option<&FaqMatch>,
  ) -> Result<String, CapabilityError>;
}

/// Fixed responses keyed by ticket id.
///
/// Unscripted tickets fail classification with `Unavailable`, report no
/// intent and get the template reply. `flaky` makes the first N classify calls for a ticket fail with a
/// transient error.
#[derive(Default)]
pub struct ScriptedUnderstanding {
  judgments: HashMap<String, Result<ClassificationJudgment, CapabilityError>>,
  intents: HashMap<String, Result<IntentJudgment, CapabilityError>>,
  drafts: HashMap<String, Result<String, CapabilityError>>,
  flaky: Mutex<HashMap<String, u32>>,
  classify_calls: AtomicUsize,
  draft_calls: AtomicUsize,
}

impl ScriptedUnderstanding {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_judgment(mut self, ticket_id: &str, judgment: ClassificationJudgment) -> Self {
    self.judgments.insert(ticket_id.to_string(), Ok(judgment));
    self
  }

  pub fn with_classify_error(mut self, ticket_id: &str, err: CapabilityError) -> Self {
    self.judgments.insert(ticket_id.to_string(), Err(err));
    self
  }

  pub fn with_intent(mut self, ticket_id: &str, intent: IntentJudgment) -> Self {
    self.intents.insert(ticket_id.to_string(), Ok(intent));
    self
  }

  pub fn with_intent_error(mut self, ticket_id: &str, err: CapabilityError) -> Self {
    self.intents.insert(ticket_id.to_string(), Err(err));
    self
  }

  pub fn with_draft(mut self, ticket_id: &str, reply: &str) -> Self {
    self.drafts.insert(ticket_id.to_string(), Ok(reply.to_string()));
    self
  }

  pub fn with_draft_error(mut self, ticket_id: &str, err: CapabilityError) -> Self {
    self.drafts.insert(ticket_id.to_string(), Err(err));
    self
  }

  pub fn flaky(self, ticket_id: &str, failures: u32) -> Self {
    if let Ok(mut flaky) = self.flaky.lock() {
      flaky.insert(ticket_id.to_string(), failures);
    }
    self
  }

  pub fn classify_calls(&self) -> usize {
    self.classify_calls.load(Ordering::SeqCst)
  }

  pub fn draft_calls(&self) -> usize {
    self.draft_calls.load(Ordering::SeqCst)
  }

  fn take_flaky_failure(&self, ticket_id: &str) -> bool {
    let Ok(mut flaky) = self.flaky.lock() else {
      return false;
    };
    match flaky.get_mut(ticket_id) {
      Some(remaining) if *remaining > 0 => {
        *remaining -= 1;
        true
      }
      _ => false,
    }
  }
}

#[async_trait]
impl TextUnderstanding for ScriptedUnderstanding {
  fn name(&self) -> &'static str {
    "scripted"
  }

  async fn classify(
    &self,
    ticket: &Ticket,
    _rubric: &CalibrationConfig,
  ) -> Result<ClassificationJudgment, CapabilityError> {
    self.classify_calls.fetch_add(1, Ordering::SeqCst);
    if self.take_flaky_failure(&ticket.id) {
      return Err(CapabilityError::Transport("scripted transient failure".into()));
    }
    match self.judgments.get(&ticket.id) {
      Some(r) => r.clone(),
      None => Err(CapabilityError::Unavailable(format!(
        "no scripted judgment for {}",
        ticket.id
      ))),
    }
  }

  async fn detect_intent(&self, ticket: &Ticket) -> Result<IntentJudgment, CapabilityError> {
    match self.intents.get(&ticket.id) {
      Some(r) => r.clone(),
      None => Ok(IntentJudgment {
        intent: IntentType::None,
        confidence: 0.0,
        excerpt: String::new(),
        rationale: "no commercial signal".into(),
      }),
    }
  }

  async fn draft_reply(
    &self,
    ticket: &Ticket,
    team: Team,
    faq: Option<&FaqMatch>,
  ) -> Result<String, CapabilityError> {
    self.draft_calls.fetch_add(1, Ordering::SeqCst);
    match self.drafts.get(&ticket.id) {
      Some(r) => r.clone(),
      None => Ok(rules::template_reply(ticket, team, faq)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::normalize::normalize;
  use crate::types::{Category, InboundTicket, Priority, Sentiment};

  fn ticket(id: &str) -> Ticket {
    normalize(&InboundTicket {
      id: id.into(),
      subject: "s".into(),
      description: "d".into(),
      timestamp: "2025-01-15T10:30:00Z".into(),
      mrr: 0.0,
      ..Default::default()
    })
    .unwrap()
  }

  fn judgment() -> ClassificationJudgment {
    ClassificationJudgment {
      category: Category::Integrations,
      suggested: Priority::P3,
      candidates: vec![],
      sentiment: Sentiment::Neutral,
      confidence: 0.9,
    }
  }

  #[tokio::test]
  async fn scripted_flaky_then_ok() {
    let s = ScriptedUnderstanding::new()
      .with_judgment("A", judgment())
      .flaky("A", 1);
    let rubric = CalibrationConfig::default();
    assert!(s.classify(&ticket("A"), &rubric).await.is_err());
    assert_eq!(s.classify(&ticket("A"), &rubric).await, Ok(judgment()));
    assert_eq!(s.classify_calls(), 2);
  }

  #[tokio::test]
  async fn unscripted_ticket_is_unavailable() {
    let s = ScriptedUnderstanding::new();
    let err = s
      .classify(&ticket("B"), &CalibrationConfig::default())
      .await
      .unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(s.detect_intent(&ticket("B")).await.unwrap().intent, IntentType::None);
  }

  #[tokio::test]
  async fn scripted_draft_overrides_template() {
    let s = ScriptedUnderstanding::new().with_draft("C", "Custom reply");
    assert_eq!(
      s.draft_reply(&ticket("C"), Team::DataAnalytics, None).await.unwrap(),
      "Custom reply"
    );
    let fallback = s.draft_reply(&ticket("D"), Team::DataAnalytics, None).await.unwrap();
    assert!(fallback.ends_with("Data & Analytics Team"));
    assert_eq!(s.draft_calls(), 2);
  }
}
