//! Core engine: runs one ticket through the decision pipeline.
//!
//! Capabilities are the only suspension points. Every capability failure is
//! replaced by its documented fallback and recorded in `degraded`, so
//! `triage` always produces an outcome.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::actions::{self, SelectorInput};
use crate::config::CalibrationConfig;
use crate::error::CapabilityError;
use crate::guardian;
use crate::knowledge::KnowledgeBase;
use crate::opportunity;
use crate::priority;
use crate::retry::{with_retry, RetryPolicy};
use crate::router;
use crate::ticketing;
use crate::types::*;
use crate::understanding::TextUnderstanding;

/// The triage engine. Stateless across tickets; cheap to share behind `Arc`.
pub struct Engine {
  config: Arc<CalibrationConfig>,
  understanding: Arc<dyn TextUnderstanding>,
  knowledge: Arc<dyn KnowledgeBase>,
  retry: RetryPolicy,
}

impl Engine {
  pub fn new(
    config: CalibrationConfig,
    understanding: Arc<dyn TextUnderstanding>,
    knowledge: Arc<dyn KnowledgeBase>,
    retry: RetryPolicy,
  ) -> Self {
    Self {
      config: Arc::new(config),
      understanding,
      knowledge,
      retry,
    }
  }

  pub fn config(&self) -> &CalibrationConfig {
    &self.config
  }

  /// Triage a single validated ticket.
  pub async fn triage(&self, ticket: &Ticket) -> TriageOutcome {
    let span = info_span!("triage", ticket_id = %ticket.id);
    self.run(ticket).instrument(span).await
  }

  async fn run(&self, ticket: &Ticket) -> TriageOutcome {
    let mut degraded = Vec::new();

    let classified = with_retry(&self.retry, "classification", || {
      self.understanding.classify(ticket, &self.config)
    })
    .await
    .and_then(|j| j.validate().map(|()| j));
    if let Err(e) = &classified {
      warn!(adapter = self.understanding.name(), error = %e, "classification unavailable, using fallback");
      degraded.push(degradation(Capability::Classification, e));
    }

    let priority = priority::classify(ticket, classified.as_ref(), &self.config.priority);
    let judgment = classified.as_ref().ok();
    let assignment = router::route(judgment.map_or(Category::Other, |j| j.category));
    let sentiment = judgment.map(|j| j.sentiment);

    // Guardian is pure and does not wait on intent detection.
    let (risk, intent) = tokio::join!(
      async { guardian::assess(ticket, sentiment, &self.config.guardian) },
      with_retry(&self.retry, "intent_detection", || {
        self.understanding.detect_intent(ticket)
      }),
    );
    if let Err(e) = &intent {
      warn!(adapter = self.understanding.name(), error = %e, "intent detection unavailable, assuming none");
      degraded.push(degradation(Capability::IntentDetection, e));
    }
    let opportunity = opportunity::detect(ticket, intent.as_ref(), &self.config.opportunity);

    // Only tickets that get a draft need a knowledge-base answer.
    let faq = if priority.priority.is_urgent() {
      None
    } else {
      let text = ticket.normalized_text.as_str();
      match with_retry(&self.retry, "faq_lookup", || {
        self.knowledge.lookup(assignment.category, text)
      })
      .await
      {
        Ok(m) => m,
        Err(e) => {
          warn!(error = %e, "faq lookup unavailable, no match assumed");
          degraded.push(degradation(Capability::FaqLookup, &e));
          None
        }
      }
    };

    let input = SelectorInput {
      ticket_id: &ticket.id,
      priority: &priority,
      assignment: &assignment,
      risk: &risk,
      opportunity: &opportunity,
      sentiment,
      faq_confidence: faq.as_ref().map(|f| f.confidence),
      complexity: faq.as_ref().and_then(|f| f.complexity),
      satisfaction: ticket.history.satisfaction,
    };
    let decision = actions::select(&input, &self.config.auto_send);

    let reply = if decision.generates_draft() {
      match with_retry(&self.retry, "draft_reply", || {
        self.understanding.draft_reply(ticket, assignment.team, faq.as_ref())
      })
      .await
      {
        Ok(reply) => Some(reply),
        Err(e) => {
          warn!(adapter = self.understanding.name(), error = %e, "draft unavailable, note carries the faq answer only");
          degraded.push(degradation(Capability::DraftReply, &e));
          None
        }
      }
    } else {
      None
    };

    let update = ticketing::render_update(
      &decision,
      &priority,
      &assignment,
      &risk,
      &opportunity,
      faq.as_ref(),
      reply,
    );

    info!(
      priority = %priority.priority,
      source = ?priority.rationale.source,
      team = assignment.team.slug(),
      risk = ?risk.risk_level,
      intent = opportunity.intent_type.as_str(),
      auto_send = decision.is_auto_send_candidate(),
      degraded = degraded.len(),
      "ticket triaged"
    );

    TriageOutcome {
      ticket_id: ticket.id.clone(),
      customer_name: ticket.customer_name.clone(),
      mrr: ticket.mrr,
      actual_priority: ticket.actual_priority,
      priority,
      assignment,
      risk,
      opportunity,
      faq,
      decision,
      update,
      degraded,
      alerts: Vec::new(),
    }
  }
}

fn degradation(capability: Capability, error: &CapabilityError) -> Degradation {
  Degradation {
    capability,
    error: error.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::knowledge::NoKnowledgeBase;
  use crate::normalize::normalize;
  use crate::understanding::ScriptedUnderstanding;
  use std::time::Duration;

  fn ticket(id: &str, description: &str) -> Ticket {
    normalize(&InboundTicket {
      id: id.into(),
      customer_name: "Acme".into(),
      subject: "Help".into(),
      description: description.into(),
      timestamp: "2025-01-15T10:30:00Z".into(),
      mrr: 500.0,
      ..Default::default()
    })
    .unwrap()
  }

  fn engine(understanding: ScriptedUnderstanding) -> Engine {
    Engine::new(
      CalibrationConfig::default(),
      Arc::new(understanding),
      Arc::new(NoKnowledgeBase),
      RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        call_timeout: Duration::from_secs(5),
      },
    )
  }

  #[tokio::test]
  async fn classification_failure_degrades_to_p2_manual_review() {
    let e = engine(
      ScriptedUnderstanding::new().with_classify_error("T-1", CapabilityError::Status(500, "boom".into())),
    );
    let out = e.triage(&ticket("T-1", "Something odd happened.")).await;
    assert_eq!(out.priority.priority, Priority::P2);
    assert!(out.priority.manual_review);
    assert_eq!(out.assignment.team, router::DEFAULT_TEAM);
    assert!(out.decision.generates_draft());
    assert_eq!(out.degraded[0].capability, Capability::Classification);
  }

  #[tokio::test(start_paused = true)]
  async fn transient_failures_are_retried() {
    let scripted = ScriptedUnderstanding::new()
      .with_judgment(
        "T-2",
        ClassificationJudgment {
          category: Category::DataAnalytics,
          suggested: Priority::P3,
          candidates: vec![],
          sentiment: Sentiment::Neutral,
          confidence: 0.9,
        },
      )
      .flaky("T-2", 2);
    let e = engine(scripted);
    let out = e.triage(&ticket("T-2", "Where is the export button?")).await;
    assert_eq!(out.priority.priority, Priority::P3);
    assert!(out.degraded.is_empty());
    assert_eq!(out.assignment.team, Team::DataAnalytics);
  }

  #[tokio::test]
  async fn non_urgent_ticket_gets_drafted_reply() {
    let scripted = ScriptedUnderstanding::new()
      .with_judgment(
        "T-4",
        ClassificationJudgment {
          category: Category::Integrations,
          suggested: Priority::P3,
          candidates: vec![],
          sentiment: Sentiment::Neutral,
          confidence: 0.9,
        },
      )
      .with_draft("T-4", "Hi Acme, here is how to rotate your key.");
    let scripted = Arc::new(scripted);
    let e = Engine::new(
      CalibrationConfig::default(),
      scripted.clone(),
      Arc::new(NoKnowledgeBase),
      RetryPolicy::default(),
    );
    let out = e.triage(&ticket("T-4", "How do I rotate my API key?")).await;
    let draft = out.update.draft.unwrap();
    assert_eq!(draft.body.as_deref(), Some("Hi Acme, here is how to rotate your key."));
    assert!(!draft.public);
    assert_eq!(scripted.draft_calls(), 1);
  }

  #[tokio::test]
  async fn urgent_ticket_is_not_drafted() {
    let scripted = Arc::new(ScriptedUnderstanding::new().with_judgment(
      "T-5",
      ClassificationJudgment {
        category: Category::Integrations,
        suggested: Priority::P1,
        candidates: vec![],
        sentiment: Sentiment::Neutral,
        confidence: 0.9,
      },
    ));
    let e = Engine::new(
      CalibrationConfig::default(),
      scripted.clone(),
      Arc::new(NoKnowledgeBase),
      RetryPolicy::default(),
    );
    let out = e.triage(&ticket("T-5", "Every sync attempt fails.")).await;
    assert!(out.update.draft.is_none());
    assert_eq!(scripted.draft_calls(), 0);
  }

  #[tokio::test]
  async fn draft_failure_keeps_internal_note() {
    let e = engine(
      ScriptedUnderstanding::new()
        .with_draft_error("T-6", CapabilityError::Unparsable("empty draft".into())),
    );
    let out = e.triage(&ticket("T-6", "Something odd happened.")).await;
    let draft = out.update.draft.unwrap();
    assert!(draft.body.is_none());
    assert!(out.degraded.iter().any(|d| d.capability == Capability::DraftReply));
  }

  #[tokio::test]
  async fn intent_failure_is_recorded_but_not_fatal() {
    let e = engine(
      ScriptedUnderstanding::new().with_intent_error("T-3", CapabilityError::Unparsable("prose".into())),
    );
    let out = e.triage(&ticket("T-3", "Hello there.")).await;
    assert!(!out.opportunity.is_opportunity());
    assert!(out
      .degraded
      .iter()
      .any(|d| d.capability == Capability::IntentDetection));
  }
}
