//! Ticket-system update rendered from a triage decision.
//!
//! The update is what a ticketing adapter applies: status, priority,
//! assignee queue, tags and custom fields, plus the draft as an internal
//! note. A draft is never a public comment; the approval mode only says
//! whether an agent can approve it in one click or must review it in full.

use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Open,
  /// Draft attached, waiting for an agent.
  Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
  OneClick,
  FullReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftNote {
  /// Drafted reply, or the knowledge-base answer when drafting failed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_article: Option<String>,
  pub public: bool,
  pub approval: Approval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
  pub name: String,
  pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
  pub ticket_id: String,
  pub status: TicketStatus,
  /// Lowercase level ("p0".."p3").
  pub priority: String,
  /// Queue slug of the assigned team.
  pub assignee: String,
  pub tags: Vec<String>,
  pub custom_fields: Vec<CustomField>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub draft: Option<DraftNote>,
}

pub fn render_update(
  decision: &ActionDecision,
  priority: &PriorityDecision,
  assignment: &TeamAssignment,
  risk: &RiskAssessment,
  opportunity: &OpportunitySignal,
  faq: Option<&FaqMatch>,
  reply: Option<String>,
) -> TicketUpdate {
  let mut tags = vec![
    assignment.team.slug().to_string(),
    priority.priority.as_str().to_lowercase(),
  ];
  if priority.rationale.source == DecisionSource::Override {
    tags.push("escalation-override".into());
  }
  if priority.manual_review {
    tags.push("manual-review".into());
  }
  if decision.alerts_kam() {
    tags.push("churn-risk".into());
  }
  if decision.alerts_sales() {
    tags.push("upsell-opportunity".into());
  }
  if decision.is_auto_send_candidate() {
    tags.push("auto-send-candidate".into());
  }

  let mut custom_fields = vec![
    CustomField {
      name: "category".into(),
      value: serde_json::json!(assignment.category.as_str()),
    },
    CustomField {
      name: "churn_risk_score".into(),
      value: serde_json::json!(risk.score),
    },
  ];
  if opportunity.is_opportunity() {
    custom_fields.push(CustomField {
      name: "opportunity_intent".into(),
      value: serde_json::json!(opportunity.intent_type.as_str()),
    });
  }

  let draft = decision.draft_review.map(|review| DraftNote {
    body: reply.or_else(|| faq.map(|f| f.answer.clone())),
    source_article: faq.map(|f| f.article_id.clone()),
    public: false,
    approval: match review {
      DraftReview::OneClickApproval => Approval::OneClick,
      DraftReview::InternalNote => Approval::FullReview,
    },
  });

  TicketUpdate {
    ticket_id: decision.ticket_id.clone(),
    status: if draft.is_some() {
      TicketStatus::Pending
    } else {
      TicketStatus::Open
    },
    priority: priority.priority.as_str().to_lowercase(),
    assignee: assignment.team.slug().to_string(),
    tags,
    custom_fields,
    draft,
  }
}
