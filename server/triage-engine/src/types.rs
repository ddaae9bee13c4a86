//! Core types for the triage engine (JSON contracts + decision models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CapabilityError;

// ---------------------------------------------------------------------------
// Inbound types (JSON contract: what the ticket source sends)
// ---------------------------------------------------------------------------

/// One inbound ticket record. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundTicket {
  #[serde(alias = "ticket_id")]
  pub id: String,
  #[serde(default)]
  pub customer_name: String,
  pub subject: String,
  pub description: String,
  #[serde(default)]
  pub channel: String,
  pub timestamp: String,
  pub mrr: f64,
  /// Human-labelled priority, only used for offline calibration.
  #[serde(default)]
  pub actual_priority: Option<String>,
  #[serde(default)]
  pub repeat_issue: Option<bool>,
  /// Prior satisfaction score on a 1..=5 scale.
  #[serde(default)]
  pub satisfaction: Option<f64>,
}

// ---------------------------------------------------------------------------
// Normalized ticket
// ---------------------------------------------------------------------------

/// Account history indicators. `None` means unknown and is scored as neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountHistory {
  pub repeat_issue: Option<bool>,
  pub satisfaction: Option<f64>,
}

/// Canonical ticket after validation. Immutable for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct Ticket {
  pub id: String,
  pub customer_name: String,
  pub subject: String,
  pub description: String,
  pub channel: String,
  pub timestamp: DateTime<Utc>,
  pub mrr: f64,
  pub history: AccountHistory,
  pub actual_priority: Option<Priority>,
  /// Lowercased subject + description with whitespace collapsed.
  pub normalized_text: String,
}

impl Ticket {
  /// Subject and description as sent to external capabilities.
  pub fn text(&self) -> String {
    format!("{}\n\n{}", self.subject, self.description)
  }
}

// ---------------------------------------------------------------------------
// Classification vocabulary
// ---------------------------------------------------------------------------

/// Priority level, P0 most severe. Ordering follows severity rank, so a
/// greater value is a *less* severe level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
  P0,
  P1,
  P2,
  P3,
}

impl Priority {
  pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "P0" | "0" | "CRITICAL" => Some(Self::P0),
      "P1" | "1" | "HIGH" => Some(Self::P1),
      "P2" | "2" | "MEDIUM" => Some(Self::P2),
      "P3" | "3" | "LOW" => Some(Self::P3),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::P0 => "P0",
      Self::P1 => "P1",
      Self::P2 => "P2",
      Self::P3 => "P3",
    }
  }

  pub fn index(self) -> usize {
    self as usize
  }

  /// The less severe of two levels.
  pub fn less_severe(self, other: Self) -> Self {
    self.max(other)
  }

  /// P0 and P1 go to a human team; P2 and P3 get a draft.
  pub fn is_urgent(self) -> bool {
    matches!(self, Self::P0 | Self::P1)
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Inferred technical category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Integrations,
  DataAnalytics,
  CompliancePayments,
  Other,
}

impl Category {
  pub const ALL: [Category; 4] = [
    Category::Integrations,
    Category::DataAnalytics,
    Category::CompliancePayments,
    Category::Other,
  ];

  /// Total parse: anything unrecognized is `Other`.
  pub fn from_label(s: &str) -> Self {
    let key: String = s
      .trim()
      .to_ascii_lowercase()
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
      .collect();
    match key.as_str() {
      "integrations" | "integration" | "integrations_api" | "api" => Self::Integrations,
      "data_analytics" | "data" | "analytics" | "data___analytics" => Self::DataAnalytics,
      "compliance_payments" | "compliance" | "payments" | "compliance___payments"
      | "compliance_operations" => Self::CompliancePayments,
      _ => Self::Other,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Integrations => "integrations",
      Self::DataAnalytics => "data_analytics",
      Self::CompliancePayments => "compliance_payments",
      Self::Other => "other",
    }
  }
}

/// Customer tone as judged by the text-understanding capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
  Positive,
  Neutral,
  Frustrated,
  Aggressive,
}

impl Sentiment {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "positive" | "happy" => Some(Self::Positive),
      "neutral" => Some(Self::Neutral),
      "frustrated" | "negative" | "annoyed" => Some(Self::Frustrated),
      "aggressive" | "angry" | "hostile" => Some(Self::Aggressive),
      _ => None,
    }
  }

  /// Severity in 0..=1 used by the Guardian scorer.
  pub fn severity(self) -> f64 {
    match self {
      Self::Positive => 0.0,
      Self::Neutral => 0.1,
      Self::Frustrated => 0.6,
      Self::Aggressive => 1.0,
    }
  }

  pub fn is_calm(self) -> bool {
    matches!(self, Self::Positive | Self::Neutral)
  }
}

// ---------------------------------------------------------------------------
// Capability judgments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityCandidate {
  pub priority: Priority,
  pub confidence: f64,
}

/// Structured judgment returned by `TextUnderstanding::classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationJudgment {
  pub category: Category,
  pub suggested: Priority,
  /// Per-level candidate scores. May be empty when the capability only
  /// reports a single suggestion.
  #[serde(default)]
  pub candidates: Vec<PriorityCandidate>,
  pub sentiment: Sentiment,
  pub confidence: f64,
}

impl ClassificationJudgment {
  /// Candidates sorted by confidence descending; equal scores put the less
  /// severe level first so the ranking is deterministic.
  pub fn ranked(&self) -> Vec<PriorityCandidate> {
    if self.candidates.is_empty() {
      return vec![PriorityCandidate {
        priority: self.suggested,
        confidence: self.confidence,
      }];
    }
    let mut ranked = self.candidates.clone();
    ranked.sort_by(|a, b| {
      b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.priority.cmp(&a.priority))
    });
    ranked
  }

  /// Reject out-of-range scores; such a judgment counts as unparsable.
  pub fn validate(&self) -> Result<(), CapabilityError> {
    if !unit_interval(self.confidence) {
      return Err(CapabilityError::Unparsable(format!(
        "confidence {} outside [0,1]",
        self.confidence
      )));
    }
    if let Some(c) = self.candidates.iter().find(|c| !unit_interval(c.confidence)) {
      return Err(CapabilityError::Unparsable(format!(
        "candidate {} confidence {} outside [0,1]",
        c.priority, c.confidence
      )));
    }
    Ok(())
  }
}

/// Commercial intent class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
  None,
  PricingInquiry,
  UpgradeInterest,
  ExpansionNeed,
}

impl IntentType {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "none" | "null" => Some(Self::None),
      "pricing_inquiry" | "pricing_request" | "pricing" | "quote" => Some(Self::PricingInquiry),
      "upgrade_interest" | "upgrade" | "custom_service" => Some(Self::UpgradeInterest),
      "expansion_need" | "expansion" | "capacity" => Some(Self::ExpansionNeed),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::PricingInquiry => "pricing_inquiry",
      Self::UpgradeInterest => "upgrade_interest",
      Self::ExpansionNeed => "expansion_need",
    }
  }
}

/// Contextual intent judgment returned by `TextUnderstanding::detect_intent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentJudgment {
  pub intent: IntentType,
  pub confidence: f64,
  #[serde(default)]
  pub excerpt: String,
  #[serde(default)]
  pub rationale: String,
}

/// FAQ/knowledge-base match from the draft-generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqMatch {
  pub article_id: String,
  pub answer: String,
  pub confidence: f64,
  /// Estimated ticket complexity in 0..=1, when the collaborator reports one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub complexity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
  /// Hard escalation rule fired.
  Override,
  /// Taken from the classification judgment.
  Model,
  /// Capability failed; default level applied.
  Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
  pub source: DecisionSource,
  pub ambiguous: bool,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityDecision {
  pub priority: Priority,
  pub rationale: Rationale,
  pub confidence: f64,
  pub manual_review: bool,
}

/// Specialized support teams plus the default triage queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
  IntegrationsApi,
  DataAnalytics,
  ComplianceOperations,
  GeneralTriage,
}

impl Team {
  /// Queue identifier in the ticketing system.
  pub fn slug(self) -> &'static str {
    match self {
      Self::IntegrationsApi => "integrations-api-team",
      Self::DataAnalytics => "data-analytics-team",
      Self::ComplianceOperations => "compliance-operations-team",
      Self::GeneralTriage => "general-triage-queue",
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      Self::IntegrationsApi => "Integrations & API Team",
      Self::DataAnalytics => "Data & Analytics Team",
      Self::ComplianceOperations => "Compliance & Operations Team",
      Self::GeneralTriage => "General Triage Queue",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamAssignment {
  pub team: Team,
  pub category: Category,
  /// True when the category fell into the default bucket.
  pub defaulted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
  None,
  Elevated,
  Critical,
}

impl RiskLevel {
  pub fn is_alert(self) -> bool {
    !matches!(self, Self::None)
  }
}

/// Per-signal values (each 0..=1) kept for alert context and auditing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSignals {
  pub sentiment: f64,
  pub history: f64,
  pub mrr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
  pub risk_level: RiskLevel,
  /// Composite score in 0..=1.
  pub score: f64,
  pub signals: RiskSignals,
  /// MRR multiplier applied to the sentiment/history base.
  pub sensitivity: f64,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySignal {
  pub intent_type: IntentType,
  pub confidence: f64,
  #[serde(default)]
  pub excerpt: String,
  #[serde(default)]
  pub rationale: String,
}

impl OpportunitySignal {
  pub fn none(rationale: impl Into<String>) -> Self {
    Self {
      intent_type: IntentType::None,
      confidence: 0.0,
      excerpt: String::new(),
      rationale: rationale.into(),
    }
  }

  pub fn is_opportunity(&self) -> bool {
    self.intent_type != IntentType::None
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
  GenerateDraft,
  RouteToTeam { team: Team },
  AlertKam { risk: RiskAssessment },
  AlertSales { signal: OpportunitySignal },
  MarkAutoSendCandidate,
}

/// How a generated draft must be reviewed before reaching the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftReview {
  /// Internal, non-public note; a human rewrites or approves in full.
  InternalNote,
  /// Eligible for one-click human approval. Never sent unattended.
  OneClickApproval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
  pub ticket_id: String,
  pub actions: Vec<Action>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub draft_review: Option<DraftReview>,
}

impl ActionDecision {
  pub fn generates_draft(&self) -> bool {
    self.actions.iter().any(|a| matches!(a, Action::GenerateDraft))
  }

  pub fn routed_team(&self) -> Option<Team> {
    self.actions.iter().find_map(|a| match a {
      Action::RouteToTeam { team } => Some(*team),
      _ => None,
    })
  }

  pub fn alerts_kam(&self) -> bool {
    self.actions.iter().any(|a| matches!(a, Action::AlertKam { .. }))
  }

  pub fn alerts_sales(&self) -> bool {
    self.actions.iter().any(|a| matches!(a, Action::AlertSales { .. }))
  }

  pub fn is_auto_send_candidate(&self) -> bool {
    self
      .actions
      .iter()
      .any(|a| matches!(a, Action::MarkAutoSendCandidate))
  }
}

// ---------------------------------------------------------------------------
// Per-ticket outcome (JSON contract: what we emit)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
  Classification,
  IntentDetection,
  FaqLookup,
  DraftReply,
}

/// A capability that failed for this ticket and was replaced by a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
  pub capability: Capability,
  pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
  pub ticket_id: String,
  pub customer_name: String,
  pub mrr: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub actual_priority: Option<Priority>,
  pub priority: PriorityDecision,
  pub assignment: TeamAssignment,
  pub risk: RiskAssessment,
  pub opportunity: OpportunitySignal,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub faq: Option<FaqMatch>,
  pub decision: ActionDecision,
  pub update: crate::ticketing::TicketUpdate,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub degraded: Vec<Degradation>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub alerts: Vec<crate::alerts::AlertReceipt>,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for rejected input lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub line: Option<usize>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
      line: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }

  pub fn with_line(mut self, line: usize) -> Self {
    self.line = Some(line);
    self
  }
}

pub(crate) fn unit_interval(v: f64) -> bool {
  v.is_finite() && (0.0..=1.0).contains(&v)
}
