//! Engine configuration with sane defaults.
//!
//! One versioned TOML document holds the calibration policy (rubric, priority
//! targets, escalation wording, Guardian weights, gate thresholds) and the
//! runtime limits. Every field has a default so partial files are valid;
//! `validate` runs on every load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EngineError;
use crate::retry::RetryPolicy;
use crate::types::{unit_interval, Category};

pub const CONFIG_VERSION: u32 = 1;

/// Allowed deviation of the priority target sum from 1.0.
const TARGET_SUM_TOLERANCE: f64 = 0.05;

/// Satisfaction scores are reported on a 1..=5 scale.
pub const SATISFACTION_MIN: f64 = 1.0;
pub const SATISFACTION_MAX: f64 = 5.0;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(flatten)]
  pub calibration: CalibrationConfig,
  #[serde(default)]
  pub runtime: RuntimeConfig,
}

impl Config {
  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_toml_str(&raw)
  }

  pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
    let config: Config = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    self.calibration.validate()?;
    self.runtime.validate()
  }
}

/// Classification policy injected into every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
  pub version: u32,
  /// Category definitions sent to the text-understanding capability.
  pub categories: Vec<CategoryDefinition>,
  pub priority: PriorityConfig,
  pub guardian: GuardianConfig,
  pub opportunity: OpportunityConfig,
  pub auto_send: AutoSendConfig,
}

impl Default for CalibrationConfig {
  fn default() -> Self {
    Self {
      version: CONFIG_VERSION,
      categories: default_categories(),
      priority: PriorityConfig::default(),
      guardian: GuardianConfig::default(),
      opportunity: OpportunityConfig::default(),
      auto_send: AutoSendConfig::default(),
    }
  }
}

impl CalibrationConfig {
  pub fn validate(&self) -> Result<(), EngineError> {
    if self.version != CONFIG_VERSION {
      return Err(EngineError::config(
        "version",
        &format!("unsupported version {} (expected {})", self.version, CONFIG_VERSION),
      ));
    }
    self.priority.validate()?;
    self.guardian.validate()?;
    self.opportunity.validate()?;
    self.auto_send.validate()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDefinition {
  pub category: Category,
  pub description: String,
}

fn default_categories() -> Vec<CategoryDefinition> {
  vec![
    CategoryDefinition {
      category: Category::Integrations,
      description: "Store connectors (Shopify, WooCommerce), webhooks, API keys, sync jobs".into(),
    },
    CategoryDefinition {
      category: Category::DataAnalytics,
      description: "Reports, dashboards, exports, metric discrepancies".into(),
    },
    CategoryDefinition {
      category: Category::CompliancePayments,
      description: "Payments, invoices, refunds, tax, GDPR and account security".into(),
    },
    CategoryDefinition {
      category: Category::Other,
      description: "Anything that does not fit the technical categories above".into(),
    },
  ]
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Expected share of tickets per level. Descriptive only: compared offline,
/// never enforced per ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTargets {
  pub p0: f64,
  pub p1: f64,
  pub p2: f64,
  pub p3: f64,
}

impl Default for PriorityTargets {
  fn default() -> Self {
    Self {
      p0: 0.03,
      p1: 0.30,
      p2: 0.40,
      p3: 0.25,
    }
  }
}

impl PriorityTargets {
  pub fn as_array(&self) -> [f64; 4] {
    [self.p0, self.p1, self.p2, self.p3]
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
  pub targets: PriorityTargets,
  /// Confidence gap between the top two candidates below which the lower
  /// severity level wins.
  pub ambiguity_threshold: f64,
  /// Critical-escalation wording (outage, data loss, breach).
  pub escalation_terms: Vec<String>,
  /// Operational-impact wording that must co-occur with an escalation term.
  pub impact_phrases: Vec<String>,
  /// Max deviation per level tolerated by the offline calibration report.
  pub calibration_tolerance: f64,
}

impl Default for PriorityConfig {
  fn default() -> Self {
    Self {
      targets: PriorityTargets::default(),
      ambiguity_threshold: 0.15,
      escalation_terms: [
        "system down",
        "site down",
        "is down",
        "outage",
        "data loss",
        "lost data",
        "security breach",
        "breach",
        "hacked",
        "all customers affected",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      impact_phrases: [
        "not processing",
        "cannot process",
        "can't process",
        "orders",
        "payments",
        "checkout",
        "all customers",
        "all users",
        "production",
        "revenue",
        "cannot access",
        "can't access",
        "blocking",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      calibration_tolerance: 0.10,
    }
  }
}

impl PriorityConfig {
  fn validate(&self) -> Result<(), EngineError> {
    let targets = self.targets.as_array();
    if targets.iter().any(|t| !unit_interval(*t)) {
      return Err(EngineError::config("priority.targets", "each target must be in [0,1]"));
    }
    let sum: f64 = targets.iter().sum();
    if (sum - 1.0).abs() > TARGET_SUM_TOLERANCE {
      return Err(EngineError::config(
        "priority.targets",
        &format!("targets sum to {:.2}, expected 1.0", sum),
      ));
    }
    if !(0.0..=0.5).contains(&self.ambiguity_threshold) {
      return Err(EngineError::config("priority.ambiguity_threshold", "must be in [0,0.5]"));
    }
    if self.escalation_terms.iter().all(|t| t.trim().is_empty()) {
      return Err(EngineError::config("priority.escalation_terms", "must not be empty"));
    }
    if self.impact_phrases.iter().all(|t| t.trim().is_empty()) {
      return Err(EngineError::config("priority.impact_phrases", "must not be empty"));
    }
    if !unit_interval(self.calibration_tolerance) {
      return Err(EngineError::config("priority.calibration_tolerance", "must be in [0,1]"));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Guardian
// ---------------------------------------------------------------------------

/// Churn-risk scoring coefficients.
///
/// composite = (sentiment_weight * sentiment + history_weight * history)
///             * (1 + mrr_sensitivity * mrr_signal), clamped to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
  pub sentiment_weight: f64,
  pub history_weight: f64,
  /// Max extra sensitivity granted to accounts at or above `mrr_reference`.
  pub mrr_sensitivity: f64,
  /// MRR at which the MRR signal saturates at 1.0.
  pub mrr_reference: f64,
  /// History risk contributed by a repeat issue.
  pub repeat_issue_risk: f64,
  /// Satisfaction at or above this is not a risk signal.
  pub satisfaction_neutral: f64,
  /// History risk contributed by the lowest possible satisfaction.
  pub satisfaction_risk: f64,
  pub elevated_cut: f64,
  pub critical_cut: f64,
}

impl Default for GuardianConfig {
  fn default() -> Self {
    Self {
      sentiment_weight: 0.55,
      history_weight: 0.45,
      mrr_sensitivity: 0.5,
      mrr_reference: 5000.0,
      repeat_issue_risk: 0.6,
      satisfaction_neutral: 3.5,
      satisfaction_risk: 0.4,
      elevated_cut: 0.45,
      critical_cut: 0.7,
    }
  }
}

impl GuardianConfig {
  fn validate(&self) -> Result<(), EngineError> {
    for (field, v) in [
      ("guardian.sentiment_weight", self.sentiment_weight),
      ("guardian.history_weight", self.history_weight),
      ("guardian.repeat_issue_risk", self.repeat_issue_risk),
      ("guardian.satisfaction_risk", self.satisfaction_risk),
    ] {
      if !unit_interval(v) {
        return Err(EngineError::config(field, "must be in [0,1]"));
      }
    }
    if (self.sentiment_weight + self.history_weight - 1.0).abs() > 1e-6 {
      return Err(EngineError::config(
        "guardian.sentiment_weight",
        "sentiment_weight + history_weight must equal 1.0",
      ));
    }
    if !self.mrr_sensitivity.is_finite() || self.mrr_sensitivity < 0.0 {
      return Err(EngineError::config("guardian.mrr_sensitivity", "must be non-negative"));
    }
    if !self.mrr_reference.is_finite() || self.mrr_reference <= 0.0 {
      return Err(EngineError::config("guardian.mrr_reference", "must be positive"));
    }
    if !(SATISFACTION_MIN..=SATISFACTION_MAX).contains(&self.satisfaction_neutral)
      || self.satisfaction_neutral <= SATISFACTION_MIN
    {
      return Err(EngineError::config(
        "guardian.satisfaction_neutral",
        "must be within the satisfaction scale and above its minimum",
      ));
    }
    if !(self.elevated_cut > 0.0 && self.elevated_cut < self.critical_cut && self.critical_cut <= 1.0) {
      return Err(EngineError::config(
        "guardian.elevated_cut",
        "cut points must satisfy 0 < elevated < critical <= 1",
      ));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityConfig {
  /// Intent judgments below this confidence collapse to `none`.
  pub min_confidence: f64,
  pub max_excerpt_chars: usize,
}

impl Default for OpportunityConfig {
  fn default() -> Self {
    Self {
      min_confidence: 0.6,
      max_excerpt_chars: 200,
    }
  }
}

impl OpportunityConfig {
  fn validate(&self) -> Result<(), EngineError> {
    if !unit_interval(self.min_confidence) {
      return Err(EngineError::config("opportunity.min_confidence", "must be in [0,1]"));
    }
    if self.max_excerpt_chars == 0 {
      return Err(EngineError::config("opportunity.max_excerpt_chars", "must be positive"));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Auto-send gate
// ---------------------------------------------------------------------------

/// Thresholds for flagging a draft as a one-click approval candidate.
/// All comparisons are strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSendConfig {
  pub min_faq_confidence: f64,
  pub max_complexity: f64,
  pub min_satisfaction: f64,
}

impl Default for AutoSendConfig {
  fn default() -> Self {
    Self {
      min_faq_confidence: 0.95,
      max_complexity: 0.3,
      min_satisfaction: 4.0,
    }
  }
}

impl AutoSendConfig {
  fn validate(&self) -> Result<(), EngineError> {
    if !unit_interval(self.min_faq_confidence) {
      return Err(EngineError::config("auto_send.min_faq_confidence", "must be in [0,1]"));
    }
    if !unit_interval(self.max_complexity) || self.max_complexity == 0.0 {
      return Err(EngineError::config("auto_send.max_complexity", "must be in (0,1]"));
    }
    if !(SATISFACTION_MIN..=SATISFACTION_MAX).contains(&self.min_satisfaction) {
      return Err(EngineError::config(
        "auto_send.min_satisfaction",
        "must be within the satisfaction scale",
      ));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
  /// Tickets processed concurrently (bounds calls to external services).
  pub max_in_flight: usize,
  pub retry_attempts: u32,
  pub backoff_base_ms: u64,
  pub backoff_max_ms: u64,
  /// Per-call timeout for external capabilities.
  pub call_timeout_ms: u64,
  /// Stop dispatching new tickets after this many seconds.
  pub run_timeout_secs: Option<u64>,
  /// JSON-lines file receiving alerts that could not be delivered.
  pub outbox_path: PathBuf,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_in_flight: 4,
      retry_attempts: 3,
      backoff_base_ms: 250,
      backoff_max_ms: 4_000,
      call_timeout_ms: 20_000,
      run_timeout_secs: None,
      outbox_path: PathBuf::from("triage-alert-outbox.jsonl"),
    }
  }
}

impl RuntimeConfig {
  fn validate(&self) -> Result<(), EngineError> {
    if self.max_in_flight == 0 {
      return Err(EngineError::config("runtime.max_in_flight", "must be at least 1"));
    }
    if self.retry_attempts == 0 {
      return Err(EngineError::config("runtime.retry_attempts", "must be at least 1"));
    }
    if self.backoff_base_ms > self.backoff_max_ms {
      return Err(EngineError::config(
        "runtime.backoff_base_ms",
        "must not exceed backoff_max_ms",
      ));
    }
    if self.call_timeout_ms == 0 {
      return Err(EngineError::config("runtime.call_timeout_ms", "must be positive"));
    }
    Ok(())
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry_attempts,
      base_delay: Duration::from_millis(self.backoff_base_ms),
      max_delay: Duration::from_millis(self.backoff_max_ms),
      call_timeout: Duration::from_millis(self.call_timeout_ms),
    }
  }

  pub fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_secs.map(Duration::from_secs)
  }
}

// ---------------------------------------------------------------------------
// External service endpoints (environment)
// ---------------------------------------------------------------------------

/// Endpoints and credentials; read from the environment, never from the
/// calibration file.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
  pub llm_url: String,
  pub llm_model: String,
  pub llm_api_key: Option<String>,
  pub alert_webhook_url: Option<String>,
  pub kam_recipient: String,
  pub sales_recipient: String,
}

impl ServiceConfig {
  pub fn from_env() -> Self {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    Self {
      llm_url: var("TRIAGE_LLM_URL").unwrap_or_else(|| "http://localhost:8080/v1".into()),
      llm_model: var("TRIAGE_LLM_MODEL").unwrap_or_else(|| "triage-classifier".into()),
      llm_api_key: var("TRIAGE_LLM_API_KEY"),
      alert_webhook_url: var("TRIAGE_ALERT_WEBHOOK_URL"),
      kam_recipient: var("TRIAGE_KAM_RECIPIENT").unwrap_or_else(|| "key-account-managers".into()),
      sales_recipient: var("TRIAGE_SALES_RECIPIENT").unwrap_or_else(|| "sales-team".into()),
    }
  }
}
