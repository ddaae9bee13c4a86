//! Guardian (KAM) and Opportunity (Sales) alerts.
//!
//! Alerts are composed from a finished outcome, so composition is pure and
//! deterministic: the alert id is a BLAKE3 digest of ticket id and alert
//! kind. Delivery goes through an `AlertGateway` with bounded retry; an alert
//! that still cannot be delivered is appended to a JSON-lines outbox instead
//! of being dropped.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::CapabilityError;
use crate::opportunity::recommended_approach;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
  /// Key account management.
  Kam,
  Sales,
}

/// Alert body. The tag doubles as the template kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum AlertPayload {
  ChurnRisk {
    customer_name: String,
    mrr: f64,
    risk_level: RiskLevel,
    risk_score: f64,
    signals: RiskSignals,
    evidence: Vec<String>,
    priority: Priority,
    team: Team,
    response_window: String,
  },
  RevenueOpportunity {
    customer_name: String,
    mrr: f64,
    intent_type: IntentType,
    confidence: f64,
    excerpt: String,
    rationale: String,
    approach: String,
    response_window: String,
  },
}

impl AlertPayload {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::ChurnRisk { .. } => "churn_risk",
      Self::RevenueOpportunity { .. } => "revenue_opportunity",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
  pub alert_id: String,
  pub ticket_id: String,
  pub role: RecipientRole,
  pub recipient: String,
  pub subject: String,
  pub payload: AlertPayload,
}

/// Where each role's alerts go.
#[derive(Debug, Clone)]
pub struct Recipients {
  pub kam: String,
  pub sales: String,
}

impl Default for Recipients {
  fn default() -> Self {
    Self {
      kam: "key-account-managers".into(),
      sales: "sales-team".into(),
    }
  }
}

pub fn alert_id(ticket_id: &str, kind: &str) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(ticket_id.as_bytes());
  hasher.update(b"\0");
  hasher.update(kind.as_bytes());
  hasher.finalize().to_hex()[..16].to_string()
}

/// Alerts implied by the outcome's action decision, KAM first.
pub fn compose(outcome: &TriageOutcome, recipients: &Recipients) -> Vec<Alert> {
  let mut alerts = Vec::new();

  for action in &outcome.decision.actions {
    let (role, recipient, subject, payload) = match action {
      Action::AlertKam { risk } => (
        RecipientRole::Kam,
        recipients.kam.clone(),
        format!(
          "[{}] Churn risk: {} ({:.0} MRR)",
          risk_label(risk.risk_level),
          outcome.customer_name,
          outcome.mrr
        ),
        AlertPayload::ChurnRisk {
          customer_name: outcome.customer_name.clone(),
          mrr: outcome.mrr,
          risk_level: risk.risk_level,
          risk_score: risk.score,
          signals: risk.signals,
          evidence: risk.evidence.clone(),
          priority: outcome.priority.priority,
          team: outcome.assignment.team,
          response_window: match risk.risk_level {
            RiskLevel::Critical => "2 hours".into(),
            _ => "24 hours".into(),
          },
        },
      ),
      Action::AlertSales { signal } => (
        RecipientRole::Sales,
        recipients.sales.clone(),
        format!(
          "Revenue opportunity: {} ({})",
          outcome.customer_name,
          signal.intent_type.as_str()
        ),
        AlertPayload::RevenueOpportunity {
          customer_name: outcome.customer_name.clone(),
          mrr: outcome.mrr,
          intent_type: signal.intent_type,
          confidence: signal.confidence,
          excerpt: signal.excerpt.clone(),
          rationale: signal.rationale.clone(),
          approach: recommended_approach(signal.intent_type).to_string(),
          response_window: "24 hours".into(),
        },
      ),
      _ => continue,
    };
    alerts.push(Alert {
      alert_id: alert_id(&outcome.ticket_id, payload.kind()),
      ticket_id: outcome.ticket_id.clone(),
      role,
      recipient,
      subject,
      payload,
    });
  }

  alerts
}

fn risk_label(level: RiskLevel) -> &'static str {
  match level {
    RiskLevel::None => "NONE",
    RiskLevel::Elevated => "ELEVATED",
    RiskLevel::Critical => "CRITICAL",
  }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AlertGateway: Send + Sync {
  async fn send(&self, alert: &Alert) -> Result<(), CapabilityError>;
}

/// POSTs each alert as JSON to a webhook (email relay, chat hook).
pub struct WebhookGateway {
  client: reqwest::Client,
  url: String,
  timeout: Duration,
}

impl WebhookGateway {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CapabilityError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      url: url.into(),
      timeout,
    })
  }
}

#[async_trait]
impl AlertGateway for WebhookGateway {
  async fn send(&self, alert: &Alert) -> Result<(), CapabilityError> {
    let response = self
      .client
      .post(&self.url)
      .json(alert)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          CapabilityError::Timeout(self.timeout.as_millis() as u64)
        } else {
          CapabilityError::Transport(e.to_string())
        }
      })?;
    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      let body = response.text().await.unwrap_or_default();
      Err(CapabilityError::Status(status.as_u16(), body.chars().take(200).collect()))
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
  Sent,
  /// Written to the outbox for later redelivery.
  Outboxed,
  /// Dry run: composed, not delivered.
  Suppressed,
  /// Gateway and outbox both failed; logged at error level.
  Undeliverable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReceipt {
  pub alert_id: String,
  pub role: RecipientRole,
  pub status: DeliveryStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
  queued_at: String,
  reason: &'a str,
  alert: &'a Alert,
}

/// Append-only JSON-lines file of undelivered alerts.
pub struct AlertOutbox {
  path: PathBuf,
  lock: Mutex<()>,
}

impl AlertOutbox {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      lock: Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub async fn append(&self, alert: &Alert, reason: &str) -> std::io::Result<()> {
    let entry = OutboxEntry {
      queued_at: Utc::now().to_rfc3339(),
      reason,
      alert,
    };
    let mut line = serde_json::to_string(&entry)?;
    line.push('\n');

    let _guard = self.lock.lock().await;
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
  }
}

pub struct AlertDispatcher {
  gateway: Option<Arc<dyn AlertGateway>>,
  outbox: AlertOutbox,
  retry: RetryPolicy,
  recipients: Recipients,
  dry_run: bool,
}

impl AlertDispatcher {
  pub fn new(
    gateway: Option<Arc<dyn AlertGateway>>,
    outbox: AlertOutbox,
    retry: RetryPolicy,
    recipients: Recipients,
  ) -> Self {
    Self {
      gateway,
      outbox,
      retry,
      recipients,
      dry_run: false,
    }
  }

  pub fn dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  /// Compose and deliver every alert the outcome calls for.
  pub async fn dispatch_for(&self, outcome: &TriageOutcome) -> Vec<AlertReceipt> {
    let mut receipts = Vec::new();
    for alert in compose(outcome, &self.recipients) {
      receipts.push(self.dispatch(&alert).await);
    }
    receipts
  }

  pub async fn dispatch(&self, alert: &Alert) -> AlertReceipt {
    let receipt = |status, detail: Option<String>| AlertReceipt {
      alert_id: alert.alert_id.clone(),
      role: alert.role,
      status,
      detail,
    };

    if self.dry_run {
      info!(alert_id = %alert.alert_id, ticket_id = %alert.ticket_id, kind = alert.payload.kind(), "dry run, alert suppressed");
      return receipt(DeliveryStatus::Suppressed, None);
    }

    let reason = match &self.gateway {
      Some(gateway) => match with_retry(&self.retry, "alert_gateway", || gateway.send(alert)).await {
        Ok(()) => {
          info!(alert_id = %alert.alert_id, ticket_id = %alert.ticket_id, kind = alert.payload.kind(), "alert sent");
          return receipt(DeliveryStatus::Sent, None);
        }
        Err(e) => {
          warn!(alert_id = %alert.alert_id, error = %e, "alert delivery failed, writing to outbox");
          e.to_string()
        }
      },
      None => "no alert gateway configured".to_string(),
    };

    match self.outbox.append(alert, &reason).await {
      Ok(()) => receipt(DeliveryStatus::Outboxed, Some(reason)),
      Err(e) => {
        error!(
          alert_id = %alert.alert_id,
          ticket_id = %alert.ticket_id,
          outbox = %self.outbox.path().display(),
          error = %e,
          "alert undeliverable: gateway and outbox both failed"
        );
        receipt(DeliveryStatus::Undeliverable, Some(format!("{}; outbox: {}", reason, e)))
      }
    }
  }
}
