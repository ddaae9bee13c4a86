//! Guardian churn-risk scoring: sentiment + account history, amplified by MRR.
//!
//! MRR never creates risk on its own; it scales the sentiment/history base so
//! high-value accounts cross the `elevated` cut at a lower base risk.

use crate::config::{GuardianConfig, SATISFACTION_MIN};
use crate::types::*;

/// History risk in 0..=1. Unknown history is neutral (0).
pub fn history_signal(history: &AccountHistory, config: &GuardianConfig) -> f64 {
  let repeat = if history.repeat_issue == Some(true) {
    config.repeat_issue_risk
  } else {
    0.0
  };
  let satisfaction = match history.satisfaction {
    Some(score) if score < config.satisfaction_neutral => {
      let span = config.satisfaction_neutral - SATISFACTION_MIN;
      ((config.satisfaction_neutral - score) / span).clamp(0.0, 1.0) * config.satisfaction_risk
    }
    _ => 0.0,
  };
  (repeat + satisfaction).min(1.0)
}

/// MRR signal in 0..=1, saturating at `mrr_reference`.
pub fn mrr_signal(mrr: f64, config: &GuardianConfig) -> f64 {
  (mrr / config.mrr_reference).clamp(0.0, 1.0)
}

/// Score churn risk. `sentiment` is `None` when no judgment was available and
/// is then scored as neutral.
pub fn assess(ticket: &Ticket, sentiment: Option<Sentiment>, config: &GuardianConfig) -> RiskAssessment {
  let sentiment = sentiment.unwrap_or(Sentiment::Neutral);
  let signals = RiskSignals {
    sentiment: sentiment.severity(),
    history: history_signal(&ticket.history, config),
    mrr: mrr_signal(ticket.mrr, config),
  };

  let base = config.sentiment_weight * signals.sentiment + config.history_weight * signals.history;
  let sensitivity = 1.0 + config.mrr_sensitivity * signals.mrr;
  let score = round4((base * sensitivity).min(1.0));

  let risk_level = if score >= config.critical_cut {
    RiskLevel::Critical
  } else if score >= config.elevated_cut {
    RiskLevel::Elevated
  } else {
    RiskLevel::None
  };

  let mut evidence = Vec::new();
  if matches!(sentiment, Sentiment::Frustrated | Sentiment::Aggressive) {
    evidence.push(format!("{:?} tone", sentiment).to_lowercase());
  }
  if ticket.history.repeat_issue == Some(true) {
    evidence.push("repeat issue".into());
  }
  if let Some(score) = ticket.history.satisfaction {
    if score < config.satisfaction_neutral {
      evidence.push(format!("satisfaction {:.1}/5", score));
    }
  }
  if signals.mrr > 0.0 && base > 0.0 {
    evidence.push(format!("MRR {:.0} raises sensitivity x{:.2}", ticket.mrr, sensitivity));
  }

  RiskAssessment {
    risk_level,
    score,
    signals,
    sensitivity: round4(sensitivity),
    evidence,
  }
}

/// Round to 4 decimals so identical inputs serialize identically.
fn round4(v: f64) -> f64 {
  (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn ticket(mrr: f64, repeat_issue: Option<bool>, satisfaction: Option<f64>) -> Ticket {
    Ticket {
      id: "T-1".into(),
      customer_name: "Acme".into(),
      subject: "s".into(),
      description: "d".into(),
      channel: "email".into(),
      timestamp: Utc::now(),
      mrr,
      history: AccountHistory {
        repeat_issue,
        satisfaction,
      },
      actual_priority: None,
      normalized_text: "s d".into(),
    }
  }

  #[test]
  fn frustrated_repeat_high_mrr_is_critical() {
    let r = assess(
      &ticket(5000.0, Some(true), None),
      Some(Sentiment::Frustrated),
      &GuardianConfig::default(),
    );
    assert_eq!(r.risk_level, RiskLevel::Critical);
    assert!((r.signals.mrr - 1.0).abs() < 1e-9);
    assert!(r.evidence.iter().any(|e| e == "repeat issue"));
  }

  #[test]
  fn calm_first_contact_is_none() {
    let r = assess(&ticket(5000.0, None, None), Some(Sentiment::Neutral), &GuardianConfig::default());
    assert_eq!(r.risk_level, RiskLevel::None);
  }

  #[test]
  fn high_mrr_crosses_elevated_where_low_mrr_does_not() {
    let config = GuardianConfig::default();
    let low = assess(&ticket(100.0, None, None), Some(Sentiment::Frustrated), &config);
    let high = assess(&ticket(8000.0, None, None), Some(Sentiment::Frustrated), &config);
    assert_eq!(low.risk_level, RiskLevel::None);
    assert_eq!(high.risk_level, RiskLevel::Elevated);
    assert!(high.score > low.score);
  }

  #[test]
  fn mrr_alone_creates_no_risk() {
    let r = assess(&ticket(1_000_000.0, None, None), Some(Sentiment::Positive), &GuardianConfig::default());
    assert_eq!(r.score, 0.0);
    assert_eq!(r.risk_level, RiskLevel::None);
  }

  #[test]
  fn missing_sentiment_scored_as_neutral() {
    let config = GuardianConfig::default();
    let t = ticket(2000.0, Some(true), None);
    assert_eq!(assess(&t, None, &config), assess(&t, Some(Sentiment::Neutral), &config));
  }

  #[test]
  fn low_satisfaction_adds_history_risk() {
    let config = GuardianConfig::default();
    assert_eq!(history_signal(&AccountHistory::default(), &config), 0.0);
    let h = AccountHistory {
      repeat_issue: None,
      satisfaction: Some(SATISFACTION_MIN),
    };
    assert!((history_signal(&h, &config) - config.satisfaction_risk).abs() < 1e-9);
    let happy = AccountHistory {
      repeat_issue: None,
      satisfaction: Some(4.8),
    };
    assert_eq!(history_signal(&happy, &config), 0.0);
  }

  #[test]
  fn aggressive_alone_is_elevated() {
    let r = assess(&ticket(0.0, None, None), Some(Sentiment::Aggressive), &GuardianConfig::default());
    assert_eq!(r.risk_level, RiskLevel::Elevated);
  }

  #[test]
  fn score_is_clamped() {
    let r = assess(
      &ticket(50_000.0, Some(true), Some(1.0)),
      Some(Sentiment::Aggressive),
      &GuardianConfig::default(),
    );
    assert!(r.score <= 1.0);
    assert_eq!(r.risk_level, RiskLevel::Critical);
  }
}
