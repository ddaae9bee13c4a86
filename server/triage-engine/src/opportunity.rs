//! Opportunity intent detection: gate the capability's contextual intent
//! judgment on confidence and attach the triggering excerpt.

use crate::config::OpportunityConfig;
use crate::error::CapabilityError;
use crate::normalize::normalize_text;
use crate::types::*;

pub fn detect(
  ticket: &Ticket,
  judgment: Result<&IntentJudgment, &CapabilityError>,
  config: &OpportunityConfig,
) -> OpportunitySignal {
  let judgment = match judgment {
    Ok(j) => j,
    Err(e) => return OpportunitySignal::none(format!("intent detection unavailable: {}", e)),
  };

  if !unit_interval(judgment.confidence) {
    return OpportunitySignal::none(format!(
      "intent confidence {} outside [0,1]",
      judgment.confidence
    ));
  }
  if judgment.intent == IntentType::None {
    return OpportunitySignal::none(judgment.rationale.clone());
  }
  if judgment.confidence < config.min_confidence {
    return OpportunitySignal::none(format!(
      "{} at {:.2} below threshold {:.2}",
      judgment.intent.as_str(),
      judgment.confidence,
      config.min_confidence
    ));
  }

  let excerpt = if judgment.excerpt.trim().is_empty() {
    first_sentence(&ticket.description)
  } else {
    judgment.excerpt.trim()
  };

  let mut rationale = judgment.rationale.clone();
  if !normalize_text(&ticket.text()).contains(&normalize_text(excerpt)) {
    if !rationale.is_empty() {
      rationale.push(' ');
    }
    rationale.push_str("(excerpt paraphrased)");
  }

  OpportunitySignal {
    intent_type: judgment.intent,
    confidence: judgment.confidence,
    excerpt: truncate_chars(excerpt, config.max_excerpt_chars),
    rationale,
  }
}

/// Suggested sales approach per intent, included in the Sales alert.
pub fn recommended_approach(intent: IntentType) -> &'static str {
  match intent {
    IntentType::PricingInquiry => "Provide a detailed pricing breakdown and highlight ROI",
    IntentType::UpgradeInterest => {
      "Showcase higher-tier features, offer a demo and discuss the migration path"
    }
    IntentType::ExpansionNeed => {
      "Present volume options, discuss scalability and flexible payment terms"
    }
    IntentType::None => "Understand specific needs and provide a tailored solution",
  }
}

fn first_sentence(text: &str) -> &str {
  let text = text.trim();
  let sentence = match text.find(|c: char| matches!(c, '.' | '?' | '!' | '\n')) {
    Some(idx) => &text[..=idx],
    None => text,
  };
  sentence.trim()
}

fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => format!("{}...", &s[..idx]),
    None => s.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::normalize::normalize;

  fn ticket(description: &str) -> Ticket {
    normalize(&InboundTicket {
      id: "T-9".into(),
      subject: "Question".into(),
      description: description.into(),
      timestamp: "2025-01-15T10:30:00Z".into(),
      mrr: 800.0,
      ..Default::default()
    })
    .unwrap()
  }

  fn intent(intent: IntentType, confidence: f64, excerpt: &str) -> IntentJudgment {
    IntentJudgment {
      intent,
      confidence,
      excerpt: excerpt.into(),
      rationale: "buying signal".into(),
    }
  }

  #[test]
  fn confident_pricing_inquiry_fires() {
    let t = ticket("What's your pricing for adding 2 more stores?");
    let j = intent(IntentType::PricingInquiry, 0.9, "pricing for adding 2 more stores");
    let s = detect(&t, Ok(&j), &OpportunityConfig::default());
    assert_eq!(s.intent_type, IntentType::PricingInquiry);
    assert_eq!(s.excerpt, "pricing for adding 2 more stores");
    assert!(!s.rationale.contains("paraphrased"));
  }

  #[test]
  fn low_confidence_collapses_to_none() {
    let t = ticket("The price on my invoice is wrong, please fix it.");
    let j = intent(IntentType::PricingInquiry, 0.3, "price on my invoice");
    let s = detect(&t, Ok(&j), &OpportunityConfig::default());
    assert_eq!(s.intent_type, IntentType::None);
    assert!(s.rationale.contains("below threshold"));
  }

  #[test]
  fn capability_failure_is_none() {
    let t = ticket("Can we get a quote for 50 more users?");
    let err = CapabilityError::Timeout(1000);
    let s = detect(&t, Err(&err), &OpportunityConfig::default());
    assert!(!s.is_opportunity());
  }

  #[test]
  fn missing_excerpt_uses_first_sentence() {
    let t = ticket("We want the enterprise plan. Who do we talk to?");
    let j = intent(IntentType::UpgradeInterest, 0.8, "");
    let s = detect(&t, Ok(&j), &OpportunityConfig::default());
    assert_eq!(s.excerpt, "We want the enterprise plan.");
  }

  #[test]
  fn excerpt_is_truncated() {
    let t = ticket("Need 40 more seats for the new warehouse team");
    let j = intent(IntentType::ExpansionNeed, 0.95, "Need 40 more seats for the new warehouse team");
    let config = OpportunityConfig {
      max_excerpt_chars: 10,
      ..OpportunityConfig::default()
    };
    let s = detect(&t, Ok(&j), &config);
    assert_eq!(s.excerpt, "Need 40 mo...");
  }

  #[test]
  fn paraphrased_excerpt_is_flagged() {
    let t = ticket("How much would it cost to add three locations?");
    let j = intent(IntentType::PricingInquiry, 0.85, "cost of extra stores");
    let s = detect(&t, Ok(&j), &OpportunityConfig::default());
    assert!(s.rationale.ends_with("(excerpt paraphrased)"));
  }
}
