//! Priority classifier: hard escalation overrides first, then the model
//! judgment with a lower-severity tie-break under ambiguity.

use crate::config::PriorityConfig;
use crate::error::CapabilityError;
use crate::normalize::{normalize_text, phrase_spans};
use crate::types::*;

/// Level applied when no usable judgment exists.
pub const FALLBACK_PRIORITY: Priority = Priority::P2;

/// Escalation terms and impact phrases found in the ticket text, when both
/// are present. Impact phrases inside a matched escalation term do not count
/// as corroboration.
pub fn escalation_override(ticket: &Ticket, config: &PriorityConfig) -> Option<Vec<String>> {
  let text = &ticket.normalized_text;

  let mut term_spans = Vec::new();
  let mut matched = Vec::new();
  for term in &config.escalation_terms {
    let spans = phrase_spans(text, &normalize_text(term));
    if !spans.is_empty() {
      matched.push(term.clone());
      term_spans.extend(spans);
    }
  }
  if matched.is_empty() {
    return None;
  }

  let overlaps = |(s, e): (usize, usize)| term_spans.iter().any(|&(ts, te)| s < te && ts < e);
  let impact: Vec<String> = config
    .impact_phrases
    .iter()
    .filter(|p| {
      phrase_spans(text, &normalize_text(p))
        .into_iter()
        .any(|span| !overlaps(span))
    })
    .cloned()
    .collect();
  if impact.is_empty() {
    return None;
  }

  matched.extend(impact);
  Some(matched)
}

/// Decide the final priority for a ticket.
///
/// `judgment` is the capability's result; an error or out-of-range judgment
/// degrades to P2 with the manual-review flag set. The escalation override
/// depends on text alone and applies either way.
pub fn classify(
  ticket: &Ticket,
  judgment: Result<&ClassificationJudgment, &CapabilityError>,
  config: &PriorityConfig,
) -> PriorityDecision {
  let usable = judgment.ok().filter(|j| j.validate().is_ok());

  if let Some(terms) = escalation_override(ticket, config) {
    return PriorityDecision {
      priority: Priority::P0,
      rationale: Rationale {
        source: DecisionSource::Override,
        ambiguous: false,
        matched_terms: terms,
      },
      confidence: 1.0,
      manual_review: usable.is_none(),
    };
  }

  let Some(judgment) = usable else {
    return PriorityDecision {
      priority: FALLBACK_PRIORITY,
      rationale: Rationale {
        source: DecisionSource::Fallback,
        ambiguous: false,
        matched_terms: Vec::new(),
      },
      confidence: 0.0,
      manual_review: true,
    };
  };

  let ranked = judgment.ranked();
  let top = ranked[0];
  let (priority, confidence, ambiguous) = match ranked.get(1) {
    Some(second)
      if second.priority != top.priority
        && top.confidence - second.confidence < config.ambiguity_threshold =>
    {
      let lower = top.priority.less_severe(second.priority);
      let confidence = if lower == top.priority {
        top.confidence
      } else {
        second.confidence
      };
      (lower, confidence, true)
    }
    _ => (top.priority, top.confidence, false),
  };

  PriorityDecision {
    priority,
    rationale: Rationale {
      source: DecisionSource::Model,
      ambiguous,
      matched_terms: Vec::new(),
    },
    confidence,
    manual_review: false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::normalize::normalize;

  fn ticket(subject: &str, description: &str) -> Ticket {
    normalize(&InboundTicket {
      id: "T-1".into(),
      subject: subject.into(),
      description: description.into(),
      timestamp: "2025-01-15T10:30:00Z".into(),
      mrr: 500.0,
      ..Default::default()
    })
    .unwrap()
  }

  fn judgment(candidates: &[(Priority, f64)]) -> ClassificationJudgment {
    ClassificationJudgment {
      category: Category::Integrations,
      suggested: candidates[0].0,
      candidates: candidates
        .iter()
        .map(|&(priority, confidence)| PriorityCandidate { priority, confidence })
        .collect(),
      sentiment: Sentiment::Neutral,
      confidence: candidates[0].1,
    }
  }

  #[test]
  fn outage_with_impact_forces_p0() {
    let t = ticket("URGENT", "Our orders not processing, system down since 9am");
    let j = judgment(&[(Priority::P3, 0.99)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P0);
    assert_eq!(d.rationale.source, DecisionSource::Override);
    assert!(d.rationale.matched_terms.iter().any(|t| t == "system down"));
    assert!(!d.manual_review);
  }

  #[test]
  fn escalation_term_alone_is_not_enough() {
    let t = ticket("Maintenance", "Is there a planned outage window next week?");
    let j = judgment(&[(Priority::P3, 0.9)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P3);
    assert_eq!(d.rationale.source, DecisionSource::Model);
  }

  #[test]
  fn impact_inside_escalation_term_does_not_corroborate() {
    let config = PriorityConfig {
      escalation_terms: vec!["payments outage".into()],
      impact_phrases: vec!["payments".into()],
      ..PriorityConfig::default()
    };
    let t = ticket("Question", "Was there a payments outage last year?");
    assert!(escalation_override(&t, &config).is_none());
  }

  #[test]
  fn configured_phrases_are_normalized_before_matching() {
    let config = PriorityConfig {
      escalation_terms: vec!["Service  Outage".into()],
      impact_phrases: vec![" all\tcustomers ".into()],
      ..PriorityConfig::default()
    };
    let t = ticket("Help", "We have a service outage hitting all customers");
    let terms = escalation_override(&t, &config).unwrap();
    assert_eq!(terms, vec!["Service  Outage".to_string(), " all\tcustomers ".to_string()]);
  }

  #[test]
  fn override_survives_capability_failure() {
    let t = ticket("Down", "Checkout is not processing payments, site down");
    let err = CapabilityError::Timeout(20_000);
    let d = classify(&t, Err(&err), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P0);
    assert!(d.manual_review);
  }

  #[test]
  fn close_split_resolves_to_lower_severity() {
    let t = ticket("Sync delay", "Product sync is slower than usual");
    let j = judgment(&[(Priority::P1, 0.55), (Priority::P2, 0.45)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P2);
    assert!(d.rationale.ambiguous);
    assert!((d.confidence - 0.45).abs() < 1e-9);
  }

  #[test]
  fn clear_margin_keeps_model_choice() {
    let t = ticket("Sync broken", "Inventory sync fails for every product");
    let j = judgment(&[(Priority::P1, 0.8), (Priority::P2, 0.2)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P1);
    assert!(!d.rationale.ambiguous);
  }

  #[test]
  fn unordered_candidates_are_ranked() {
    let t = ticket("Report", "Export has a wrong column header");
    let j = judgment(&[(Priority::P3, 0.2), (Priority::P2, 0.7), (Priority::P1, 0.1)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P2);
  }

  #[test]
  fn failure_falls_back_to_p2_manual_review() {
    let t = ticket("Hello", "Can you check my account?");
    let err = CapabilityError::Unparsable("garbage".into());
    let d = classify(&t, Err(&err), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P2);
    assert_eq!(d.rationale.source, DecisionSource::Fallback);
    assert!(d.manual_review);
  }

  #[test]
  fn out_of_range_judgment_is_treated_as_failure() {
    let t = ticket("Hello", "Can you check my account?");
    let j = judgment(&[(Priority::P1, 3.0)]);
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.rationale.source, DecisionSource::Fallback);
  }

  #[test]
  fn single_suggestion_without_candidates() {
    let t = ticket("How to", "How do I rotate my API key?");
    let j = ClassificationJudgment {
      category: Category::Integrations,
      suggested: Priority::P3,
      candidates: vec![],
      sentiment: Sentiment::Neutral,
      confidence: 0.9,
    };
    let d = classify(&t, Ok(&j), &PriorityConfig::default());
    assert_eq!(d.priority, Priority::P3);
    assert!(!d.rationale.ambiguous);
  }
}
