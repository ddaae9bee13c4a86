//! Confidence-gated action selection.
//!
//! Each axis is evaluated independently and several may fire for one ticket.
//! `mark_auto_send_candidate` is the only safety-critical gate: it flags a
//! draft for one-click human approval and never authorizes an unattended send.

use crate::config::AutoSendConfig;
use crate::types::*;

/// Everything the selector looks at. Optional inputs that are missing never
/// grant a benefit of the doubt.
#[derive(Debug, Clone, Copy)]
pub struct SelectorInput<'a> {
  pub ticket_id: &'a str,
  pub priority: &'a PriorityDecision,
  pub assignment: &'a TeamAssignment,
  pub risk: &'a RiskAssessment,
  pub opportunity: &'a OpportunitySignal,
  pub sentiment: Option<Sentiment>,
  pub faq_confidence: Option<f64>,
  pub complexity: Option<f64>,
  pub satisfaction: Option<f64>,
}

/// True only when all five gates hold (all comparisons strict).
pub fn auto_send_eligible(input: &SelectorInput<'_>, config: &AutoSendConfig) -> bool {
  let is_p3 = input.priority.priority == Priority::P3;
  let faq_ok = input
    .faq_confidence
    .is_some_and(|c| c.is_finite() && c > config.min_faq_confidence);
  let calm = input.sentiment.is_some_and(Sentiment::is_calm);
  let simple = input
    .complexity
    .is_some_and(|c| c.is_finite() && c < config.max_complexity);
  let satisfied = input
    .satisfaction
    .is_some_and(|s| s.is_finite() && s > config.min_satisfaction);
  is_p3 && faq_ok && calm && simple && satisfied
}

pub fn select(input: &SelectorInput<'_>, config: &AutoSendConfig) -> ActionDecision {
  let mut actions = Vec::new();

  if input.priority.priority.is_urgent() {
    actions.push(Action::RouteToTeam {
      team: input.assignment.team,
    });
  } else {
    actions.push(Action::GenerateDraft);
  }

  if input.risk.risk_level.is_alert() {
    actions.push(Action::AlertKam {
      risk: input.risk.clone(),
    });
  }

  if input.opportunity.is_opportunity() {
    actions.push(Action::AlertSales {
      signal: input.opportunity.clone(),
    });
  }

  let auto_send = auto_send_eligible(input, config);
  if auto_send {
    actions.push(Action::MarkAutoSendCandidate);
  }

  let draft_review = if input.priority.priority.is_urgent() {
    None
  } else if auto_send {
    Some(DraftReview::OneClickApproval)
  } else {
    Some(DraftReview::InternalNote)
  };

  ActionDecision {
    ticket_id: input.ticket_id.to_string(),
    actions,
    draft_review,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn decision(priority: Priority) -> PriorityDecision {
    PriorityDecision {
      priority,
      rationale: Rationale {
        source: DecisionSource::Model,
        ambiguous: false,
        matched_terms: Vec::new(),
      },
      confidence: 0.9,
      manual_review: false,
    }
  }

  fn risk(level: RiskLevel) -> RiskAssessment {
    RiskAssessment {
      risk_level: level,
      score: 0.0,
      signals: RiskSignals {
        sentiment: 0.0,
        history: 0.0,
        mrr: 0.0,
      },
      sensitivity: 1.0,
      evidence: Vec::new(),
    }
  }

  fn assignment() -> TeamAssignment {
    TeamAssignment {
      team: Team::IntegrationsApi,
      category: Category::Integrations,
      defaulted: false,
    }
  }

  struct Fixture {
    priority: PriorityDecision,
    assignment: TeamAssignment,
    risk: RiskAssessment,
    opportunity: OpportunitySignal,
  }

  impl Fixture {
    fn new(priority: Priority) -> Self {
      Self {
        priority: decision(priority),
        assignment: assignment(),
        risk: risk(RiskLevel::None),
        opportunity: OpportunitySignal::none(""),
      }
    }

    /// Input where every auto-send gate passes.
    fn input(&self) -> SelectorInput<'_> {
      SelectorInput {
        ticket_id: "T-1",
        priority: &self.priority,
        assignment: &self.assignment,
        risk: &self.risk,
        opportunity: &self.opportunity,
        sentiment: Some(Sentiment::Neutral),
        faq_confidence: Some(0.97),
        complexity: Some(0.1),
        satisfaction: Some(4.5),
      }
    }
  }

  #[test]
  fn urgent_routes_and_low_drafts() {
    let config = AutoSendConfig::default();
    for p in [Priority::P0, Priority::P1] {
      let f = Fixture::new(p);
      let d = select(&f.input(), &config);
      assert_eq!(d.routed_team(), Some(Team::IntegrationsApi));
      assert!(!d.generates_draft());
      assert_eq!(d.draft_review, None);
    }
    for p in [Priority::P2, Priority::P3] {
      let f = Fixture::new(p);
      let d = select(&f.input(), &config);
      assert!(d.generates_draft());
      assert_eq!(d.routed_team(), None);
    }
  }

  #[test]
  fn all_gates_grant_auto_send() {
    let f = Fixture::new(Priority::P3);
    let d = select(&f.input(), &AutoSendConfig::default());
    assert!(d.generates_draft());
    assert!(d.is_auto_send_candidate());
    assert_eq!(d.draft_review, Some(DraftReview::OneClickApproval));
  }

  #[test]
  fn each_gate_alone_blocks_auto_send() {
    let config = AutoSendConfig::default();
    let f = Fixture::new(Priority::P3);
    let p2 = Fixture::new(Priority::P2);

    let mut variants: Vec<SelectorInput<'_>> = Vec::new();
    variants.push(p2.input());
    variants.push(SelectorInput { faq_confidence: Some(0.95), ..f.input() });
    variants.push(SelectorInput { faq_confidence: None, ..f.input() });
    variants.push(SelectorInput { sentiment: Some(Sentiment::Frustrated), ..f.input() });
    variants.push(SelectorInput { sentiment: None, ..f.input() });
    variants.push(SelectorInput { complexity: Some(0.3), ..f.input() });
    variants.push(SelectorInput { complexity: None, ..f.input() });
    variants.push(SelectorInput { satisfaction: Some(4.0), ..f.input() });
    variants.push(SelectorInput { satisfaction: None, ..f.input() });

    for (i, input) in variants.iter().enumerate() {
      let d = select(input, &config);
      assert!(!d.is_auto_send_candidate(), "variant {} should not be eligible", i);
      assert_eq!(d.draft_review, Some(DraftReview::InternalNote), "variant {}", i);
    }
  }

  #[test]
  fn positive_sentiment_passes_gate() {
    let f = Fixture::new(Priority::P3);
    let input = SelectorInput {
      sentiment: Some(Sentiment::Positive),
      ..f.input()
    };
    assert!(auto_send_eligible(&input, &AutoSendConfig::default()));
  }

  #[test]
  fn nan_scores_never_pass() {
    let f = Fixture::new(Priority::P3);
    let input = SelectorInput {
      faq_confidence: Some(f64::NAN),
      ..f.input()
    };
    assert!(!auto_send_eligible(&input, &AutoSendConfig::default()));
  }

  #[test]
  fn guardian_and_opportunity_fire_independently() {
    let config = AutoSendConfig::default();

    let mut f = Fixture::new(Priority::P1);
    f.risk = risk(RiskLevel::Critical);
    let d = select(&f.input(), &config);
    assert!(d.alerts_kam());
    assert!(!d.alerts_sales());

    let mut f = Fixture::new(Priority::P2);
    f.opportunity = OpportunitySignal {
      intent_type: IntentType::ExpansionNeed,
      confidence: 0.9,
      excerpt: "10 more seats".into(),
      rationale: String::new(),
    };
    let d = select(&f.input(), &config);
    assert!(d.alerts_sales());
    assert!(!d.alerts_kam());

    f.risk = risk(RiskLevel::Elevated);
    let d = select(&f.input(), &config);
    assert!(d.alerts_sales() && d.alerts_kam());
  }

  #[test]
  fn action_order_is_stable() {
    let mut f = Fixture::new(Priority::P3);
    f.risk = risk(RiskLevel::Elevated);
    f.opportunity = OpportunitySignal {
      intent_type: IntentType::PricingInquiry,
      confidence: 0.9,
      excerpt: "pricing".into(),
      rationale: String::new(),
    };
    let d = select(&f.input(), &AutoSendConfig::default());
    let kinds: Vec<&str> = d
      .actions
      .iter()
      .map(|a| match a {
        Action::GenerateDraft => "draft",
        Action::RouteToTeam { .. } => "route",
        Action::AlertKam { .. } => "kam",
        Action::AlertSales { .. } => "sales",
        Action::MarkAutoSendCandidate => "auto_send",
      })
      .collect();
    assert_eq!(kinds, vec!["draft", "kam", "sales", "auto_send"]);
  }
}
