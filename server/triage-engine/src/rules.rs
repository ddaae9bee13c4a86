//! Deterministic phrase-rule adapter for `TextUnderstanding`.
//!
//! Used with `--offline` and as a baseline when no model endpoint is
//! reachable. Priority candidates start from the configured calibration
//! targets and shift with wording cues, so an uninformative ticket lands in
//! the ambiguous P1/P2 band and resolves to P2.

use async_trait::async_trait;

use crate::config::CalibrationConfig;
use crate::error::CapabilityError;
use crate::normalize::{contains_phrase, normalize_text};
use crate::priority;
use crate::types::*;
use crate::understanding::TextUnderstanding;

const INTEGRATION_CUES: &[&str] = &[
  "webhook", "webhooks", "api", "api key", "shopify", "woocommerce", "integration", "sync",
  "connector", "plugin", "endpoint",
];
const DATA_CUES: &[&str] = &[
  "report", "reports", "dashboard", "export", "analytics", "metrics", "csv", "numbers",
];
const COMPLIANCE_CUES: &[&str] = &[
  "payment", "payments", "invoice", "refund", "gdpr", "tax", "billing", "chargeback",
  "compliance", "security",
];

const P1_CUES: &[&str] = &[
  "urgent", "asap", "blocking", "completely broken", "stopped working", "cannot login",
  "can't login", "third time", "3rd time", "competitor",
];
const P2_CUES: &[&str] = &[
  "slow", "delay", "delayed", "error", "not working", "issue", "failing", "wrong", "incorrect",
  "missing",
];
const P3_CUES: &[&str] = &[
  "how do i", "how to", "how can i", "question", "feature request", "documentation",
  "is it possible", "where can i", "wondering",
];

const AGGRESSIVE_CUES: &[&str] = &[
  "unacceptable", "ridiculous", "furious", "worst", "lawyer", "cancel our", "cancel my",
];
const FRUSTRATED_CUES: &[&str] = &[
  "frustrated", "frustrating", "disappointed", "again", "still not", "still broken",
  "annoying", "third time", "3rd time",
];
const POSITIVE_CUES: &[&str] = &["thanks", "thank you", "great", "love", "appreciate"];

const PRICING_CUES: &[&str] = &[
  "pricing", "price for", "cost to", "quote for", "how much", "what would it cost",
];
const UPGRADE_CUES: &[&str] = &[
  "upgrade", "enterprise plan", "premium", "higher plan", "higher tier", "custom plan",
];
const EXPANSION_CUES: &[&str] = &[
  "more stores", "more users", "more seats", "more locations", "additional users",
  "additional seats", "additional stores", "more licenses",
];
/// Wording that turns a price mention into a billing complaint.
const COMPLAINT_CUES: &[&str] = &[
  "invoice", "charged", "overcharged", "refund", "wrong", "incorrect", "billing error",
];

fn hits(text: &str, cues: &[&str]) -> usize {
  cues.iter().filter(|c| contains_phrase(text, c)).count()
}

fn first_hit<'a>(text: &str, cues: &[&'a str]) -> Option<&'a str> {
  cues.iter().copied().find(|c| contains_phrase(text, c))
}

fn round4(v: f64) -> f64 {
  (v * 10_000.0).round() / 10_000.0
}

/// Fixed-shape reply: greeting by name, the matched article's answer or a
/// next-steps line, signed by the owning team.
pub fn template_reply(ticket: &Ticket, team: Team, faq: Option<&FaqMatch>) -> String {
  let greeting = match ticket.customer_name.trim() {
    "" => "Hi there,".to_string(),
    name => format!("Hi {},", name),
  };
  let topic = format!("\"{}\"", ticket.subject);
  let body = match faq {
    Some(article) => format!("Thanks for reaching out about {}. {}", topic, article.answer.trim()),
    None => format!(
      "Thanks for reaching out about {}. Our {} is looking into it and will follow up with next steps shortly.",
      topic,
      team.display_name()
    ),
  };
  format!("{}\n\n{}\n\nBest regards,\n{}", greeting, body, team.display_name())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedUnderstanding;

impl RuleBasedUnderstanding {
  pub fn new() -> Self {
    Self
  }

  fn category(text: &str) -> Category {
    let scored = [
      (Category::Integrations, hits(text, INTEGRATION_CUES)),
      (Category::DataAnalytics, hits(text, DATA_CUES)),
      (Category::CompliancePayments, hits(text, COMPLIANCE_CUES)),
    ];
    // First category wins ties.
    let mut best = (Category::Other, 0);
    for (category, n) in scored {
      if n > best.1 {
        best = (category, n);
      }
    }
    best.0
  }

  fn sentiment(text: &str) -> Sentiment {
    if hits(text, AGGRESSIVE_CUES) > 0 {
      Sentiment::Aggressive
    } else if hits(text, FRUSTRATED_CUES) > 0 {
      Sentiment::Frustrated
    } else if hits(text, POSITIVE_CUES) > 0 {
      Sentiment::Positive
    } else {
      Sentiment::Neutral
    }
  }

  fn candidates(ticket: &Ticket, rubric: &CalibrationConfig) -> Vec<PriorityCandidate> {
    let text = &ticket.normalized_text;
    // P0 only moves when the escalation override would fire anyway.
    let p0_hits = priority::escalation_override(ticket, &rubric.priority).map_or(0, |_| 1);
    let counts = [p0_hits, hits(text, P1_CUES), hits(text, P2_CUES), hits(text, P3_CUES)];
    let raw: Vec<f64> = rubric
      .priority
      .targets
      .as_array()
      .iter()
      .zip(counts)
      .map(|(prior, n)| prior + n as f64)
      .collect();
    let total: f64 = raw.iter().sum();
    Priority::ALL
      .iter()
      .zip(raw)
      .map(|(&priority, r)| PriorityCandidate {
        priority,
        confidence: if total > 0.0 { round4(r / total) } else { 0.25 },
      })
      .collect()
  }

  fn sentence_containing(description: &str, cue: &str) -> String {
    description
      .split_inclusive(['.', '?', '!', '\n'])
      .find(|s| contains_phrase(&normalize_text(s), cue))
      .unwrap_or(description)
      .trim()
      .to_string()
  }
}

#[async_trait]
impl TextUnderstanding for RuleBasedUnderstanding {
  fn name(&self) -> &'static str {
    "rules"
  }

  async fn classify(
    &self,
    ticket: &Ticket,
    rubric: &CalibrationConfig,
  ) -> Result<ClassificationJudgment, CapabilityError> {
    let text = &ticket.normalized_text;
    let candidates = Self::candidates(ticket, rubric);
    let top = candidates
      .iter()
      .copied()
      .max_by(|a, b| a.confidence.total_cmp(&b.confidence).then_with(|| a.priority.cmp(&b.priority)))
      .ok_or_else(|| CapabilityError::Unparsable("no priority candidates".into()))?;
    Ok(ClassificationJudgment {
      category: Self::category(text),
      suggested: top.priority,
      candidates,
      sentiment: Self::sentiment(text),
      confidence: top.confidence,
    })
  }

  async fn detect_intent(&self, ticket: &Ticket) -> Result<IntentJudgment, CapabilityError> {
    let text = &ticket.normalized_text;
    let pricing = first_hit(text, PRICING_CUES);
    let upgrade = first_hit(text, UPGRADE_CUES);
    let expansion = first_hit(text, EXPANSION_CUES);

    // A price question about more capacity is still a pricing inquiry.
    let (intent, cue, mut confidence) = match (pricing, upgrade, expansion) {
      (Some(cue), _, Some(_)) => (IntentType::PricingInquiry, cue, 0.9),
      (Some(cue), _, None) => (IntentType::PricingInquiry, cue, 0.8),
      (None, Some(cue), _) => (IntentType::UpgradeInterest, cue, 0.8),
      (None, None, Some(cue)) => (IntentType::ExpansionNeed, cue, 0.75),
      (None, None, None) => {
        return Ok(IntentJudgment {
          intent: IntentType::None,
          confidence: 0.9,
          excerpt: String::new(),
          rationale: "no purchase wording".into(),
        })
      }
    };

    let mut rationale = format!("matched '{}'", cue);
    if let Some(complaint) = first_hit(text, COMPLAINT_CUES) {
      confidence -= 0.5;
      rationale.push_str(&format!("; complaint context '{}'", complaint));
    }

    Ok(IntentJudgment {
      intent,
      confidence: round4(confidence),
      excerpt: Self::sentence_containing(&ticket.description, cue),
      rationale,
    })
  }

  async fn draft_reply(
    &self,
    ticket: &Ticket,
    team: Team,
    faq: Option<&FaqMatch>,
  ) -> Result<String, CapabilityError> {
    Ok(template_reply(ticket, team, faq))
  }
}
