//! `TextUnderstanding` backed by an OpenAI-compatible chat-completions
//! endpoint. The model is asked for a JSON object; everything it returns is
//! parsed leniently and then range-checked before the engine sees it.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::config::{CalibrationConfig, ServiceConfig};
use crate::error::CapabilityError;
use crate::types::*;
use crate::understanding::TextUnderstanding;

pub struct HttpUnderstanding {
  client: reqwest::Client,
  endpoint: String,
  model: String,
  api_key: Option<String>,
  timeout: Duration,
}

impl HttpUnderstanding {
  pub fn new(services: &ServiceConfig, timeout: Duration) -> Result<Self, CapabilityError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CapabilityError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      endpoint: format!("{}/chat/completions", services.llm_url.trim_end_matches('/')),
      model: services.llm_model.clone(),
      api_key: services.llm_api_key.clone(),
      timeout,
    })
  }

  async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, CapabilityError> {
    let body = serde_json::json!({
      "model": self.model,
      "messages": [
        {"role": "system", "content": system_prompt},
        {"role": "user", "content": user_prompt}
      ],
      "max_tokens": 512,
      "temperature": 0.0
    });

    let mut request = self.client.post(&self.endpoint).json(&body);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| self.map_transport(e))?;
    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(CapabilityError::Status(status.as_u16(), snippet(&text)));
    }

    let text = response.text().await.map_err(|e| self.map_transport(e))?;
    let json: serde_json::Value = serde_json::from_str(&text)
      .map_err(|e| CapabilityError::Unparsable(format!("response body: {}", e)))?;
    json["choices"][0]["message"]["content"]
      .as_str()
      .map(str::to_string)
      .ok_or_else(|| CapabilityError::Unparsable("response has no message content".into()))
  }

  fn map_transport(&self, e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
      CapabilityError::Timeout(self.timeout.as_millis() as u64)
    } else {
      CapabilityError::Transport(e.to_string())
    }
  }
}

#[async_trait]
impl TextUnderstanding for HttpUnderstanding {
  fn name(&self) -> &'static str {
    "http"
  }

  async fn classify(
    &self,
    ticket: &Ticket,
    rubric: &CalibrationConfig,
  ) -> Result<ClassificationJudgment, CapabilityError> {
    let raw = self
      .complete(&classification_prompt(rubric), &ticket_prompt(ticket))
      .await?;
    debug!(ticket_id = %ticket.id, bytes = raw.len(), "classification response");
    parse_classification(&raw)
  }

  async fn detect_intent(&self, ticket: &Ticket) -> Result<IntentJudgment, CapabilityError> {
    let raw = self.complete(INTENT_PROMPT, &ticket_prompt(ticket)).await?;
    debug!(ticket_id = %ticket.id, bytes = raw.len(), "intent response");
    parse_intent(&raw)
  }

  async fn draft_reply(
    &self,
    ticket: &Ticket,
    team: Team,
    faq: Option<&FaqMatch>,
  ) -> Result<String, CapabilityError> {
    let raw = self.complete(DRAFT_PROMPT, &draft_prompt(ticket, team, faq)).await?;
    debug!(ticket_id = %ticket.id, bytes = raw.len(), "draft response");
    let reply = raw.trim();
    if reply.is_empty() {
      return Err(CapabilityError::Unparsable("empty draft".into()));
    }
    Ok(reply.to_string())
  }
}

fn snippet(s: &str) -> String {
  s.chars().take(200).collect()
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn classification_prompt(rubric: &CalibrationConfig) -> String {
  let t = rubric.priority.targets;
  let mut prompt = String::from(
    "You are a support ticket classifier for an e-commerce analytics platform.\n\n\
     Priority levels and their expected share of all tickets:\n",
  );
  prompt.push_str(&format!(
    "- P0 (~{:.0}%): critical outage, data loss or security breach affecting operations\n",
    t.p0 * 100.0
  ));
  prompt.push_str(&format!(
    "- P1 (~{:.0}%): urgent, core workflow blocked or repeated failure\n",
    t.p1 * 100.0
  ));
  prompt.push_str(&format!(
    "- P2 (~{:.0}%): important, degraded but workable\n",
    t.p2 * 100.0
  ));
  prompt.push_str(&format!(
    "- P3 (~{:.0}%): questions, how-to and feature requests\n",
    t.p3 * 100.0
  ));
  prompt.push_str(
    "P0 is rare. Distinguish real urgency from emotional language. \
     When uncertain between two levels, choose the LOWER severity.\n\nCategories:\n",
  );
  for def in &rubric.categories {
    prompt.push_str(&format!("- {}: {}\n", def.category.as_str(), def.description));
  }
  prompt.push_str(
    "\nSentiment is one of: positive, neutral, frustrated, aggressive.\n\n\
     Respond with JSON only:\n\
     {\"category\": \"...\", \"priority\": \"P0|P1|P2|P3\", \
     \"priority_scores\": {\"P0\": 0.0, \"P1\": 0.0, \"P2\": 0.0, \"P3\": 0.0}, \
     \"sentiment\": \"...\", \"confidence\": 0.0}\n\
     Scores and confidence are in [0,1].",
  );
  prompt
}

const INTENT_PROMPT: &str = "You detect commercial intent in support tickets. \
Judge from context, not keywords: a complaint about an invoice amount is NOT a \
pricing inquiry.\n\n\
Intent types: pricing_inquiry (asks what something costs), upgrade_interest \
(wants a higher plan or premium features), expansion_need (more stores, users \
or capacity), none.\n\n\
Respond with JSON only:\n\
{\"intent_type\": \"...\", \"confidence\": 0.0, \
\"excerpt\": \"verbatim sentence that shows the intent\", \"rationale\": \"...\"}\n\
Confidence is in [0,1].";

const DRAFT_PROMPT: &str = "You write support replies for an e-commerce analytics \
platform. An agent reviews every reply before it is sent.\n\n\
Address the customer by name and acknowledge the issue. If a knowledge base \
answer is given, base the reply on it and do not invent steps beyond it; \
otherwise explain the next steps. Professional, friendly B2B tone, under \
250 words. Sign off with the owning team's name. Reply with the email text only.";

pub fn draft_prompt(ticket: &Ticket, team: Team, faq: Option<&FaqMatch>) -> String {
  let customer = if ticket.customer_name.is_empty() {
    "unknown"
  } else {
    &ticket.customer_name
  };
  let knowledge = match faq {
    Some(article) => format!("Knowledge base answer ({}):\n{}", article.article_id, article.answer),
    None => "No knowledge base article matched.".to_string(),
  };
  format!(
    "{}\n\nCustomer: {}\nOwning team: {}\n\n{}",
    ticket_prompt(ticket),
    customer,
    team.display_name(),
    knowledge
  )
}

fn ticket_prompt(ticket: &Ticket) -> String {
  format!(
    "Channel: {}\nSubject: {}\n\n{}",
    if ticket.channel.is_empty() { "unknown" } else { &ticket.channel },
    ticket.subject,
    ticket.description
  )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Fenced ```json block if present, otherwise the outermost braces.
pub fn extract_json_block(text: &str) -> Option<&str> {
  if let Some(start) = text.find("```json") {
    let json_start = start + 7;
    if let Some(end) = text[json_start..].find("```") {
      return Some(text[json_start..json_start + end].trim());
    }
  }
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end > start {
    Some(&text[start..=end])
  } else {
    None
  }
}

/// Score scale of one response. Models sometimes answer on a 0-10 scale
/// despite the prompt; the scale is decided once for every number in the
/// response so relative order survives rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
  Unit,
  Ten,
}

impl Scale {
  /// Ten-point when any value exceeds 1 or every value is a whole-number
  /// literal.
  fn detect(values: &[&serde_json::Number]) -> Self {
    if values.is_empty() {
      return Scale::Unit;
    }
    let above_one = values.iter().any(|n| n.as_f64().is_some_and(|v| v > 1.0));
    let whole = values.iter().all(|n| !n.is_f64());
    if above_one || whole {
      Scale::Ten
    } else {
      Scale::Unit
    }
  }

  fn read(self, n: &serde_json::Number) -> Result<f64, CapabilityError> {
    let v = n
      .as_f64()
      .ok_or_else(|| CapabilityError::Unparsable(format!("score {} is not a number", n)))?;
    Ok(match self {
      Scale::Unit => v,
      Scale::Ten => v / 10.0,
    })
  }
}

#[derive(Deserialize)]
struct RawClassification {
  category: String,
  #[serde(default)]
  priority: Option<String>,
  #[serde(default, alias = "scores", alias = "candidates")]
  priority_scores: BTreeMap<String, serde_json::Number>,
  sentiment: String,
  #[serde(default)]
  confidence: Option<serde_json::Number>,
}

pub fn parse_classification(raw: &str) -> Result<ClassificationJudgment, CapabilityError> {
  let block = extract_json_block(raw)
    .ok_or_else(|| CapabilityError::Unparsable("no JSON object in response".into()))?;
  let parsed: RawClassification =
    serde_json::from_str(block).map_err(|e| CapabilityError::Unparsable(e.to_string()))?;

  let scale = Scale::detect(
    &parsed
      .priority_scores
      .values()
      .chain(parsed.confidence.as_ref())
      .collect::<Vec<_>>(),
  );

  let mut candidates = Vec::new();
  for (label, score) in &parsed.priority_scores {
    let priority = Priority::from_str_loose(label)
      .ok_or_else(|| CapabilityError::Unparsable(format!("unknown priority '{}'", label)))?;
    candidates.push(PriorityCandidate {
      priority,
      confidence: scale.read(score)?,
    });
  }
  candidates.sort_by_key(|c| c.priority);

  let suggested = match parsed.priority.as_deref().and_then(Priority::from_str_loose) {
    Some(p) => p,
    None => candidates
      .iter()
      .max_by(|a, b| a.confidence.total_cmp(&b.confidence).then_with(|| a.priority.cmp(&b.priority)))
      .map(|c| c.priority)
      .ok_or_else(|| CapabilityError::Unparsable("no priority in response".into()))?,
  };

  let sentiment = Sentiment::from_str_loose(&parsed.sentiment)
    .ok_or_else(|| CapabilityError::Unparsable(format!("unknown sentiment '{}'", parsed.sentiment)))?;

  let confidence = match &parsed.confidence {
    Some(c) => scale.read(c)?,
    None => candidates
      .iter()
      .find(|c| c.priority == suggested)
      .map(|c| c.confidence)
      .unwrap_or(0.0),
  };

  let judgment = ClassificationJudgment {
    category: Category::from_label(&parsed.category),
    suggested,
    candidates,
    sentiment,
    confidence,
  };
  judgment.validate()?;
  Ok(judgment)
}

#[derive(Deserialize)]
struct RawIntent {
  #[serde(default, alias = "intent")]
  intent_type: Option<String>,
  #[serde(default)]
  has_business_intent: Option<bool>,
  confidence: serde_json::Number,
  #[serde(default, alias = "evidence", alias = "key_phrases")]
  excerpt: Option<serde_json::Value>,
  #[serde(default, alias = "reasoning")]
  rationale: Option<String>,
}

pub fn parse_intent(raw: &str) -> Result<IntentJudgment, CapabilityError> {
  let block = extract_json_block(raw)
    .ok_or_else(|| CapabilityError::Unparsable("no JSON object in response".into()))?;
  let parsed: RawIntent =
    serde_json::from_str(block).map_err(|e| CapabilityError::Unparsable(e.to_string()))?;

  let label = parsed.intent_type.unwrap_or_default();
  let mut intent = IntentType::from_str_loose(&label)
    .ok_or_else(|| CapabilityError::Unparsable(format!("unknown intent '{}'", label)))?;
  if parsed.has_business_intent == Some(false) {
    intent = IntentType::None;
  }

  // Excerpt may come back as a string or a list of phrases.
  let excerpt = match parsed.excerpt {
    Some(serde_json::Value::String(s)) => s,
    Some(serde_json::Value::Array(items)) => items
      .iter()
      .filter_map(|v| v.as_str())
      .collect::<Vec<_>>()
      .join("; "),
    _ => String::new(),
  };

  let confidence = Scale::detect(&[&parsed.confidence]).read(&parsed.confidence)?;
  if !unit_interval(confidence) {
    return Err(CapabilityError::Unparsable(format!(
      "intent confidence {} outside [0,1]",
      parsed.confidence
    )));
  }

  Ok(IntentJudgment {
    intent,
    confidence,
    excerpt,
    rationale: parsed.rationale.unwrap_or_default(),
  })
}
