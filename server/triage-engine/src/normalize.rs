//! Normalize inbound ticket records into canonical Ticket models.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::{SATISFACTION_MAX, SATISFACTION_MIN};
use crate::error::EngineError;
use crate::types::*;

/// Parse and validate an InboundTicket into a canonical Ticket.
pub fn normalize(raw: &InboundTicket) -> Result<Ticket, EngineError> {
  if raw.id.trim().is_empty() {
    return Err(EngineError::validation("id", "must not be empty"));
  }
  if raw.subject.trim().is_empty() {
    return Err(EngineError::validation("subject", "must not be empty"));
  }
  if raw.description.trim().is_empty() {
    return Err(EngineError::validation("description", "must not be empty"));
  }

  let timestamp = parse_timestamp(&raw.timestamp)?;

  if !raw.mrr.is_finite() || raw.mrr < 0.0 {
    return Err(EngineError::validation("mrr", "must be a non-negative number"));
  }

  if let Some(score) = raw.satisfaction {
    if !score.is_finite() || !(SATISFACTION_MIN..=SATISFACTION_MAX).contains(&score) {
      return Err(EngineError::validation(
        "satisfaction",
        &format!("expected {}..={}", SATISFACTION_MIN, SATISFACTION_MAX),
      ));
    }
  }

  // A bad calibration label must not reject an otherwise valid ticket.
  let actual_priority = raw
    .actual_priority
    .as_deref()
    .filter(|s| !s.trim().is_empty())
    .and_then(Priority::from_str_loose);

  Ok(Ticket {
    id: raw.id.trim().to_string(),
    customer_name: raw.customer_name.trim().to_string(),
    subject: raw.subject.trim().to_string(),
    description: raw.description.trim().to_string(),
    channel: raw.channel.trim().to_ascii_lowercase(),
    timestamp,
    mrr: raw.mrr,
    history: AccountHistory {
      repeat_issue: raw.repeat_issue,
      satisfaction: raw.satisfaction,
    },
    actual_priority,
    normalized_text: normalize_text(&format!("{} {}", raw.subject, raw.description)),
  })
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` (spreadsheet exports) taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EngineError> {
  let raw = raw.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Ok(ts.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| EngineError::validation("timestamp", &format!("invalid timestamp: {}", e)))
}

/// Lowercase, map curly apostrophes to ASCII, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
  s.to_lowercase()
    .replace(['\u{2019}', '\u{2018}'], "'")
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Byte ranges where `phrase` occurs in `haystack` on word boundaries.
/// Both inputs are expected to be normalized.
pub fn phrase_spans(haystack: &str, phrase: &str) -> Vec<(usize, usize)> {
  let phrase = phrase.trim();
  if phrase.is_empty() {
    return Vec::new();
  }
  let is_word = |c: char| c.is_alphanumeric();
  haystack
    .match_indices(phrase)
    .filter(|(start, _)| {
      let end = start + phrase.len();
      let before_ok = haystack[..*start].chars().next_back().map_or(true, |c| !is_word(c));
      let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
      before_ok && after_ok
    })
    .map(|(start, _)| (start, start + phrase.len()))
    .collect()
}

pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
  !phrase_spans(haystack, phrase).is_empty()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn make_inbound() -> InboundTicket {
    InboundTicket {
      id: "T-001".into(),
      customer_name: "Acme Outdoors".into(),
      subject: "Webhook setup".into(),
      description: "How do I set up webhooks?".into(),
      channel: "Email".into(),
      timestamp: "2025-01-15T10:30:00Z".into(),
      mrr: 1200.0,
      ..Default::default()
    }
  }

  #[test]
  fn valid_ticket_normalizes() {
    let t = normalize(&make_inbound()).unwrap();
    assert_eq!(t.id, "T-001");
    assert_eq!(t.channel, "email");
    assert_eq!(t.normalized_text, "webhook setup how do i set up webhooks?");
    assert_eq!(t.history, AccountHistory::default());
  }

  #[test]
  fn naive_timestamp_accepted() {
    let mut raw = make_inbound();
    raw.timestamp = "2025-01-15 10:30:00".into();
    assert!(normalize(&raw).is_ok());
  }

  #[test]
  fn bad_timestamp_rejected() {
    let mut raw = make_inbound();
    raw.timestamp = "yesterday".into();
    let err = normalize(&raw).unwrap_err();
    assert!(err.to_string().contains("timestamp"));
  }

  #[test]
  fn negative_mrr_rejected() {
    let mut raw = make_inbound();
    raw.mrr = -5.0;
    let err = normalize(&raw).unwrap_err();
    assert!(err.to_string().contains("mrr"));
  }

  #[test]
  fn empty_description_rejected() {
    let mut raw = make_inbound();
    raw.description = "   ".into();
    let err = normalize(&raw).unwrap_err();
    assert!(err.to_string().contains("description"));
  }

  #[test]
  fn satisfaction_out_of_scale_rejected() {
    let mut raw = make_inbound();
    raw.satisfaction = Some(9.0);
    assert!(normalize(&raw).is_err());
  }

  #[test]
  fn garbage_calibration_label_is_dropped() {
    let mut raw = make_inbound();
    raw.actual_priority = Some("urgent-ish".into());
    assert_eq!(normalize(&raw).unwrap().actual_priority, None);
    raw.actual_priority = Some("p1".into());
    assert_eq!(normalize(&raw).unwrap().actual_priority, Some(Priority::P1));
  }

  #[test]
  fn phrase_match_respects_word_boundaries() {
    assert!(contains_phrase("the system is down again", "is down"));
    assert!(!contains_phrase("download is slow", "down"));
    assert!(contains_phrase("down.", "down"));
    assert_eq!(phrase_spans("orders, orders", "orders").len(), 2);
  }
}
