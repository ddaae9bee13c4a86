//! FAQ lookup for the draft-generation collaborator.
//!
//! `StaticKnowledgeBase` scores articles by keyword coverage against the
//! normalized ticket text. Confidence is the share of an article's keywords
//! present; complexity is a rough estimate from length and question count.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::error::{CapabilityError, EngineError};
use crate::normalize::contains_phrase;
use crate::types::{Category, FaqMatch};

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
  /// Best article for the ticket text, or `None` when nothing matches.
  async fn lookup(&self, category: Category, text: &str) -> Result<Option<FaqMatch>, CapabilityError>;
}

/// Used when no knowledge base is configured: never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKnowledgeBase;

#[async_trait]
impl KnowledgeBase for NoKnowledgeBase {
  async fn lookup(&self, _category: Category, _text: &str) -> Result<Option<FaqMatch>, CapabilityError> {
    Ok(None)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaqArticle {
  pub id: String,
  /// Restrict the article to one category; `None` matches any.
  #[serde(default)]
  pub category: Option<Category>,
  pub answer: String,
  pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticKnowledgeBase {
  articles: Vec<FaqArticle>,
}

impl StaticKnowledgeBase {
  pub fn new(articles: Vec<FaqArticle>) -> Self {
    let articles = articles
      .into_iter()
      .filter(|a| a.keywords.iter().any(|k| !k.trim().is_empty()))
      .map(|mut a| {
        a.keywords = a
          .keywords
          .iter()
          .map(|k| k.trim().to_lowercase())
          .filter(|k| !k.is_empty())
          .collect();
        a
      })
      .collect();
    Self { articles }
  }

  /// Load a JSON array of articles.
  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    let articles: Vec<FaqArticle> = serde_json::from_str(&raw)?;
    Ok(Self::new(articles))
  }

  pub fn len(&self) -> usize {
    self.articles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.articles.is_empty()
  }

  fn best(&self, category: Category, text: &str) -> Option<FaqMatch> {
    let mut best: Option<(&FaqArticle, f64)> = None;
    for article in &self.articles {
      if article.category.is_some_and(|c| c != category) {
        continue;
      }
      let matched = article.keywords.iter().filter(|k| contains_phrase(text, k)).count();
      if matched == 0 {
        continue;
      }
      let coverage = matched as f64 / article.keywords.len() as f64;
      // Earlier articles win ties.
      if best.map_or(true, |(_, c)| coverage > c) {
        best = Some((article, coverage));
      }
    }
    best.map(|(article, coverage)| FaqMatch {
      article_id: article.id.clone(),
      answer: article.answer.clone(),
      confidence: (coverage * 10_000.0).round() / 10_000.0,
      complexity: Some(estimate_complexity(text)),
    })
  }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
  async fn lookup(&self, category: Category, text: &str) -> Result<Option<FaqMatch>, CapabilityError> {
    Ok(self.best(category, text))
  }
}

/// 0..=1; grows with word count and with every question past the first.
pub fn estimate_complexity(text: &str) -> f64 {
  let words = text.split_whitespace().count() as f64;
  let questions = text.matches('?').count().saturating_sub(1) as f64;
  let raw = words / 150.0 + 0.15 * questions;
  (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn article(id: &str, category: Option<Category>, keywords: &[&str]) -> FaqArticle {
    FaqArticle {
      id: id.into(),
      category,
      answer: format!("answer {}", id),
      keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
  }

  #[tokio::test]
  async fn full_coverage_wins() {
    let kb = StaticKnowledgeBase::new(vec![
      article("kb-1", Some(Category::Integrations), &["webhook", "retry"]),
      article("kb-2", Some(Category::Integrations), &["set up", "webhooks"]),
    ]);
    let m = kb
      .lookup(Category::Integrations, "how do i set up webhooks?")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(m.article_id, "kb-2");
    assert_eq!(m.confidence, 1.0);
    assert!(m.complexity.unwrap() < 0.3);
  }

  #[tokio::test]
  async fn category_mismatch_is_skipped() {
    let kb = StaticKnowledgeBase::new(vec![article("kb-1", Some(Category::DataAnalytics), &["export"])]);
    assert!(kb.lookup(Category::Integrations, "export").await.unwrap().is_none());
    assert!(kb.lookup(Category::DataAnalytics, "export").await.unwrap().is_some());
  }

  #[test]
  fn articles_without_keywords_are_dropped() {
    let kb = StaticKnowledgeBase::new(vec![article("kb-1", None, &["  "]), article("kb-2", None, &["x"])]);
    assert_eq!(kb.len(), 1);
  }

  #[test]
  fn load_reads_json_array() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"[{{"id": "kb-9", "category": "data_analytics", "answer": "Use the export tab.", "keywords": ["CSV export"]}}]"#
    )
    .unwrap();
    let kb = StaticKnowledgeBase::load(file.path()).unwrap();
    assert_eq!(kb.len(), 1);
    assert_eq!(kb.best(Category::DataAnalytics, "where is the csv export").unwrap().article_id, "kb-9");
  }

  #[test]
  fn long_multi_question_text_is_complex() {
    let text = "why? ".repeat(10) + &"word ".repeat(100);
    assert!(estimate_complexity(&text) >= 0.3);
    assert!(estimate_complexity("how do i reset my password?") < 0.1);
  }
}
