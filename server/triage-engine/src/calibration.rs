//! Offline calibration: observed priority distribution vs configured targets,
//! plus accuracy against human labels where the input carried them.
//!
//! Targets are descriptive. Nothing here feeds back into per-ticket decisions.

use serde::{Deserialize, Serialize};

use crate::config::PriorityConfig;
use crate::types::{Priority, TriageOutcome};

/// The two fields calibration needs from an outcome line.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalibrationSample {
  #[serde(rename = "priority", deserialize_with = "decided_priority")]
  pub assigned: Priority,
  #[serde(default, rename = "actual_priority")]
  pub actual: Option<Priority>,
}

fn decided_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  struct Decided {
    priority: Priority,
  }
  Decided::deserialize(deserializer).map(|d| d.priority)
}

impl From<&TriageOutcome> for CalibrationSample {
  fn from(o: &TriageOutcome) -> Self {
    Self {
      assigned: o.priority.priority,
      actual: o.actual_priority,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
  pub priority: Priority,
  pub count: u64,
  pub target: f64,
  pub observed: f64,
  /// observed - target
  pub delta: f64,
  pub within_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
  pub total: u64,
  pub levels: Vec<LevelReport>,
  pub labelled: u64,
  /// Share of labelled tickets where assigned == actual.
  pub accuracy: Option<f64>,
  /// Assigned more severe than the label.
  pub over_escalated: u64,
  /// Assigned less severe than the label.
  pub under_escalated: u64,
}

impl CalibrationReport {
  pub fn within_tolerance(&self) -> bool {
    self.levels.iter().all(|l| l.within_tolerance)
  }
}

fn round4(v: f64) -> f64 {
  (v * 10_000.0).round() / 10_000.0
}

pub fn compare(samples: &[CalibrationSample], config: &PriorityConfig) -> CalibrationReport {
  let mut counts = [0u64; 4];
  let mut labelled = 0u64;
  let mut correct = 0u64;
  let mut over = 0u64;
  let mut under = 0u64;

  for s in samples {
    counts[s.assigned.index()] += 1;
    if let Some(actual) = s.actual {
      labelled += 1;
      match s.assigned.cmp(&actual) {
        std::cmp::Ordering::Equal => correct += 1,
        std::cmp::Ordering::Less => over += 1,
        std::cmp::Ordering::Greater => under += 1,
      }
    }
  }

  let total = samples.len() as u64;
  let targets = config.targets.as_array();
  let levels = Priority::ALL
    .iter()
    .map(|&p| {
      let count = counts[p.index()];
      let observed = if total == 0 { 0.0 } else { count as f64 / total as f64 };
      let delta = observed - targets[p.index()];
      LevelReport {
        priority: p,
        count,
        target: targets[p.index()],
        observed: round4(observed),
        delta: round4(delta),
        within_tolerance: delta.abs() <= config.calibration_tolerance,
      }
    })
    .collect();

  CalibrationReport {
    total,
    levels,
    labelled,
    accuracy: (labelled > 0).then(|| round4(correct as f64 / labelled as f64)),
    over_escalated: over,
    under_escalated: under,
  }
}
