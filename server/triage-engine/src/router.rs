//! Team routing: a static, total mapping from category to team.

use crate::types::{Category, Team, TeamAssignment};

/// Team for every category; `Other` is the default bucket.
const ROUTING_TABLE: [(Category, Team); 3] = [
  (Category::Integrations, Team::IntegrationsApi),
  (Category::DataAnalytics, Team::DataAnalytics),
  (Category::CompliancePayments, Team::ComplianceOperations),
];

pub const DEFAULT_TEAM: Team = Team::GeneralTriage;

pub fn route(category: Category) -> TeamAssignment {
  match ROUTING_TABLE.iter().find(|(c, _)| *c == category) {
    Some(&(_, team)) => TeamAssignment {
      team,
      category,
      defaulted: false,
    },
    None => TeamAssignment {
      team: DEFAULT_TEAM,
      category,
      defaulted: true,
    },
  }
}
