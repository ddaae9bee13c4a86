//! Support Triage Decision Engine.
//!
//! Classifies inbound support tickets (P0-P3), routes each to exactly one
//! team, scores churn risk (Guardian) and revenue intent (Opportunity)
//! independently, and gates the resulting actions: draft, route, KAM/Sales
//! alerts, and the one-click auto-send candidate flag.
//!
//! Text understanding, FAQ lookup and alert delivery are injected
//! capabilities; scoring and gating are pure computation over validated
//! inputs and the calibration config.

pub mod actions;
pub mod alerts;
pub mod batch;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod guardian;
pub mod http_client;
pub mod knowledge;
pub mod normalize;
pub mod opportunity;
pub mod priority;
pub mod retry;
pub mod router;
pub mod rules;
pub mod stats;
pub mod ticketing;
pub mod types;
pub mod understanding;

pub use alerts::{AlertDispatcher, AlertGateway, AlertOutbox, Recipients, WebhookGateway};
pub use batch::{BatchReport, BatchRunner};
pub use config::{CalibrationConfig, Config, RuntimeConfig, ServiceConfig};
pub use engine::Engine;
pub use error::{CapabilityError, EngineError};
pub use knowledge::{KnowledgeBase, NoKnowledgeBase, StaticKnowledgeBase};
pub use stats::RunSummary;
pub use types::{InboundTicket, Ticket, TriageOutcome};
pub use understanding::TextUnderstanding;
