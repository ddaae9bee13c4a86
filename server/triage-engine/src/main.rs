//! Binary entrypoint: read ticket JSON lines, write one JSON line per ticket.
//!
//! Output lines are, in input order, either a TriageOutcome or an ErrorOutput
//! for a rejected record, followed by a final `{"summary": ...}` line.
//! Logs go to stderr (RUST_LOG, default `info`).

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triage_engine::alerts::AlertGateway;
use triage_engine::batch::parse_records;
use triage_engine::http_client::HttpUnderstanding;
use triage_engine::rules::RuleBasedUnderstanding;
use triage_engine::{
  AlertDispatcher, AlertOutbox, BatchRunner, Config, Engine, KnowledgeBase, NoKnowledgeBase,
  Recipients, RunSummary, ServiceConfig, StaticKnowledgeBase, TextUnderstanding, WebhookGateway,
};

#[derive(Parser, Debug)]
#[command(name = "triage-engine", about = "Triage support tickets from JSON lines")]
struct Cli {
  /// Calibration and runtime config (TOML). Defaults apply when omitted.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Ticket JSON lines; stdin when omitted.
  #[arg(long)]
  input: Option<PathBuf>,

  /// FAQ articles (JSON array) for draft matching.
  #[arg(long)]
  faq: Option<PathBuf>,

  /// Compose alerts but do not deliver them.
  #[arg(long)]
  dry_run: bool,

  /// Use the deterministic rule-based adapter instead of the model endpoint.
  #[arg(long)]
  offline: bool,

  #[arg(long)]
  max_in_flight: Option<usize>,

  #[arg(long)]
  run_timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
  summary: &'a RunSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let mut config = match &cli.config {
    Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
    None => Config::default(),
  };
  if let Some(n) = cli.max_in_flight {
    config.runtime.max_in_flight = n;
  }
  if let Some(secs) = cli.run_timeout_secs {
    config.runtime.run_timeout_secs = Some(secs);
  }
  config.validate().context("invalid configuration")?;

  let services = ServiceConfig::from_env();
  let call_timeout = Duration::from_millis(config.runtime.call_timeout_ms);

  let understanding: Arc<dyn TextUnderstanding> = if cli.offline {
    Arc::new(RuleBasedUnderstanding::new())
  } else {
    Arc::new(HttpUnderstanding::new(&services, call_timeout).context("building model client")?)
  };

  let knowledge: Arc<dyn KnowledgeBase> = match &cli.faq {
    Some(path) => {
      let kb = StaticKnowledgeBase::load(path).with_context(|| format!("loading FAQ {}", path.display()))?;
      info!(articles = kb.len(), "knowledge base loaded");
      Arc::new(kb)
    }
    None => Arc::new(NoKnowledgeBase),
  };

  let gateway: Option<Arc<dyn AlertGateway>> = match &services.alert_webhook_url {
    Some(url) => {
      let webhook: Arc<dyn AlertGateway> =
        Arc::new(WebhookGateway::new(url.clone(), call_timeout).context("building alert gateway")?);
      Some(webhook)
    }
    None => {
      warn!("TRIAGE_ALERT_WEBHOOK_URL not set, alerts go to the outbox");
      None
    }
  };

  let retry = config.runtime.retry_policy();
  let dispatcher = AlertDispatcher::new(
    gateway,
    AlertOutbox::new(config.runtime.outbox_path.clone()),
    retry,
    Recipients {
      kam: services.kam_recipient.clone(),
      sales: services.sales_recipient.clone(),
    },
  )
  .dry_run(cli.dry_run);

  let engine = Engine::new(config.calibration.clone(), understanding, knowledge, retry);
  let runner = BatchRunner::new(Arc::new(engine), Arc::new(dispatcher), &config.runtime);

  let cancel = runner.cancel_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, finishing in-flight tickets");
      cancel.cancel();
    }
  });

  let raw = match &cli.input {
    Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
    None => {
      let mut buf = String::new();
      io::stdin().read_to_string(&mut buf).context("reading stdin")?;
      buf
    }
  };

  let report = runner.run(parse_records(&raw)).await;

  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  for entry in &report.entries {
    serde_json::to_writer(&mut out, entry)?;
    writeln!(out)?;
  }
  serde_json::to_writer(&mut out, &SummaryLine { summary: &report.summary })?;
  writeln!(out)?;
  out.flush()?;

  Ok(())
}
