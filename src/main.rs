//! trend-monitor: CLI entrypoint.
//! Loads configuration once, then runs one pipeline job, the feedback server,
//! or the bounded agent (the default).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use trend_monitor::agent::{
    trace, AgentController, Guardrails, LlmSelector, PlanSelector, ToolRegistry, ToolSelector,
};
use trend_monitor::collect::{Collector, HttpCollector};
use trend_monitor::config::{parse_recipients, AppConfig};
use trend_monitor::dedup::DedupEngine;
use trend_monitor::extract::{Extractor, OpenAiExtractor};
use trend_monitor::feedback::{server, FeedbackService};
use trend_monitor::jobs::{self, AlertRecord, DigestOptions};
use trend_monitor::llm::ChatClient;
use trend_monitor::metrics::Metrics;
use trend_monitor::notify::{DigestMailer, SmtpMailer};
use trend_monitor::store::{AppendLog, ItemStore, RelevanceStore};

#[derive(Debug, Parser)]
#[command(name = "trend-monitor", version, about = "Financial-services trend monitor")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "TREND_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, extract and store items from must-have sources.
    Collect,
    /// Build and send the ranked digest.
    Digest {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
        /// Comma-separated recipients; overrides `email.to`.
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Send one alert for new HIGH-impact items.
    Alert {
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the feedback endpoint (and /metrics).
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the bounded agent loop.
    Agent {
        #[arg(long)]
        goal: Option<String>,
        /// Use the deterministic plan even when a model is configured.
        #[arg(long)]
        offline: bool,
    },
}

fn recipients(cli_to: Option<&str>, cfg: &AppConfig) -> Vec<String> {
    cli_to
        .map(parse_recipients)
        .unwrap_or_else(|| cfg.email.to.clone())
}

fn mailer(cfg: &AppConfig) -> Option<SmtpMailer> {
    match SmtpMailer::from_config(&cfg.email) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "email delivery unavailable");
            None
        }
    }
}

async fn collect(cfg: &AppConfig) -> Result<bool> {
    let items = Arc::new(ItemStore::open(&cfg.storage.items_path)?);
    let dedup = DedupEngine::new(items);
    let collector = HttpCollector::new()?;
    let extractor = OpenAiExtractor::from_config(&cfg.extraction)?;
    let summary = jobs::run_collection(&collector, &extractor, &dedup, &cfg.sources).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(true)
}

async fn digest(
    cfg: &AppConfig,
    days: Option<u32>,
    dry_run: bool,
    to: Option<&str>,
    subject: Option<String>,
) -> Result<bool> {
    let items = ItemStore::open(&cfg.storage.items_path)?;
    let relevance = RelevanceStore::open(&cfg.storage.relevance_path)?;
    let opts = DigestOptions {
        lookback_days: days.unwrap_or(cfg.digest.lookback_days),
        dry_run,
        recipients: recipients(to, cfg),
        subject,
        ..DigestOptions::from_config(cfg)
    };
    let smtp = if dry_run { None } else { mailer(cfg) };
    let (summary, rendered) = jobs::run_digest(
        cfg,
        &items,
        &relevance,
        smtp.as_ref().map(|m| m as &dyn DigestMailer),
        &opts,
        chrono::Utc::now(),
    )
    .await?;
    if dry_run {
        println!("{}", rendered.text);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(true)
}

async fn alert(cfg: &AppConfig, hours: u32, to: Option<&str>, dry_run: bool) -> Result<bool> {
    let items = ItemStore::open(&cfg.storage.items_path)?;
    let alert_log = AppendLog::<AlertRecord>::open(&cfg.storage.alert_state_path)?;
    let smtp = if dry_run { None } else { mailer(cfg) };
    let summary = jobs::run_alert(
        cfg,
        &items,
        &alert_log,
        smtp.as_ref().map(|m| m as &dyn DigestMailer),
        hours,
        &recipients(to, cfg),
        dry_run,
        chrono::Utc::now(),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(true)
}

async fn serve(cfg: &AppConfig, bind: Option<String>) -> Result<bool> {
    let relevance = Arc::new(RelevanceStore::open(&cfg.storage.relevance_path)?);
    let service = Arc::new(FeedbackService::from_config(relevance, &cfg.feedback));
    let metrics = Metrics::init()?;
    let bind = bind.unwrap_or_else(|| cfg.feedback.bind.clone());
    server::serve(service, &bind, Some(&metrics)).await?;
    Ok(true)
}

async fn agent(cfg: &AppConfig, goal: Option<String>, offline: bool) -> Result<bool> {
    let items = Arc::new(ItemStore::open(&cfg.storage.items_path)?);
    let relevance = Arc::new(RelevanceStore::open(&cfg.storage.relevance_path)?);
    let collector: Arc<dyn Collector> = Arc::new(HttpCollector::new()?);
    let extractor: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::from_config(&cfg.extraction)?);
    let registry = ToolRegistry::new(collector, extractor, DedupEngine::new(items), relevance, cfg);

    let chat = ChatClient::from_config(&cfg.extraction)?;
    let selector: Arc<dyn ToolSelector> = if !offline && chat.is_configured() {
        tracing::info!(model = chat.model(), "using model-driven tool selection");
        Arc::new(LlmSelector::new(chat, &cfg.agent.allowed_sources))
    } else {
        tracing::info!("using deterministic plan");
        Arc::new(PlanSelector::from_config(cfg))
    };

    let controller = AgentController::new(selector, registry, Guardrails::from_config(&cfg.agent));
    let goal = goal.unwrap_or_else(|| cfg.agent.goal.clone());
    let run = controller.run(&goal).await;

    match trace::write_run_logs(&cfg.storage.logs_dir, &run) {
        Ok((t, s)) => tracing::info!(trace = %t.display(), summary = %s.display(), "run logs written"),
        Err(e) => tracing::warn!(error = %e, "could not write run logs"),
    }
    println!("{}", trace::render_summary(&run));
    Ok(run.succeeded())
}

async fn run(cli: Cli) -> Result<bool> {
    let cfg = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    match cli.command {
        Some(Command::Collect) => collect(&cfg).await,
        Some(Command::Digest {
            days,
            dry_run,
            to,
            subject,
        }) => digest(&cfg, days, dry_run, to.as_deref(), subject).await,
        Some(Command::Alert { hours, to, dry_run }) => {
            alert(&cfg, hours, to.as_deref(), dry_run).await
        }
        Some(Command::Serve { bind }) => serve(&cfg, bind).await,
        Some(Command::Agent { goal, offline }) => agent(&cfg, goal, offline).await,
        None => agent(&cfg, None, false).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; a missing file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    trend_monitor::init_tracing(cli.json_logs);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = ?e, "fatal");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
