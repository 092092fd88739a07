#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use rulegate_lib::config::Config;
use rulegate_lib::telemetry::{init_tracing, Metrics};
use rulegate_lib::{
    load_from_path, parse_address, spawn_sweeper, HitTable, RequestInfo, RuleEvaluator,
    RuleFactory, RuleSet,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

const INVALID_ADDRESS: &str = "invalid-address";
const INVALID_REQUEST: &str = "invalid-request";
const EVALUATION_ERROR: &str = "evaluation-error";

#[derive(Parser, Debug)]
#[command(author, version, about = "Rule based request classification for rate limiting")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", env = "RULEGATE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every configured rule and print it back
    Check,
    /// Classify JSON request snapshots, one per line, printing one action per line
    Eval {
        /// Read requests from FILE instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
        /// Print Prometheus metrics after the last request
        #[arg(long)]
        metrics: bool,
    },
}

/// One input line of `eval`
#[derive(Debug, Deserialize)]
struct RequestLine {
    address: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_tracing("info", false);
            error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_tracing(&cfg.logging.level, cfg.logging.show_target) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }
    info!(rules = cfg.rules.len(), access_lists = cfg.access_lists.len(), "configuration loaded");

    let result = match cli.command {
        Command::Check => check(&cfg).await,
        Command::Eval { input, metrics } => eval(cfg, input, metrics).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "rulegate failed");
            ExitCode::FAILURE
        }
    }
}

fn compile(cfg: &Config, metrics: Option<Arc<Metrics>>) -> rulegate_lib::Result<RuleSet> {
    let factory = RuleFactory::new(
        cfg.parser_pool.capacity,
        cfg.parser_pool.acquire_timeout(),
        metrics,
    );
    RuleSet::compile(&cfg.rules, &factory, &cfg.access_lists)
}

async fn check(cfg: &Config) -> rulegate_lib::Result<()> {
    let rules = compile(cfg, None)?;
    let mut out = tokio::io::stdout();
    for rule in rules.rules() {
        out.write_all(format!("{}: {rule}\n", rule.id()).as_bytes()).await?;
    }
    out.write_all(format!("default => {}\n", cfg.default_action).as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn eval(cfg: Config, input: Option<PathBuf>, with_metrics: bool) -> rulegate_lib::Result<()> {
    let metrics = if with_metrics { Some(Arc::new(Metrics::new()?)) } else { None };
    let rules = compile(&cfg, metrics.clone())?;

    let table = Arc::new(HitTable::new());
    let sweeper = cfg.hit_table.sweep_interval().map(|interval| {
        spawn_sweeper(Arc::clone(&table), interval, cfg.hit_table.idle_timeout(), metrics.clone())
    });

    let mut evaluator = RuleEvaluator::new(Arc::clone(&table), cfg.default_action)
        .with_access_lists(Arc::new(cfg.access_lists));
    if let Some(metrics) = &metrics {
        evaluator = evaluator.with_metrics(Arc::clone(metrics));
    }

    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();
    let mut out = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let action = classify(&evaluator, rules.rules(), &line);
        out.write_all(action.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }

    if let Some(metrics) = &metrics {
        out.write_all(metrics.encode()?.as_bytes()).await?;
    }
    out.flush().await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}

fn classify(evaluator: &RuleEvaluator, rules: &[rulegate_lib::Rule], line: &str) -> String {
    let request: RequestLine = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, "malformed request line");
            return INVALID_REQUEST.to_string();
        }
    };
    let Some(address) = parse_address(&request.address) else {
        warn!(address = %request.address, "malformed client address");
        return INVALID_ADDRESS.to_string();
    };

    let mut info = RequestInfo::new(address).with_headers(request.headers);
    if let Some(host) = request.host {
        info = info.with_host(host);
    }
    match evaluator.action(&info, rules) {
        Ok(action) => action.to_string(),
        Err(err) => {
            error!(%err, %address, "request could not be classified");
            EVALUATION_ERROR.to_string()
        }
    }
}
