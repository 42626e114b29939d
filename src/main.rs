// src/main.rs

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use serde_json::Map;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info, warn};

use vanguard_probe::config::{default_config_path, ScanConfig};
use vanguard_probe::core::dom::DomSnapshot;
use vanguard_probe::core::models::{ProbeCategory, ScanReport};
use vanguard_probe::core::scanner::{build_http_client, Orchestrator};
use vanguard_probe::core::store::AnalysisStore;
use vanguard_probe::core::target::Target;
use vanguard_probe::error::StoreError;
use vanguard_probe::logging::initialize_logging;

fn parse_category(input: &str) -> Result<ProbeCategory, String> {
    ProbeCategory::from_str(input.trim()).map_err(|_| {
        let known: Vec<String> = ProbeCategory::all().iter().map(|c| c.to_string()).collect();
        format!("unknown probe category '{}', expected one of: {}", input, known.join(", "))
    })
}

#[derive(Parser, Debug, Clone)]
#[command(name = "vanguard-probe", version = env!("CARGO_PKG_VERSION"), max_term_width = 120)]
/// Heuristic web reconnaissance probes against a single target.
/// Findings are signals, not confirmed vulnerabilities.
/// Only scan systems you are authorized to test.
pub struct Opts {
    /// Target URL. A bare host is scanned over https.
    pub url: String,

    /// Custom path to the TOML config file.
    #[arg(short, long, value_parser)]
    pub config: Option<PathBuf>,

    /// Comma-delimited probe categories to run, overriding the config file.
    #[arg(long, value_delimiter = ',', value_parser = parse_category)]
    pub categories: Option<Vec<ProbeCategory>>,

    /// Rendered-page snapshot (JSON) for the cookie and CSRF probes.
    #[arg(long, conflicts_with = "static_dom")]
    pub dom: Option<PathBuf>,

    /// Build the page snapshot from a plain GET of the target instead of a browser capture.
    #[arg(long)]
    pub static_dom: bool,

    /// Existing analysis record to merge the report into.
    #[arg(long, conflicts_with = "history_dir")]
    pub record: Option<PathBuf>,

    /// History directory; the report is merged into the newest record for the target's domain.
    #[arg(long)]
    pub history_dir: Option<PathBuf>,

    /// Create a fresh record in the history directory instead of reusing the newest one.
    #[arg(long, requires = "history_dir")]
    pub new_record: bool,

    /// Also log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let opts = Opts::parse();
    let log_path = initialize_logging(opts.verbose)?;
    info!(log = %log_path.display(), "Logging initialized.");

    let config_path = opts.config.clone().unwrap_or_else(default_config_path);
    let mut config = ScanConfig::read(&config_path)?;
    if let Some(categories) = &opts.categories {
        config.categories = categories.clone();
    }

    let target = Target::parse(&opts.url)?;
    let dom = load_dom(&opts, &target, &config).await?;
    let report = Orchestrator::default().run_scan(target, dom, config).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    // The report is already on stdout, so a failed write only gets reported.
    if let Err(e) = persist_report(&opts, &report).await {
        error!(error = %e, "Failed to persist scan report.");
        eprintln!("failed to persist scan report: {}", e);
    }
    Ok(())
}

async fn load_dom(opts: &Opts, target: &Target, config: &ScanConfig) -> Result<Option<DomSnapshot>> {
    if let Some(path) = &opts.dom {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("could not read DOM snapshot {}", path.display()))?;
        let snapshot = DomSnapshot::from_json(&json)
            .wrap_err_with(|| format!("invalid DOM snapshot {}", path.display()))?;
        return Ok(Some(snapshot));
    }

    if !opts.static_dom {
        return Ok(None);
    }

    let client = build_http_client(config)?;
    match client.get(target.url.clone()).send().await {
        Ok(response) => {
            let set_cookies: Vec<String> = response
                .headers()
                .get_all(reqwest::header::SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(String::from))
                .collect();
            let html = response.text().await.unwrap_or_default();
            let headers: Vec<&str> = set_cookies.iter().map(String::as_str).collect();
            Ok(Some(DomSnapshot::from_html(&html, &headers)))
        }
        Err(e) => {
            // DOM probes are then reported as skipped.
            warn!(error = %e, "Could not fetch page for static DOM snapshot.");
            Ok(None)
        }
    }
}

async fn persist_report(opts: &Opts, report: &ScanReport) -> Result<(), StoreError> {
    if let Some(path) = &opts.record {
        return AnalysisStore::default().persist(path, report).await;
    }

    let Some(dir) = &opts.history_dir else {
        return Ok(());
    };
    let store = AnalysisStore::new(dir);
    let domain = report.target.record_domain();
    let path = if opts.new_record {
        store.create_record(&domain, Map::new()).await?
    } else {
        store.latest_record(&domain).await?
    };
    store.persist(&path, report).await?;
    eprintln!("scan results appended to {}", path.display());
    Ok(())
}
