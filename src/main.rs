//! skillshare-audit CLI
//!
//! Binary entry point. CLI parsing (clap), logging setup, and terminal
//! report rendering. Engine logic lives in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use skillshare_audit::batch::{self, BatchOutcome, CompletionHook};
use skillshare_audit::config;
use skillshare_audit::cross;
use skillshare_audit::finding::Severity;
use skillshare_audit::report;
use skillshare_audit::rules::RuleSet;

#[derive(Parser, Debug)]
#[command(name = "skillshare-audit")]
#[command(version)]
#[command(about = "Audit AI agent skill directories for security issues")]
struct Cli {
    /// Skill directories to audit
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Extra rule overlay files (merged after the global and project overlays)
    #[arg(long = "rules", value_name = "FILE")]
    rules: Vec<PathBuf>,

    /// Severity at or above which a skill is blocked (critical, high, medium, low, info)
    #[arg(long)]
    threshold: Option<String>,

    /// Skip cross-skill capability analysis
    #[arg(long)]
    no_cross: bool,

    /// Verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Sarif,
    Markdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let file_config = config::load_config()?;
    let mut audit_config = file_config.to_audit_config()?;
    if let Some(ref raw) = cli.threshold {
        audit_config.threshold = raw
            .parse::<Severity>()
            .map_err(|e| anyhow::anyhow!("invalid --threshold: {e}"))?;
    }

    let mut overlay_paths = file_config.rules.paths.clone();
    overlay_paths.extend(cli.rules.iter().cloned());
    let rules = Arc::new(RuleSet::load(&overlay_paths)?);
    tracing::debug!(rules = rules.len(), "Rule set loaded");

    let progress: Option<CompletionHook> = cli.verbose.then(|| {
        Arc::new(|outcome: &BatchOutcome| {
            tracing::info!(
                skill = %outcome.target.display(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                ok = outcome.error.is_none(),
                "Skill scanned"
            );
        }) as CompletionHook
    });

    let outcomes = batch::scan_batch(&cli.paths, rules, audit_config, progress).await;

    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for outcome in &outcomes {
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => reports.push(report.clone()),
            (None, Some(error)) => errors.push((outcome.target.clone(), error.clone())),
            (None, None) => {}
        }
    }

    if !cli.no_cross
        && let Some(cross_report) = cross::analyze(&reports, &audit_config)
    {
        reports.push(cross_report);
    }

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&reports)),
        OutputFormat::Json => println!("{}", report::to_json(&reports)?),
        OutputFormat::Sarif => {
            println!("{}", serde_json::to_string_pretty(&report::to_sarif(&reports))?)
        }
        OutputFormat::Markdown => print!("{}", report::to_markdown(&reports)),
    }

    for (target, error) in &errors {
        eprintln!("error: {}: {error}", target.display());
    }

    if reports.iter().any(|r| r.is_blocked) {
        Ok(ExitCode::from(2))
    } else if !errors.is_empty() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn render_text(reports: &[skillshare_audit::audit::AuditReport]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!(
            "{}: {} (score {}/100, {} finding(s), analyzability {:.0}%)\n",
            report.skill_name,
            report.risk_label,
            report.risk_score,
            report.findings.len(),
            report.analyzability * 100.0
        ));
        for finding in &report.findings {
            let location = if finding.line > 0 {
                format!("{}:{}", finding.file, finding.line)
            } else {
                finding.file.clone()
            };
            out.push_str(&format!(
                "  [{}] {} ({}): {}\n",
                finding.severity, location, finding.pattern, finding.message
            ));
            if !finding.snippet.is_empty() {
                out.push_str(&format!("      > {}\n", finding.snippet));
            }
        }
    }

    let blocked = reports.iter().filter(|r| r.is_blocked).count();
    let with_findings = reports.iter().filter(|r| !r.findings.is_empty()).count();
    out.push_str(&format!(
        "\n{} skill(s) scanned, {} with findings, {} blocked\n",
        reports.len(),
        with_findings,
        blocked
    ));
    out
}
