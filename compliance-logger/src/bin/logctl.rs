//! Compliance Log Operations Tool
//!
//! Answers data subject requests and runs retention by hand against the log
//! directories of a deployed service.
//!
//! Usage:
//!   cargo run --bin logctl -- --config logger.yaml search --user-id 12345
//!   cargo run --bin logctl -- --config logger.yaml export --email a@b.com --output subject.json
//!   cargo run --bin logctl -- --config logger.yaml erase --user-id 12345
//!   cargo run --bin logctl -- --config logger.yaml rotate

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use compliance_logger::rotation::run_rotation_pass;
use compliance_logger::{LoggerConfig, SearchOptions, SubjectAccess, SubjectIdentifiers};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logctl")]
#[command(about = "Subject access and retention operations on compliance logs")]
struct Cli {
    /// Logger configuration file (YAML, TOML or JSON)
    #[arg(long, short, env = "COMPLIANCE_LOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find all records of a data subject
    Search {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Earliest record timestamp (RFC 3339), default 30 days ago
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Latest record timestamp (RFC 3339), default now
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all records of a data subject as JSON
    Export {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Output file, stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Erase identifying values of a data subject from every log file
    Erase {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Only report how many records match
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one retention pass now
    Rotate,
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Args, Debug)]
struct SubjectArgs {
    #[arg(long, default_value = "")]
    user_id: String,

    #[arg(long, default_value = "")]
    username: String,

    #[arg(long, default_value = "")]
    email: String,

    #[arg(long = "ip", default_value = "")]
    ip_address: String,

    /// Additional identifier, may be repeated
    #[arg(long = "id")]
    ids: Vec<String>,

    /// Case-insensitive keyword, may be repeated
    #[arg(long = "keyword")]
    keywords: Vec<String>,
}

impl SubjectArgs {
    fn into_identifiers(self) -> anyhow::Result<SubjectIdentifiers> {
        let ids = SubjectIdentifiers {
            user_id: self.user_id,
            username: self.username,
            email: self.email,
            ip_address: self.ip_address,
            ids: self.ids,
            keywords: self.keywords,
        };
        if ids.is_empty() {
            anyhow::bail!("At least one subject identifier is required");
        }
        Ok(ids)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LoggerConfig::load(cli.config.as_deref())
        .context("Failed to load logger configuration")?;
    let access = SubjectAccess::new(config.layout.clone());

    match cli.command {
        Command::Search {
            subject,
            from,
            to,
            json,
        } => {
            let ids = subject.into_identifiers()?;
            let to = to.unwrap_or_else(Utc::now);
            let from = from.unwrap_or_else(|| to - Duration::days(30));

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, returning partial results");
                    let _ = cancel_tx.send(true);
                }
            });

            let result = access
                .find_logs_for_subject_with(&ids, from, to, &SearchOptions::with_cancel(cancel_rx))
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for entry in &result.entries {
                    println!("[{}] {}", entry.source, entry.raw);
                }
            }
            info!(
                "🔎 {} entries for {} across {} files",
                result.total_entries,
                result.subject,
                result.searched_files.len()
            );
        }
        Command::Export { subject, output } => {
            let ids = subject.into_identifiers()?;
            let count = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let count = access.export_logs_for_subject(&ids, &mut file).await?;
                    info!("Wrote export to {}", path.display());
                    count
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    access.export_logs_for_subject(&ids, &mut stdout).await?
                }
            };
            info!("📦 Exported {} entries", count);
        }
        Command::Erase { subject, dry_run } => {
            let ids = subject.into_identifiers()?;
            if dry_run {
                let to = Utc::now() + Duration::days(1);
                let result = access
                    .find_logs_for_subject(&ids, DateTime::UNIX_EPOCH, to)
                    .await?;
                info!("ℹ️  Dry run: {} records would be erased", result.total_entries);
            } else {
                let count = access.delete_logs_for_subject(&ids).await?;
                info!("🧹 Erased subject data from {} records", count);
            }
        }
        Command::Rotate => {
            let report = run_rotation_pass(&config.layout, &config.retention).await;
            for path in &report.rotated {
                println!("rotated {}", path.display());
            }
            for path in &report.deleted {
                println!("deleted {}", path.display());
            }
            if report.errors > 0 {
                anyhow::bail!("Rotation finished with {} errors", report.errors);
            }
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
