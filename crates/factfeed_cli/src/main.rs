//! Command-line front end for the factfeed delivery engine.
//!
//! # Responsibility
//! - Open the feed database and expose each delivery operation as a
//!   subcommand.
//! - Print typed results as JSON on stdout.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use factfeed_core::repo::account_repo::AccountStore;
use factfeed_core::repo::content_repo::ContentPool;
use factfeed_core::{
    init_from_config, init_logging, open_db, sqlite_service, ContentItem, ContentRatio,
    ContentType, DeliveryStatus, FeedConfig, FetchBatchRequest, HistoryRequest,
    MarkDeliveredRequest, ServiceError, SqliteAccountStore, SqliteContentPool, UserAccount,
    UserPreferences,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "factfeed",
    version,
    about = "Schedule and deduplicate current-affairs content deliveries",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(long, global = true, default_value = "factfeed.db")]
    db: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for log files; overrides the config value
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Override the current instant (RFC 3339)
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<DateTime<FixedOffset>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load accounts, preferences and content from a JSON fixture
    Seed {
        /// Fixture file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Schedule a batch using explicit preferences
    Fetch {
        #[arg(short, long)]
        user: Uuid,

        /// Window start (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        from: DateTime<FixedOffset>,

        /// Window end (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        to: DateTime<FixedOffset>,

        /// Notification times, e.g. 09:00,13:00
        #[arg(long, value_delimiter = ',', required = true)]
        times: Vec<String>,

        #[arg(long, default_value = "3")]
        items_per_slot: u32,

        /// Exam filters, e.g. UPSC,SSC
        #[arg(long, value_delimiter = ',', default_value = "UPSC")]
        exams: Vec<String>,

        /// Fact share in percent; the rest are questions
        #[arg(long)]
        fact_percent: Option<u8>,
    },

    /// Schedule a batch from the user's stored preferences
    Scheduled {
        #[arg(short, long)]
        user: Uuid,

        #[arg(long, value_parser = parse_instant)]
        from: DateTime<FixedOffset>,

        #[arg(long, value_parser = parse_instant)]
        to: DateTime<FixedOffset>,
    },

    /// Record deliveries for content ids
    MarkDelivered {
        #[arg(short, long)]
        user: Uuid,

        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<Uuid>,

        /// Delivery instant (RFC 3339); defaults to now
        #[arg(long, value_parser = parse_instant)]
        delivered_at: Option<DateTime<FixedOffset>>,

        #[arg(long)]
        platform: Option<String>,
    },

    /// Read delivered-item history
    History {
        #[arg(short, long)]
        user: Uuid,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        page_size: u32,

        /// Skip the premium subscription check
        #[arg(long, default_value = "false")]
        any_tier: bool,
    },

    /// Pick one random item, preferring undelivered ones
    Random {
        #[arg(short, long)]
        user: Uuid,

        /// fact or question
        #[arg(long = "type", default_value = "fact")]
        content_type: ContentType,
    },

    /// Count pool content and the user's undelivered share
    Availability {
        #[arg(long, value_delimiter = ',', default_value = "UPSC")]
        exams: Vec<String>,

        #[arg(short, long)]
        user: Option<Uuid>,
    },

    /// Move a delivery record to another status
    Status {
        #[arg(short, long)]
        user: Uuid,

        #[arg(long)]
        content: Uuid,

        /// pending, sent, failed, retrying or cancelled
        #[arg(long)]
        next: DeliveryStatus,

        #[arg(long)]
        error: Option<String>,
    },
}

/// Seed fixture layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    accounts: Vec<UserAccount>,
    preferences: Vec<UserPreferences>,
    content: Vec<ContentItem>,
}

#[derive(Debug, Serialize)]
struct SeedSummary {
    accounts: usize,
    preferences: usize,
    content: usize,
}

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    error: &'static str,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FeedConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FeedConfig::default(),
    };
    match &cli.log_dir {
        Some(dir) => init_logging(
            config
                .logging
                .level
                .as_deref()
                .unwrap_or(factfeed_core::default_log_level()),
            dir,
        )?,
        None => {
            init_from_config(&config.logging)?;
        }
    }

    let offset = config.civil_offset();
    let now = cli
        .now
        .unwrap_or_else(|| Utc::now().fixed_offset())
        .with_timezone(&offset);

    let conn = open_db(&cli.db, &config)
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    let service = sqlite_service(&conn, config)?;

    match cli.command {
        Commands::Seed { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading fixture {}", file.display()))?;
            let fixture: Fixture = serde_json::from_str(&raw).context("parsing fixture")?;

            let accounts = SqliteAccountStore::try_new(&conn)?;
            for account in &fixture.accounts {
                accounts.upsert_account(account)?;
            }
            for preferences in &fixture.preferences {
                service
                    .save_preferences(preferences, now)
                    .map_err(|err| report(err, "seed preferences"))?;
            }
            let pool = SqliteContentPool::try_new(&conn)?;
            for item in &fixture.content {
                pool.insert_content(item)?;
            }
            info!(
                "event=seed module=cli status=ok accounts={} preferences={} content={}",
                fixture.accounts.len(),
                fixture.preferences.len(),
                fixture.content.len()
            );
            emit(&SeedSummary {
                accounts: fixture.accounts.len(),
                preferences: fixture.preferences.len(),
                content: fixture.content.len(),
            })
        }
        Commands::Fetch {
            user,
            from,
            to,
            times,
            items_per_slot,
            exams,
            fact_percent,
        } => {
            let ratio = match fact_percent {
                Some(percent) if percent > 100 => bail!("fact percent must be at most 100"),
                Some(percent) => Some(ContentRatio::new(percent, 100 - percent)?),
                None => None,
            };
            let request = FetchBatchRequest {
                user_id: user,
                from,
                to,
                notification_times: times,
                items_per_slot,
                ratio,
                exam_types: exams,
            };
            let result = service
                .fetch_batch(&request, now)
                .map_err(|err| report(err, "fetch"))?;
            emit(&result)
        }
        Commands::Scheduled { user, from, to } => {
            let result = service
                .fetch_scheduled(user, from, to, now)
                .map_err(|err| report(err, "scheduled"))?;
            emit(&result)
        }
        Commands::MarkDelivered {
            user,
            ids,
            delivered_at,
            platform,
        } => {
            let request = MarkDeliveredRequest {
                user_id: user,
                content_ids: ids,
                delivered_at,
                platform,
            };
            let result = service
                .mark_delivered(&request, now)
                .map_err(|err| report(err, "mark-delivered"))?;
            emit(&result)
        }
        Commands::History {
            user,
            page,
            page_size,
            any_tier,
        } => {
            let request = HistoryRequest {
                user_id: user,
                page,
                page_size,
            };
            let page = if any_tier {
                service.history(&request, now)
            } else {
                service.history_for_tier(&request, now)
            }
            .map_err(|err| report(err, "history"))?;
            emit(&page)
        }
        Commands::Random { user, content_type } => {
            let item = service
                .random_item(user, content_type, now)
                .map_err(|err| report(err, "random"))?;
            emit(&item)
        }
        Commands::Availability { exams, user } => {
            let counts = service
                .available_content(&exams, user)
                .map_err(|err| report(err, "availability"))?;
            emit(&counts)
        }
        Commands::Status {
            user,
            content,
            next,
            error,
        } => {
            let record = service
                .update_delivery_status(user, content, next, error.as_deref())
                .map_err(|err| report(err, "status"))?;
            emit(&record)
        }
    }
}

fn parse_instant(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|err| format!("expected an RFC 3339 timestamp like 2025-03-10T00:00:00+05:30: {err}"))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a machine-readable error on stderr and hands it to anyhow.
fn report(err: ServiceError, context: &str) -> anyhow::Error {
    let payload = ErrorReport {
        error: err.code(),
        message: err.to_string(),
        retryable: err.is_retryable(),
        context: Some(context),
    };
    if let Ok(json) = serde_json::to_string(&payload) {
        eprintln!("{json}");
    }
    anyhow::Error::new(err).context(format!("{context} failed"))
}
