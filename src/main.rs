use anyhow::{Context, Result};
use calltrack::config::config::AppCfg;
use calltrack::core::types::Actor;
use calltrack::feeds::actor::CollectorActor;
use calltrack::feeds::source::{build_sources, gather_articles};
use calltrack::marketdata::yahoo::YahooMarketData;
use calltrack::persistence::sqlite::SqliteStore;
use calltrack::tracker::Tracker;
use calltrack::tracking::actor::RefreshActor;
use calltrack::tracking::session::{SessionClock, UsEquitySession};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "calltrack", version, about = "Tracks stock-move calls made in financial news")]
struct Cli {
    /// Config file; missing files fall back to defaults and environment.
    #[arg(long, default_value = "config.yml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the collector and refresher until Ctrl-C (default).
    Run,
    /// Fetch all feeds once and record new predictions.
    Collect,
    /// Run one refresh cycle for today's pending predictions.
    Refresh,
    /// Finalise and archive a collection date.
    Rollover {
        #[arg(long)]
        date: NaiveDate,
    },
    /// Print the daily summary and per-source accuracy as JSON.
    Summary {
        /// Defaults to today in the session timezone.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the market session status as JSON.
    Status,
}

fn http_client(cfg: &AppCfg) -> Result<Client> {
    Client::builder()
        .user_agent(cfg.http.user_agent.clone())
        .pool_idle_timeout(cfg.http.pool_idle_timeout)
        .pool_max_idle_per_host(cfg.http.pool_max_idle_per_host)
        .timeout(cfg.http.timeout)
        .build()
        .context("building http client")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let cfg = AppCfg::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let span = info_span!(
        "Supervisor",
        pid = %std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
    );
    let _enter = span.enter();

    info!("Initializing Client");
    let client = http_client(&cfg)?;

    let session = Arc::new(UsEquitySession::new(&cfg.session)?);
    let market = Arc::new(YahooMarketData::new(cfg.market_data.clone(), client.clone()));
    let store = Arc::new(SqliteStore::open(&cfg.database.path).await?);
    let tracker = Tracker::new(
        &cfg.extraction,
        &cfg.tracking,
        market,
        session.clone(),
        store,
    );

    let now = Utc::now();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => supervise(&cfg, &client, tracker).await?,
        Command::Collect => {
            let sources = build_sources(&cfg.feeds, &client)?;
            let articles = gather_articles(&sources, cfg.feeds.delay_between_sources).await;
            let date = session.collection_date(now);
            let created = tracker.collect(&articles, date).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Command::Refresh => {
            let date = session.collection_date(now);
            let results = tracker.refresh_date(date, now).await?;
            let changed: Vec<_> = results.into_iter().filter(|(_, c)| *c).map(|(p, _)| p).collect();
            println!("{}", serde_json::to_string_pretty(&changed)?);
        }
        Command::Rollover { date } => {
            let report = tracker.daily_rollover(date, now).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Summary { date } => {
            let date = date.unwrap_or_else(|| session.collection_date(now));
            let out = serde_json::json!({
                "summary": tracker.daily_summary(date).await?,
                "sources": tracker.source_accuracy(date).await?,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&session.market_status(now))?);
        }
    }

    Ok(())
}

async fn supervise(cfg: &AppCfg, client: &Client, tracker: Tracker) -> Result<()> {
    info!("Starting up");
    let shutdown = CancellationToken::new();

    info!("Building actors");
    let sources = build_sources(&cfg.feeds, client)?;
    let collector = CollectorActor::new(
        tracker.clone(),
        sources,
        cfg.feeds.clone(),
        shutdown.clone(),
    );
    let refresher = RefreshActor::new(tracker, cfg.tracking.refresh, shutdown.clone());

    info!("Spawning actors");
    let mut actors = tokio::task::JoinSet::new();
    actors.spawn(collector.run().instrument(info_span!("Collector")));
    actors.spawn(refresher.run().instrument(info_span!("Refresher")));

    info!("Waiting for actors");
    tokio::select! {
        _ = async {
            while let Some(res) = actors.join_next().await {
                match res {
                    Ok(Ok(())) => info!("Actor exited cleanly"),
                    Ok(Err(e)) => error!(?e, "Actor returned error"),
                    Err(panic) => error!(?panic, "Actor panicked/cancelled"),
                }
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down supervisor loop");
            shutdown.cancel();
        }
    }

    info!("Waiting for graceful shutdown of actors");
    while let Some(res) = actors.join_next().await {
        match res {
            Ok(Ok(())) => info!("Actor exited cleanly"),
            Ok(Err(e)) => error!(?e, "Actor returned error"),
            Err(panic) => error!(?panic, "Actor panicked/cancelled"),
        }
    }

    info!("Supervisor exit");
    Ok(())
}
