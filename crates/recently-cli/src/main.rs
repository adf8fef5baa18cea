mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{Cli, Command, ListArgs, SourceArgs};
use recently_config::{AppConfig, ConfigManager, MemorySettingsStore, SettingsStore};
use recently_core::AggregationConfig;
use recently_mail::{
    ranked_senders, spawn_maildir_watcher, Aggregator, MaildirStore, QueryHandler,
    RefreshScheduler, SchedulerOptions,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::List(list) => run_list(list).await,
        Command::Serve(source) => run_serve(source).await,
    }
}

struct Setup {
    config: AppConfig,
    manager: ConfigManager,
    store: Arc<MaildirStore>,
}

fn setup(source: &SourceArgs) -> anyhow::Result<Setup> {
    let manager = match &source.config {
        Some(path) => ConfigManager::at(path),
        None => ConfigManager::new(),
    }
    .context("initialize config manager")?;
    let config = manager.load().context("load app config")?;

    let Some(maildir) = source.maildir.clone().or_else(|| config.store.maildir.clone()) else {
        bail!(
            "no maildir given; pass --maildir or set store.maildir in {}",
            manager.config_path().display()
        );
    };
    if !maildir.is_dir() {
        bail!("maildir {} is not a directory", maildir.display());
    }

    let store = Arc::new(MaildirStore::new(maildir, config.store.page_size));
    Ok(Setup {
        config,
        manager,
        store,
    })
}

async fn run_list(args: ListArgs) -> anyhow::Result<()> {
    let Setup {
        mut config,
        manager,
        store,
    } = setup(&args.source)?;

    let settings: Arc<dyn SettingsStore> = match args.lookback {
        Some(days) => {
            let aggregation = AggregationConfig::new(days).with_context(|| {
                format!("lookback must be a positive number of days, got {days}")
            })?;
            config.set_aggregation(aggregation);
            Arc::new(MemorySettingsStore::new(config))
        }
        None => Arc::new(manager),
    };

    let aggregator = Aggregator::initialize(store, settings).context("initialize aggregator")?;
    aggregator.refresh().await.context("refresh sender histogram")?;
    let snapshot = aggregator.snapshot().await;

    let mut senders = ranked_senders(&snapshot.histogram);
    if let Some(top) = args.top {
        senders.truncate(top);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&senders)?);
        return Ok(());
    }

    println!(
        "{} senders in the last {} days",
        snapshot.histogram.len(),
        snapshot.config.lookback_days
    );
    for sender in senders {
        println!("{:>5}  {}", sender.count, sender.author);
    }
    Ok(())
}

async fn run_serve(source: SourceArgs) -> anyhow::Result<()> {
    let Setup {
        config,
        manager,
        store,
    } = setup(&source)?;

    let aggregator = Arc::new(
        Aggregator::initialize(store.clone(), Arc::new(manager))
            .context("initialize aggregator")?,
    );
    let (scheduler, scheduler_task) = RefreshScheduler::spawn(
        aggregator.clone(),
        SchedulerOptions::from(&config.scheduler),
    );

    let watcher = spawn_maildir_watcher(
        store,
        scheduler.clone(),
        config.scheduler.poll_interval(),
    )
    .await
    .context("start maildir watcher")?;

    let handler = QueryHandler::new(aggregator);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handler.handle_json(&line).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    watcher.abort();
    let _ = watcher.await;
    drop(scheduler);
    if let Err(err) = scheduler_task.await {
        tracing::warn!("refresh scheduler ended abnormally: {err}");
    }
    Ok(())
}
