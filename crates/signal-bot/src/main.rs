use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signal_bot::responder::InteractiveResponder;
use signal_bot::scheduler::BroadcastScheduler;
use signal_bot::selector::SignalSelector;
use signal_bot::telegram::TelegramClient;
use signal_bot::transport::MessageTransport;
use signal_bot::{messages, updates};
use signal_core::clock::{Clock, ZonedClock};
use signal_core::config::BotConfig;
use signal_core::gate::EntitlementGate;
use signal_core::store::StateStore;
use signal_providers::binance::BinanceProvider;
use signal_providers::provider::CandleProvider;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "signal-bot",
    about = "Score crypto pairs and deliver the best signal over Telegram"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer users and broadcast signals until interrupted
    Run,

    /// Compute the best signal once and print it
    Signal {
        /// Also post the signal to the configured channel
        #[arg(long)]
        post: bool,
    },

    /// Validate configuration and state, then print a summary
    Check,
}

fn load_config(path: &Path) -> Result<BotConfig> {
    let config = BotConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    for timeframe in &config.timeframes {
        BinanceProvider::validate_interval(timeframe)
            .with_context(|| format!("invalid timeframe in {}", path.display()))?;
    }
    Ok(config)
}

fn open_store(config: &BotConfig) -> Result<Arc<StateStore>> {
    let store = match &config.state_path {
        Some(path) => StateStore::open(path, config.initial_state())
            .with_context(|| format!("failed to open state file {}", path.display()))?,
        None => StateStore::in_memory(config.initial_state()),
    };
    Ok(Arc::new(store))
}

fn create_provider(config: &BotConfig) -> Result<Arc<dyn CandleProvider>> {
    let provider = BinanceProvider::new(
        &config.quote_asset,
        config.request_timeout(),
        config.binance_base_url.clone(),
    )
    .context("failed to create Binance provider")?;
    Ok(Arc::new(provider))
}

fn create_telegram(config: &BotConfig) -> Result<Arc<TelegramClient>> {
    let token = config.token().context("no bot token")?;
    let client = TelegramClient::new(token, config.request_timeout())
        .context("failed to create Telegram client")?;
    Ok(Arc::new(client))
}

async fn cmd_run(config: BotConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(ZonedClock::new(config.tz()?));
    let store = open_store(&config)?;
    let telegram = create_telegram(&config)?;
    let me = telegram
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("?"),
        "connected to Telegram"
    );

    let selector = Arc::new(SignalSelector::from_config(create_provider(&config)?, &config));
    let transport: Arc<dyn MessageTransport> = telegram.clone();

    let responder = Arc::new(InteractiveResponder::new(
        Arc::new(EntitlementGate::new(config.owner_user_id, store.clone())),
        selector.clone(),
        transport.clone(),
        clock.clone(),
        config.owner_username.clone(),
    ));
    let scheduler = BroadcastScheduler::new(
        selector,
        store,
        transport,
        clock,
        config.score_threshold,
        config.broadcast_interval(),
        config.owner_username.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let poller = tokio::spawn(updates::run_update_loop(
        telegram,
        responder,
        shutdown_rx.clone(),
    ));
    scheduler.run(shutdown_rx).await;
    poller.await.context("update loop panicked")?;

    Ok(())
}

async fn cmd_signal(config: BotConfig, post: bool) -> Result<()> {
    let selector = SignalSelector::from_config(create_provider(&config)?, &config);
    let selection = selector.select_best().await;

    for failure in &selection.failures {
        warn!(
            pair = %failure.pair,
            timeframe = %failure.timeframe,
            "skipped: {}",
            failure.error
        );
    }

    let Some(best) = selection.best else {
        println!(
            "No signal ({} combination(s) evaluated, {} failed).",
            selection.evaluated,
            selection.failures.len()
        );
        return Ok(());
    };

    println!("{}", messages::signal_reply(&best, &config.owner_username));

    if post {
        let telegram = create_telegram(&config)?;
        let text = messages::auto_signal(&best, &config.owner_username);
        telegram
            .send_text(config.channel_id, &text, None)
            .await
            .with_context(|| format!("failed to post to channel {}", config.channel_id))?;
        info!(channel = %config.channel_id, "signal posted");
    }

    Ok(())
}

fn cmd_check(config: &BotConfig) -> Result<()> {
    let today = ZonedClock::new(config.tz()?).today();
    let state = open_store(config)?.snapshot();

    println!("Owner: {} ({})", config.owner_username, config.owner_user_id);
    println!("Pairs: {}", config.pairs.join(", "));
    println!("Timeframes: {}", config.timeframes.join(", "));
    println!(
        "Threshold: {} (RSI {}/{}), every {}s",
        config.score_threshold,
        config.rsi_oversold,
        config.rsi_overbought,
        config.broadcast_interval_secs
    );
    println!("Today ({}): {today}", config.timezone);

    println!("Users: {}", state.allowed_users.len());
    for (user, entitlement) in &state.allowed_users {
        let status = if entitlement.is_expired(today) {
            "EXPIRED"
        } else {
            "ok"
        };
        println!(
            "  {user}: {}/{} used today, expires {} [{status}]",
            entitlement.usage_on(today),
            entitlement.daily_limit,
            entitlement.expiry_date
        );
    }

    println!("Subscriptions: {}", state.subscriptions.len());
    for (chat, subscription) in &state.subscriptions {
        let status = if subscription.is_live(today) {
            "live"
        } else if !subscription.active {
            "INACTIVE"
        } else {
            "EXPIRED"
        };
        println!(
            "  {chat}: expires {} [{status}]",
            subscription.expiry_date
        );
    }

    if config.token().is_err() {
        println!("WARN: no bot token configured");
    }
    println!("Configuration valid.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = load_config(&cli.config)?;

    match &cli.command {
        Commands::Run => cmd_run(config).await?,
        Commands::Signal { post } => cmd_signal(config, *post).await?,
        Commands::Check => cmd_check(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::try_parse_from(["signal-bot", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.log_level, "info");
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn parse_signal_post() {
        let cli = Cli::try_parse_from([
            "signal-bot",
            "--config",
            "/etc/bot.json",
            "signal",
            "--post",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/bot.json"));
        match cli.command {
            Commands::Signal { post } => assert!(post),
            _ => panic!("expected Signal command"),
        }
    }

    #[test]
    fn parse_signal_without_post() {
        let cli = Cli::try_parse_from(["signal-bot", "signal"]).unwrap();
        match cli.command {
            Commands::Signal { post } => assert!(!post),
            _ => panic!("expected Signal command"),
        }
    }

    #[test]
    fn parse_check_with_log_level() {
        let cli = Cli::try_parse_from(["signal-bot", "--log-level", "debug", "check"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["signal-bot"]).is_err());
    }

    #[test]
    fn load_config_rejects_unsupported_timeframe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "owner_username": "@owner",
                "owner_user_id": 1,
                "channel_id": -100,
                "pairs": ["BTC"],
                "timeframes": ["7m"],
                "score_threshold": 50
            }"#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported interval '7m'"));
    }
}
