//! # Mirrortrade: Position Mirroring Backend
//!
//! ```text
//!  ┌─────────────┐  GET /leaderboard            ┌──────────────────────────────┐
//!  │  nof1 API   │ ◀──────────────────────────  │ cycle loop (every N seconds) │
//!  └─────────────┘  GET /account-totals         │ └─ FollowOrchestrator        │
//!                                               │    ├─ detector               │
//!  ┌─────────────┐  place-order / plan-order    │    ├─ dispatcher ─ routers   │
//!  │  Bitget     │ ◀──────────────────────────  │    └─ notifiers  📨          │
//!  │ demo + live │                              └──────────────┬───────────────┘
//!  └─────────────┘                                             │ AppState
//!  ┌─────────────┐  ws://host/ws/monitor  ◀────────────────────┘
//!  │  Dashboard  │  GET/POST /api/config, GET /api/status, /api/positions
//!  └─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirrortrade::config::ConfigStore;
use mirrortrade::engine::{FollowOrchestrator, MultiEnvironmentDispatcher, OrderRouter, TradingMode};
use mirrortrade::exchange::{BitgetCredentials, BitgetExchange, Exchange, PaperExchange};
use mirrortrade::models::Environment;
use mirrortrade::notify::{NotificationHub, TelegramNotifier, WeChatNotifier};
use mirrortrade::report;
use mirrortrade::routes;
use mirrortrade::settings::Settings;
use mirrortrade::source::Nof1Source;
use mirrortrade::state::build_state;
use mirrortrade::store::SnapshotStore;

#[derive(Parser, Debug)]
#[command(name = "mirrortrade", version, about = "Mirror tracked model positions onto Bitget futures")]
struct Cli {
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Send a test message to every notification channel and exit.
    #[arg(long)]
    test_notify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── 1. Load .env + settings ───────────────────────────────────────────────
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    // ── 2. Structured logging (stdout + daily file) ───────────────────────────
    let log_file = RollingFileAppender::new(Rotation::DAILY, &settings.log_dir, "mirrortrade.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("mirrortrade=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           MIRRORTRADE · Position Follower             ║
  ║      Fetch · Detect · Filter · Route · Protect        ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Notifiers ──────────────────────────────────────────────────────────
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let notifier = build_notifier(&settings, &http)?;
    if notifier.is_empty() {
        warn!("⚠️ No notification channel configured (WECHAT_WEBHOOK_URL / TELEGRAM_*)");
    } else {
        info!(channels = ?notifier.channels(), "📨 Notification channels ready");
    }

    if cli.test_notify {
        let delivered = notifier.broadcast(&report::test_notice(Utc::now())).await;
        if !delivered {
            anyhow::bail!("test notification was not delivered by any channel");
        }
        info!("✅ Test notification delivered");
        return Ok(());
    }

    // ── 4. Stores ─────────────────────────────────────────────────────────────
    let config_store = Arc::new(ConfigStore::new(&settings.config_path));
    config_store.ensure_exists().await?;
    let snapshot_store = Arc::new(SnapshotStore::new(&settings.data_dir, settings.save_history));

    // ── 5. Exchanges ──────────────────────────────────────────────────────────
    let dispatcher = build_dispatcher(&settings, &http);
    if dispatcher.is_empty() {
        info!("👀 Monitor-only mode: changes are detected and notified, never routed");
    } else {
        dispatcher.prepare().await;
    }

    // ── 6. Orchestrator ───────────────────────────────────────────────────────
    let source = Arc::new(Nof1Source::new(http.clone(), &settings.api_url));
    let api_url = source.api_url().to_string();
    let mut orchestrator = FollowOrchestrator::new(source, snapshot_store.clone(), config_store.clone(), notifier)
        .with_dispatcher(dispatcher)
        .with_monitored_models(settings.monitored_models.clone());

    let state = build_state(config_store, snapshot_store, settings.api_key.clone(), settings.trading_label());

    if cli.once {
        let outcome = orchestrator.run_cycle().await;
        state.record_cycle(&outcome).await;
        let report = outcome?;
        info!(stage = ?report.stage, detected = report.detected, "Single cycle finished");
        return Ok(());
    }

    // ── 7. HTTP API ───────────────────────────────────────────────────────────
    let app = routes::router(state.clone());
    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "🚀 HTTP API listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "❌ HTTP server stopped");
        }
    });

    orchestrator
        .notifier()
        .broadcast(&report::startup_notice(
            &api_url,
            &settings.monitored_models,
            settings.poll_interval,
            &settings.trading_label(),
            Utc::now(),
        ))
        .await;

    // ── 8. Cycle loop ─────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(Duration::from_secs(settings.poll_interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = settings.poll_interval, "⏱️ Cycle loop started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = orchestrator.run_cycle().await;
                if let Err(e) = &outcome {
                    error!(error = %e, "❌ Cycle aborted, previous snapshot kept");
                }
                state.record_cycle(&outcome).await;
            }
            _ = &mut shutdown => {
                info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    orchestrator
        .notifier()
        .broadcast(&report::shutdown_notice(Utc::now()))
        .await;
    Ok(())
}

fn build_notifier(settings: &Settings, http: &reqwest::Client) -> anyhow::Result<NotificationHub> {
    let mut hub = NotificationHub::new();
    if let Some(url) = &settings.wechat_webhook {
        hub = hub.with(Arc::new(WeChatNotifier::new(http.clone(), url.clone())));
    }
    if let (Some(token), Some(chat_id)) = (&settings.telegram_token, &settings.telegram_chat_id) {
        let telegram = TelegramNotifier::new(
            http.clone(),
            token.clone(),
            chat_id.clone(),
            settings.telegram_proxy.as_deref(),
        )?;
        hub = hub.with(Arc::new(telegram));
    }
    Ok(hub)
}

fn build_dispatcher(settings: &Settings, http: &reqwest::Client) -> MultiEnvironmentDispatcher {
    let Some(mode) = settings.trading_mode else {
        return MultiEnvironmentDispatcher::new(None, None);
    };
    info!(mode = %mode, "💱 Trading mode");

    let bitget = |name: &str, creds: BitgetCredentials, demo: bool| -> Arc<dyn Exchange> {
        Arc::new(BitgetExchange::new(name, &settings.bitget_url, creds, demo, http.clone()))
    };

    let demo: Option<Arc<dyn Exchange>> = match mode {
        TradingMode::Paper => Some(Arc::new(PaperExchange::new("paper"))),
        m if m.uses_demo() => Some(bitget("bitget-demo", settings.demo_creds.clone(), true)),
        _ => None,
    };
    let live = mode
        .uses_live()
        .then(|| bitget("bitget-live", settings.live_creds.clone(), false));

    MultiEnvironmentDispatcher::new(
        demo.map(|ex| OrderRouter::new(Environment::Demo, ex)),
        live.map(|ex| OrderRouter::new(Environment::Live, ex)),
    )
}
