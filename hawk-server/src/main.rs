//! Token Hawk Server
//!
//! Watches chat channels for Solana contract addresses, records each address
//! once, pushes it to observers and optionally hands it to a trade webhook.

mod api;
mod config;
mod prompt;
mod server;
mod session;
mod shutdown;
mod state;
mod transport;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::{ConfigLoader, LoadedConfig, get_database_url};
use hawk_core::action::WebhookTradeAction;
use hawk_core::address::AddressExtractor;
use hawk_core::auth::{AccountOnboarding, AuthSession};
use hawk_core::config::{ConfigStore, SourceList};
use hawk_core::dedup::Deduplicator;
use hawk_core::events::{detection_channel, notification_channel};
use hawk_core::processors::{DetectionPipeline, MonitorSupervisor, SourceSync, TokenDispatcher};
use hawk_core::registry::SourceRegistry;
use hawk_core::sources::load_sources;
use hawk_core::store::PgDiscoveryStore;
use hawk_core::transport::ChatTransport;
use hawk_sdk::client::GatewayClient;
use prompt::ConsolePrompt;
use server::{build_router, run_server};
use session::{SessionFileError, SessionRecord, read_record, write_record};
use shutdown::{shutdown_signal, spawn_reload_handler};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use transport::{GatewayTransport, GatewayTransportFactory};

/// Token Hawk - chat channel contract address monitor
#[derive(Parser, Debug)]
#[command(name = "hawk-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./hawk-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "HAWK_LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Monitor the configured sources (default)
    Run {
        /// Prompt on the console when the session needs a login
        #[arg(long, default_value = "false")]
        interactive: bool,
    },
    /// Log the monitor account in and write the session file
    Login,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting hawk-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let http = reqwest::Client::new();
    let client = GatewayClient::new(
        loaded.telegram.gateway_url.clone(),
        loaded.telegram.session_label.clone(),
    )
    .with_http_client(http.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(GatewayTransport::new(
        client,
        Some(loaded.telegram.credentials.clone()),
    ));

    match args.command.unwrap_or(Command::Run { interactive: false }) {
        Command::Login => login(&loaded, transport).await,
        Command::Run { interactive } => {
            run(&args, config_loader, loaded, transport, http, interactive).await
        }
    }
}

/// Interactive console login of the monitor account.
async fn login(config: &LoadedConfig, transport: Arc<dyn ChatTransport>) -> anyhow::Result<()> {
    let phone = &config.telegram.phone;
    let mut auth = AuthSession::new(transport.clone(), phone.clone());
    let user = auth
        .authorize_interactively(&ConsolePrompt)
        .await
        .map_err(|e| {
            tracing::error!(%phone, error = %e, "Login failed");
            e
        })?;

    let record = SessionRecord::new(config.telegram.session_label.clone(), &user);
    write_record(&config.telegram.session_path, &record).await?;
    tracing::info!(
        %phone,
        account_id = user.id,
        username = ?user.username,
        session = %record.label,
        "Logged in, session file written to {:?}",
        config.telegram.session_path
    );

    if let Err(e) = transport.disconnect().await {
        tracing::warn!(%phone, error = %e, "Failed to disconnect after login");
    }
    Ok(())
}

async fn run(
    args: &Args,
    config_loader: Arc<ConfigLoader>,
    loaded: LoadedConfig,
    transport: Arc<dyn ChatTransport>,
    http: reqwest::Client,
    interactive: bool,
) -> anyhow::Result<()> {
    match read_record(&loaded.telegram.session_path).await {
        Ok(record) => {
            tracing::info!(
                session = %record.label,
                account_id = record.user_id,
                "Using session authorized at {}",
                record.authorized_at
            );
        }
        Err(SessionFileError::Missing { .. }) if interactive => {
            tracing::info!("No session file yet, logging in");
            login(&loaded, transport.clone()).await?;
        }
        Err(e) => {
            tracing::error!(phone = %loaded.telegram.phone, error = %e, "Cannot start monitoring");
            return Err(e.into());
        }
    }

    let handles = load_sources(&loaded.sources_file).await.map_err(|e| {
        tracing::error!(error = %e, "Cannot start monitoring without sources");
        e
    })?;
    tracing::info!(sources = handles.len(), "Source list loaded from {:?}", loaded.sources_file);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // -- Shared channels and state -------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let notifications = notification_channel();
    let (detection_tx, detection_rx) = detection_channel();

    let mut dispatcher = TokenDispatcher::new(
        Arc::new(PgDiscoveryStore::new(db_pool.clone())),
        notifications.clone(),
        loaded.monitor.dispatch_grace,
    );
    match &loaded.trade {
        Some(trade) => {
            tracing::info!(webhook = %trade.webhook_url, amount = %trade.amount, "Trade action enabled");
            dispatcher = dispatcher.with_action(Arc::new(WebhookTradeAction::new(
                trade.webhook_url.clone(),
                trade.secret.as_bytes(),
                trade.amount,
            )));
        }
        None => tracing::info!("No [trade] section, detections are recorded only"),
    }

    let registry = SourceRegistry::new(transport.clone());
    let pipeline = DetectionPipeline::new(
        transport.clone(),
        AddressExtractor::new(loaded.monitor.extraction),
        Deduplicator::new(),
        detection_tx,
    );

    let sources = ConfigStore::new(SourceList { handles });
    let source_watcher = sources.subscribe();
    let source_sync = SourceSync::new(registry.clone());
    source_sync.apply_diff(&sources.current()).await;

    let mut supervisor = MonitorSupervisor::new(
        AuthSession::new(transport.clone(), loaded.telegram.phone.clone()),
        registry,
        pipeline,
        loaded.monitor.clone(),
    );
    if interactive {
        supervisor = supervisor.with_prompt(Arc::new(ConsolePrompt));
    }

    // -- Background tasks ----------------------------------------------------
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown_rx.clone(), detection_rx));
    let sync_handle = tokio::spawn(source_sync.run(
        shutdown_rx.clone(),
        sources.clone(),
        source_watcher,
    ));
    let supervisor_handle = {
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let result = supervisor.run(shutdown_rx).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Monitoring stopped");
            }
            let _ = shutdown_tx.send(true);
            result
        })
    };
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    let onboarding = AccountOnboarding::new(Arc::new(GatewayTransportFactory::new(
        loaded.telegram.gateway_url.clone(),
        http,
    )));
    let state = AppState::new(
        db_pool.clone(),
        loaded.admin.clone(),
        notifications,
        onboarding,
        shutdown_rx.clone(),
    );
    let reload_notify = spawn_reload_handler(state.clone(), config_loader, sources);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", loaded.listen);
    let server_result = run_server(router, loaded.listen, wait_for_shutdown(shutdown_rx)).await;
    if let Err(e) = &server_result {
        tracing::error!("HTTP server failed: {}", e);
    }

    // -- Teardown ------------------------------------------------------------
    let _ = shutdown_tx.send(true);
    reload_notify.notify_one();

    let monitor_result = supervisor_handle.await;
    if let Err(e) = sync_handle.await {
        tracing::error!(error = %e, "SourceSync task panicked");
    }
    if let Err(e) = dispatcher_handle.await {
        tracing::error!(error = %e, "TokenDispatcher task panicked");
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    server_result?;
    monitor_result??;
    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stopping| *stopping).await;
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
