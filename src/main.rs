use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use malice_avast::config::{PluginConfig, getopt, resolve_elasticsearch_url, webhook_proxy};
use malice_avast::infrastructure::{scanner, storage};
use malice_avast::models::{PLUGIN_CATEGORY, PLUGIN_NAME};
use malice_avast::services::error::ScanError;
use malice_avast::services::license::is_license_expired;
use malice_avast::services::metadata::BUILD_TIME;
use malice_avast::services::report::{markdown_table, to_json};
use malice_avast::services::runner::SystemRunner;
use malice_avast::services::scanner::{AvastScanner, VirusScanner};
use malice_avast::services::sink::to_record;
use malice_avast::services::webhook::WebhookClient;
use malice_avast::utils::hash::correlation_id;
use malice_avast::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Malice Avast AntiVirus Plugin
#[derive(Parser, Debug)]
#[command(name = "avast", author, about, args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// verbose output
    #[arg(short = 'V', long, global = true)]
    verbose: bool,

    /// elasticsearch url for Malice to store results
    #[arg(long, env = "MALICE_ELASTICSEARCH_URL")]
    elasticsearch: Option<String>,

    /// output as Markdown table
    #[arg(short, long)]
    table: bool,

    /// POST results back to Malice webhook
    #[arg(short, long)]
    callback: bool,

    /// proxy settings for Malice webhook endpoint
    #[arg(short = 'x', long)]
    proxy: bool,

    /// malice plugin timeout (in seconds)
    #[arg(long, env = "MALICE_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// print version information
    #[arg(long)]
    version: bool,

    /// file to scan
    path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update virus definitions
    #[command(alias = "u")]
    Update,
    /// Create a Avast scan web service
    Web,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();

    if args.version {
        println!(
            "avast version {}, BuildTime: {}",
            env!("CARGO_PKG_VERSION"),
            BUILD_TIME
        );
        return ExitCode::SUCCESS;
    }

    let default_filter = if args.verbose {
        "malice_avast=debug,avast=debug,tower_http=debug"
    } else {
        "malice_avast=info,avast=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PluginConfig::from_env();
    let target = args.path.clone();

    let result = match args.command {
        Some(Commands::Update) => update(&config).await,
        Some(Commands::Web) => web_service(config).await,
        None => scan_file(args, &config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(
                plugin = PLUGIN_NAME,
                category = PLUGIN_CATEGORY,
                path = ?target,
                "{:#}",
                e
            );
            ExitCode::FAILURE
        }
    }
}

async fn update(config: &PluginConfig) -> anyhow::Result<()> {
    println!("Updating Avast...");
    let scanner = AvastScanner::new(Arc::new(SystemRunner), config);
    let output = scanner.update().await?;
    println!("{}", output);
    Ok(())
}

async fn scan_file(args: Args, config: &PluginConfig) -> anyhow::Result<()> {
    let path = args.path.ok_or_else(|| {
        ScanError::MissingInput("Please supply a file to scan with malice/avast".to_string())
    })?;
    let path = std::path::absolute(&path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("cannot scan {}", path.display()))?;

    if is_license_expired(&config.license_file).await? {
        error!("avast license has expired");
        error!("please get a new one here: https://www.avast.com/linux-server-antivirus");
    }

    let scanner = scanner::setup_scanner(config);
    let mut results = scanner
        .scan(&path, Duration::from_secs(args.timeout))
        .await?;
    results.markdown = markdown_table(&results);

    if let Some(url) = resolve_elasticsearch_url(args.elasticsearch) {
        let sink = storage::setup_sink(config, url).await?;
        let id = correlation_id(&path).await?;
        sink.store(&to_record(&results, &id)).await?;
    }

    if args.table {
        print!("{}", results.markdown);
        return Ok(());
    }

    let json = to_json(&results)?;
    let endpoint = getopt("MALICE_ENDPOINT");
    if args.callback || endpoint.is_some() {
        let endpoint = endpoint.ok_or_else(|| {
            ScanError::MissingInput("MALICE_ENDPOINT must be set to use --callback".to_string())
        })?;
        let proxy = webhook_proxy(args.proxy);
        if args.proxy && proxy.is_none() {
            tracing::warn!("--proxy given but MALICE_PROXY is not set, posting directly");
        }

        let client = WebhookClient::new(endpoint, proxy.as_deref())?;
        let id = correlation_id(&path).await?;
        let body = client.send(&id, json).await?;
        println!("{}", body);
        return Ok(());
    }

    println!("{}", json);
    Ok(())
}

async fn web_service(config: PluginConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    let scanner = scanner::setup_scanner(&config);
    scanner::announce_scanner(scanner.as_ref(), &config.probe_bin).await;
    let port = config.web_port;
    let state = AppState { scanner, config };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        plugin = PLUGIN_NAME,
        category = PLUGIN_CATEGORY,
        "web service listening on port :{}",
        port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
