mod auth;
mod config;
mod error;
mod job;
mod models;
mod routes;
mod time;
mod video_processor;
mod youtube;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::AccessGate;
use config::AppConfig;
use job::{TrimJobRunner, TrimRequest};
use routes::{cors_layer, create_routes, AppState};
use time::{format_seconds, parse_time};
use video_processor::CommandLineTools;

/// Keeps CLI outputs apart from server artifacts in a shared directory.
const CLI_ARTIFACT_SUFFIX: &str = "_trimmed";

#[derive(Parser, Debug)]
#[command(name = "yttrim", version, about = "Cut a time range out of a YouTube video")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web API
    Serve,
    /// Download and trim one video, then exit
    Trim(TrimArgs),
}

#[derive(Args, Debug)]
struct TrimArgs {
    /// YouTube URL (watch page or youtu.be link)
    #[arg(short, long)]
    url: String,

    /// Start time (SS, MM:SS or HH:MM:SS)
    #[arg(short, long)]
    start: String,

    /// End time (SS, MM:SS or HH:MM:SS)
    #[arg(short, long)]
    end: String,

    /// Directory the clip is written to
    #[arg(short, long, env = "OUTPUT_DIR", default_value = "downloads")]
    output_dir: PathBuf,

    #[arg(long, env = "YTDLP_BIN", default_value = "yt-dlp")]
    ytdlp: PathBuf,

    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Trim(args) => {
            init_tracing(false);
            trim_once(args).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yttrim=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.json_logs);

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    let tools = Arc::new(CommandLineTools::new(&config.ytdlp_bin, &config.ffmpeg_bin));
    let state = AppState {
        gate: Arc::new(AccessGate::new(&config.secret_key, &config.login_password)),
        runner: TrimJobRunner::new(tools, &config.output_dir),
    };
    let runner = state.runner.clone();

    let app = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.cors_origin)?),
    );

    let addr = config.bind_addr()?;
    tracing::info!("Youtube trim server listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No cancellation: a running trim is allowed to finish.
    runner.join_in_flight().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

async fn trim_once(args: TrimArgs) -> anyhow::Result<()> {
    let start = parse_time(&args.start)?;
    let end = parse_time(&args.end)?;
    let request = TrimRequest::new(&args.url, start, end)?;

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;

    tracing::info!(
        url = %request.source_url(),
        start = %format_seconds(start),
        end = %format_seconds(end),
        "Trimming"
    );

    let tools = Arc::new(CommandLineTools::new(args.ytdlp, args.ffmpeg));
    let runner = TrimJobRunner::new(tools, &args.output_dir)
        .keep_previous_artifacts()
        .artifact_suffix(CLI_ARTIFACT_SUFFIX);
    let outcome = runner.run(request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Done! Saved to: {}", outcome.artifact_path.display());
    }
    Ok(())
}
