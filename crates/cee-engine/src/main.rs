//! # cee
//!
//! Cognitive enterprise engine binary: wires settings, collaborators, agents,
//! and the HTTP server together, plus a few operator commands.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cee_agents::{AgentDeps, default_capabilities};
use cee_core::logging::{LogFormat, init_subscriber};
use cee_embeddings::{
    EmbeddingService, InMemoryVectorIndex, MockEmbeddingService, QdrantClient, QdrantConfig,
    VectorSearch,
};
use cee_runtime::EngineBuilder;
use cee_runtime::audit::open_sink;
use cee_server::{CeeServer, TokenService};
use cee_settings::loader::cee_home;
use cee_settings::{CeeSettings, init_settings, load_settings, load_settings_from_path};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Cognitive enterprise engine.
#[derive(Parser, Debug)]
#[command(name = "cee", about = "Cognitive enterprise engine", version)]
struct Cli {
    /// Settings file (defaults to `$CEE_SETTINGS` or `~/.cee/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides settings, 0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Search an empty in-process index instead of Qdrant.
        #[arg(long)]
        offline: bool,
        /// Do not install the Prometheus recorder.
        #[arg(long)]
        no_metrics: bool,
    },
    /// Print the mode a question would be routed to.
    Classify {
        /// Question text.
        text: String,
    },
    /// Mint a development bearer token.
    Token {
        /// Subject (user id).
        #[arg(long)]
        user: String,
        /// Role claim.
        #[arg(long, default_value = "analyst")]
        role: String,
    },
}

fn load(path: Option<&PathBuf>) -> Result<CeeSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

fn search_backend(settings: &CeeSettings, offline: bool) -> Result<Arc<dyn VectorSearch>> {
    let collab = &settings.collaborators;
    if offline {
        info!("using in-process vector index");
        return Ok(Arc::new(InMemoryVectorIndex::new(collab.embedding_dimensions)));
    }
    let client = QdrantClient::new(QdrantConfig {
        url: collab.qdrant_url.clone(),
        collection: collab.qdrant_collection.clone(),
        api_key: collab.qdrant_api_key.clone(),
        timeout: Duration::from_millis(collab.request_timeout_ms),
    })
    .context("Failed to build Qdrant client")?;
    info!(url = %collab.qdrant_url, collection = %collab.qdrant_collection, "using qdrant");
    Ok(Arc::new(client))
}

async fn serve(
    mut settings: CeeSettings,
    host: Option<String>,
    port: Option<u16>,
    offline: bool,
    no_metrics: bool,
) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    let settings = init_settings(settings);

    let metrics = if no_metrics {
        None
    } else {
        Some(cee_server::metrics::install_recorder().context("Failed to install metrics recorder")?)
    };

    let home = cee_home();
    std::fs::create_dir_all(&home)
        .with_context(|| format!("Failed to create directory: {}", home.display()))?;
    let sink = open_sink(&settings.audit, &home).context("Failed to open audit sink")?;

    let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(
        settings.collaborators.embedding_dimensions,
    ));
    let deps = AgentDeps {
        embedder,
        search: search_backend(&settings, offline)?,
        top_k: settings.collaborators.search_top_k,
    };

    let engine = EngineBuilder::from_settings(&settings)
        .audit_sink(sink)
        .capabilities(default_capabilities(&deps).context("Failed to register agents")?)
        .build()
        .context("Failed to build engine")?;
    let engine = Arc::new(engine);
    info!(modes = ?engine.health().modes, "engine ready");

    let tokens = TokenService::from_settings(&settings.auth)
        .context("Invalid auth settings")?
        .map(Arc::new);
    if tokens.is_none() {
        warn!("no JWT secret configured, every request is anonymous and will be denied");
    }

    let listener = tokio::net::TcpListener::bind(settings.server.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr()))?;

    let mut server = CeeServer::new(settings.server.clone(), engine, tokens);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }
    server.shutdown().listen_for_signals();
    server.serve(listener).await.context("Server error")?;
    Ok(())
}

fn classify(settings: &CeeSettings, text: &str) -> Result<()> {
    let engine = EngineBuilder::from_settings(settings)
        .build()
        .context("Failed to build engine")?;
    let mode = engine.classify(text);
    println!("{}", json!({ "mode": mode }));
    Ok(())
}

fn token(settings: &CeeSettings, user: &str, role: &str) -> Result<()> {
    let Some(tokens) = TokenService::from_settings(&settings.auth).context("Invalid auth settings")?
    else {
        bail!("no JWT secret configured; set CEE_JWT_SECRET or auth.jwtSecret");
    };
    println!("{}", tokens.mint(user, role)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.settings.as_ref())?;
    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    match cli.command {
        Command::Serve {
            host,
            port,
            offline,
            no_metrics,
        } => serve(settings, host, port, offline, no_metrics).await,
        Command::Classify { text } => classify(&settings, &text),
        Command::Token { user, role } => token(&settings, &user, &role),
    }
}
