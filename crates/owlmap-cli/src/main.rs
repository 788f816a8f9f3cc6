//! OWL Map CLI
//!
//! Terminal front end for the map engine:
//! - Loading a viewport and listing what is linked, unlinked or orphaned
//! - Opening the detail panel for one item (tags + ranked candidates)
//! - Free-text place search

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use owlmap_engine::{
    BackendConfig, BoundingBox, EngineConfig, EntityId, HttpBackend, MapSession,
};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod report;

#[derive(Parser)]
#[command(name = "owlmap")]
#[command(
    author,
    version,
    about = "OWL Map: link Wikidata items to OpenStreetMap objects"
)]
struct Cli {
    /// Base URL of the map service
    #[arg(long, env = "OWLMAP_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "OWLMAP_TIMEOUT_SECS", default_value_t = BackendConfig::DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "OWLMAP_USER_AGENT", global = true)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a viewport and list the items in it.
    Load {
        /// Viewport as west,south,east,north (default: Great Britain)
        #[arg(long)]
        bounds: Option<String>,

        /// Show only items of this type (QID)
        #[arg(long)]
        only: Option<String>,

        /// Hide items already linked to an OSM object
        #[arg(long)]
        hide_linked: bool,

        /// Hide items no OSM object references
        #[arg(long)]
        hide_unlinked: bool,

        /// Skip looking up items referenced only from OSM
        #[arg(long)]
        no_resolve: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show tags and nearby match candidates for one item.
    Detail {
        /// Item id, e.g. Q1137217
        qid: String,

        /// Viewport to load first, as west,south,east,north
        #[arg(long)]
        bounds: String,

        #[arg(long)]
        json: bool,
    },

    /// Search for a place by name.
    Search {
        #[arg(required = true)]
        text: Vec<String>,

        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("owlmap=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_bounds(raw: &str) -> Result<BoundingBox> {
    BoundingBox::parse(raw)
        .ok_or_else(|| anyhow!("invalid bounds `{raw}`: expected west,south,east,north"))
}

fn backend_config(cli: &Cli) -> Result<BackendConfig> {
    let base_url = cli
        .base_url
        .as_deref()
        .ok_or_else(|| anyhow!("no map service configured: pass --base-url or set OWLMAP_BASE_URL"))?;
    let mut config = BackendConfig::new(base_url)?.with_timeout_secs(cli.timeout);
    if let Some(agent) = &cli.user_agent {
        config = config.with_user_agent(agent);
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let backend = HttpBackend::new(backend_config(&cli)?).context("building HTTP client")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { run(cli.command, backend).await })
}

async fn run(command: Commands, backend: HttpBackend) -> Result<()> {
    match command {
        Commands::Load {
            bounds,
            only,
            hide_linked,
            hide_unlinked,
            no_resolve,
            json,
        } => {
            let config = EngineConfig {
                resolve_missing: !no_resolve,
                ..EngineConfig::default()
            };
            let bounds = match bounds {
                Some(raw) => parse_bounds(&raw)?,
                None => config.default_bounds,
            };
            debug!(bounds = %bounds.to_bbox_string(), "load command");
            let session = MapSession::new(Arc::new(backend), config);

            let load = session.load_viewport(bounds).await;
            if let Some(type_id) = only {
                session.select_only_type(type_id);
            }
            if hide_linked {
                session.set_show_linked(false);
            }
            if hide_unlinked {
                session.set_show_unlinked(false);
            }

            let view = report::LoadView::capture(&session, load);
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                report::print_load(&view);
            }
        }

        Commands::Detail { qid, bounds, json } => {
            let bounds = parse_bounds(&bounds)?;
            let session = MapSession::new(Arc::new(backend), EngineConfig::default());
            let load = session.load_viewport(bounds).await;
            for failure in &load.failures {
                eprintln!("{} {failure}", "warning:".yellow().bold());
            }

            let id = EntityId::new(qid);
            let state = session
                .open_detail(id.clone())
                .await
                .with_context(|| format!("opening {id}"))?;
            let entity = session.read(|engine| engine.entity(&id).cloned());

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                report::print_detail(&state, entity.as_ref());
            }
        }

        Commands::Search { text, json } => {
            let query = text.join(" ");
            let config = EngineConfig::default();
            let zoom = config.detail_zoom;
            let session = MapSession::new(Arc::new(backend), config);
            let hits = session
                .search(&query)
                .await
                .with_context(|| format!("searching for `{query}`"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                report::print_hits(&query, &hits, zoom);
            }
        }
    }
    Ok(())
}
