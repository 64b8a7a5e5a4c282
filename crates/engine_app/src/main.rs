//! # engine_app: collection runner
//!
//! Loads a root collection from a resource directory and ticks it at a fixed
//! rate.
//!
//! ## Startup Sequence
//!
//! 1. Read the optional JSON config and build the [`GamesysContext`] over the
//!    resource directory.
//! 2. Instantiate the root collection.
//! 3. Post `async_load` to every `--load` proxy; each proxy is enabled when
//!    its `proxy_loaded` notification arrives.
//! 4. Run the frame loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use engine_gamesys::{FrameLoop, GameCollection, GamesysConfig, GamesysContext, TickConfig};
use engine_message::{Message, Url, ids};
use engine_resource::{DefaultPreloaderFactory, DirSource};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "collection_runner", about = "Load a collection and tick it at a fixed rate")]
struct Args {
    /// Directory containing the compiled resources
    #[arg(short, long, default_value = "build")]
    root: PathBuf,

    /// Resource path of the root collection
    #[arg(short, long, default_value = "/main.collectionc")]
    collection: String,

    /// Number of frames to run (0 = unlimited)
    #[arg(short, long, default_value_t = 0)]
    ticks: u64,

    /// Frames per second
    #[arg(long, default_value_t = 60.0)]
    rate: f64,

    /// JSON file with capacities and the preload budget
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read resource bytes on background worker threads
    #[arg(long = "async")]
    background: bool,

    /// Proxy to load and enable once running, as `/instance#component`
    #[arg(long = "load")]
    load: Vec<String>,
}

/// Split `/instance#component` into its two ids.
fn parse_component(address: &str) -> Result<(&str, &str)> {
    match address.split_once('#') {
        Some((instance, component)) if !instance.is_empty() && !component.is_empty() => {
            Ok((instance, component))
        }
        _ => bail!("invalid component address '{address}', expected /instance#component"),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GamesysConfig> {
    let Some(path) = path else {
        return Ok(GamesysConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    GamesysConfig::from_json(&json).with_context(|| format!("parsing config file {}", path.display()))
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("engine_app=info".parse()?)
                .add_directive("engine_gamesys=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !args.root.is_dir() {
        bail!("resource directory not found: {}", args.root.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the worker runtime")?;

    let config = load_config(args.config.as_ref())?;
    info!(root = %args.root.display(), ?config, "collection runner starting");
    let mut ctx = GamesysContext::new(Arc::new(DirSource::new(&args.root)), config);
    if args.background {
        ctx = ctx.with_preloaders(Arc::new(DefaultPreloaderFactory::background(
            runtime.handle().clone(),
        )));
    }

    let collection = GameCollection::new(ctx.clone(), &args.collection)
        .with_context(|| format!("loading {}", args.collection))?;
    let socket = collection.socket();

    // Notifications for the runner's own requests arrive on this socket.
    let runner_socket = ctx.bus.new_socket("collection_runner")?;
    let runner = Url::socket_only(runner_socket);
    for address in &args.load {
        let (instance, component) = parse_component(address)?;
        let proxy = collection.component_url(instance, component);
        if collection.proxies().find(&proxy).is_none() {
            bail!("no collection proxy at {address}");
        }
        ctx.bus.post(Message::new(runner, proxy, ids::ASYNC_LOAD))?;
        info!(proxy = address, "async load requested");
    }

    let tick = TickConfig {
        tick_rate: args.rate,
        max_ticks: args.ticks,
    };
    let mut frames = FrameLoop::new(tick, Box::new(collection));
    let bus = Arc::clone(&ctx.bus);
    frames.run_with(|frame| {
        for message in bus.drain(runner_socket) {
            if message.is(ids::PROXY_LOADED) {
                info!(frame, proxy = %message.sender, "proxy loaded, enabling");
                if let Err(error) = bus.post(Message::new(runner, message.sender, ids::ENABLE)) {
                    warn!(%error, "enable could not be posted");
                }
            } else {
                debug!(frame, message = message.display_name(), "runner notification");
            }
        }
    });

    drop(frames.finish());
    bus.delete_socket(runner_socket);
    info!(
        %socket,
        resources = ctx.resources.resource_count(),
        "collection runner shut down"
    );
    Ok(())
}
