//! tabsim - Replays browser scenarios against the tab group engine
//!
//! Usage: `tabsim [--memory] <scenario.json>` (see `tabsim --help`)
//!
//! The engine runs over an in-memory browser. Active window records go to the
//! SQLite database in the tabflow config directory, or stay in memory with
//! `--memory`. Once every action has been replayed the active windows are
//! printed as JSON.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use tabflow::{
    Browser, Engine, EngineSettings, InMemoryBrowser, InMemoryWindowStore, Preferences,
    SqliteWindowStore, WindowStore,
};

mod scenario;

use scenario::Simulator;

#[derive(Parser, Debug)]
#[command(name = "tabsim")]
#[command(about = "Replay a browser scenario against the tab group engine")]
#[command(version)]
struct Args {
    /// Scenario file (JSON list of actions)
    scenario: PathBuf,

    /// Keep active window records in memory instead of SQLite
    #[arg(long)]
    memory: bool,
}

fn open_store(settings: &EngineSettings, memory: bool) -> Result<Arc<dyn WindowStore>> {
    if memory {
        return Ok(Arc::new(InMemoryWindowStore::new()));
    }
    let path = config::config_path(&settings.db_file).context("Could not determine config directory")?;
    info!("Using active window database at {}", path.display());
    Ok(Arc::new(SqliteWindowStore::new(&path)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args = Args::parse();
    let actions = scenario::load(&args.scenario)?;
    let preferences = Preferences::load()?;
    let settings = EngineSettings::load()?;
    let store = open_store(&settings, args.memory)?;

    let browser = Arc::new(InMemoryBrowser::new());
    let engine = Engine::new(
        Arc::clone(&browser) as Arc<dyn Browser>,
        store,
        preferences,
        settings,
        Arc::new(|e: &anyhow::Error| error!("Engine suspended: {:#}", e)),
    );
    engine.start(async { Ok(()) });

    let mut simulator = Simulator::new(browser, engine);
    simulator.run(actions).await?;

    let engine = simulator.engine();
    engine.wait_idle().await;
    if engine.is_suspended() {
        bail!("Engine suspended while replaying {}", args.scenario.display());
    }
    let windows = engine.cache().get_all().await?;
    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
