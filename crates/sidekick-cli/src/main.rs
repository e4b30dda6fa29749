use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast;

use sidekick_packs::{init_logging, EventRecord, PackFactories, PackManager, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "sidekick", about = "Manage Sidekick extension packs")]
struct Args {
    /// Runtime config file (defaults to ~/.sidekick/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List pack directories under the packs root
    Discover,
    /// Extract a pack archive into the packs root
    Import { archive: PathBuf },
    /// Load a pack and print its features
    Load {
        pack: String,
        /// Also activate every feature of the pack
        #[arg(long)]
        activate: bool,
    },
    /// Verify an order number and activate the pack it licenses
    Verify { order_number: String },
    /// Ask the license service whether a pack is licensed
    Licensed { pack: String },
}

fn print_line(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

fn print_events(rx: &mut broadcast::Receiver<EventRecord>) -> anyhow::Result<()> {
    while let Ok(record) = rx.try_recv() {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::load_default()?,
    };
    init_logging(&config.log_filter);

    let mut manager = PackManager::from_config(&config, PackFactories::with_builtin())?;
    let mut rx = manager.events().subscribe();

    let outcome = match args.command {
        Command::Discover => manager
            .discover_packs()
            .map(|packs| json!({ "packsRoot": manager.packs_root(), "packs": packs })),
        Command::Import { archive } => manager
            .import_pack(&archive)
            .map(|imported| json!({ "imported": imported })),
        Command::Load { pack, activate } => {
            let mut result = manager.load_pack(&pack);
            if activate {
                result = result.and_then(|()| manager.activate_pack_features(&pack));
            }
            result.map(|()| json!({ "packs": manager.summaries() }))
        }
        Command::Verify { order_number } => manager
            .verify_and_activate_pack(&order_number)
            .await
            .map(|pack_id| json!({ "activated": pack_id, "packs": manager.summaries() })),
        Command::Licensed { pack } => manager
            .is_pack_licensed(&pack)
            .await
            .map(|licensed| json!({ "pack": pack, "licensed": licensed })),
    };

    print_events(&mut rx)?;
    match outcome {
        Ok(value) => print_line(value),
        Err(e) => {
            let code = e.code().as_str();
            print_line(json!({ "error": { "code": code, "message": e.to_string() } }))?;
            std::process::exit(1);
        }
    }
}
