//! `comreg` binary.
//!
//! Opens a file-backed registry and runs one maintenance command against it:
//! - autoregister a components directory
//! - list registered classes and recorded modules
//! - look up a class by CID or contract id
//! - unregister a class or forget a module record

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use comreg_registry::{Cid, ComponentManager, Location, ManagerConfig, When};
use comreg_store::FileStore;
use tracing::{debug, info};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "comreg")]
#[command(about = "Inspect and maintain a component registry")]
struct Args {
	/// Registry file (defaults to the configured store, then the data directory)
	#[arg(short, long, value_name = "PATH")]
	store: Option<PathBuf>,

	/// Configuration file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Register every module found under a directory
	Autoreg {
		/// Directory to sweep (defaults to the configured components directory)
		dir: Option<PathBuf>,
	},
	/// List registered classes
	List {
		/// List recorded modules instead
		#[arg(long)]
		modules: bool,
	},
	/// Show the registration of a CID or contract id
	Lookup { id: String },
	/// Remove a persisted class registration
	Unregister {
		cid: String,
		/// Encoded location, e.g. `rel:libwidget.so`
		location: String,
	},
	/// Drop the autoregistration record of a module
	ForgetModule { location: String },
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config_path = args.config.clone().unwrap_or_else(default_config_path);
	let config = ManagerConfig::load(&config_path)?;
	let store_path = args
		.store
		.clone()
		.or_else(|| config.store_path.clone())
		.unwrap_or_else(default_store_path);
	debug!(config = %config_path.display(), store = %store_path.display(), "opening registry");

	let store = Arc::new(FileStore::open(&store_path).with_context(|| format!("opening {}", store_path.display()))?);
	let manager = ComponentManager::new(store, config);
	manager.init()?;

	let result = run(&manager, args.command);
	manager.shutdown()?;
	result
}

fn run(manager: &ComponentManager, command: Command) -> anyhow::Result<()> {
	match command {
		Command::Autoreg { dir } => {
			let summary = manager.auto_register(When::Startup, dir.as_deref())?;
			info!(registered = summary.registered, passes = summary.deferred_passes, "autoregistration finished");
			println!(
				"registered {} module(s) from {} ({} deferred pass(es))",
				summary.registered,
				manager.components_dir().display(),
				summary.deferred_passes
			);
		}
		Command::List { modules: false } => {
			for cid in manager.enumerate_cids()? {
				print_class(manager, &cid)?;
			}
		}
		Command::List { modules: true } => {
			for module in manager.records().modules()? {
				match module.stamp {
					Some(stamp) => println!(
						"{}\t{} component(s)\tmodified={} size={}",
						module.location, module.components, stamp.modified_ms, stamp.size
					),
					None => println!("{}\t{} component(s)", module.location, module.components),
				}
			}
		}
		Command::Lookup { id } => {
			let cid = match Cid::parse(&id) {
				Ok(cid) => cid,
				Err(_) => manager
					.contract_id_to_cid(&id)
					.with_context(|| format!("no class registered for {id}"))?,
			};
			print_class(manager, &cid)?;
		}
		Command::Unregister { cid, location } => {
			let cid = Cid::parse(&cid)?;
			let location = Location::parse(&location)?;
			manager.unregister_component(&cid, &location)?;
			println!("unregistered {cid}");
		}
		Command::ForgetModule { location } => {
			let location = Location::parse(&location)?;
			if !manager.records().forget_module(&location)? {
				anyhow::bail!("no module recorded at {location}");
			}
			println!("forgot {location}");
		}
	}
	Ok(())
}

fn print_class(manager: &ComponentManager, cid: &Cid) -> anyhow::Result<()> {
	let info = manager.cid_to_contract_id(cid)?;
	let stored = manager.records().read_class(cid)?;
	let class_name = info.class_name.as_deref().unwrap_or("-");
	let contract = info.contract_id.as_ref().map_or("-", |c| c.as_str());
	match stored {
		Some(stored) => println!("{cid}\t{class_name}\t{contract}\t{} ({})", stored.location, stored.kind),
		None => println!("{cid}\t{class_name}\t{contract}\t(in memory)"),
	}
	Ok(())
}

fn config_dir() -> PathBuf {
	dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("comreg")
}

fn default_config_path() -> PathBuf {
	config_dir().join("config.toml")
}

fn default_store_path() -> PathBuf {
	dirs::data_dir()
		.map(|dir| dir.join("comreg"))
		.unwrap_or_else(config_dir)
		.join("registry.bin")
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("comreg=trace,debug")
			} else {
				EnvFilter::new("warn")
			}
		})
	};

	if let Some(log_dir) = std::env::var("COMREG_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("comreg.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			info!(path = %log_path.display(), "tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}
