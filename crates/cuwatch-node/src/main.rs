//! CUWatch node
//!
//! Host runtime for a muon detector node. Runs the acquisition loop against a
//! simulated front end, writes one CSV file per run, and streams telemetry as
//! JSON lines on stdout.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults, control messages on stdin
//! cuwatch run
//!
//! # Config file, explicit data directory and device number
//! cuwatch run --config node.json --data-dir /var/lib/cuwatch --device-id 3
//!
//! # Read control messages from a FIFO instead of stdin
//! cuwatch run --control /run/cuwatch/control
//!
//! # Make this node a follower from the next run on
//! cuwatch role follower
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::BufReader;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cuwatch_core::Role;
use cuwatch_node::role::RoleStore;
use cuwatch_node::{control, runtime, Node, NodeConfig};

/// CUWatch detector node
#[derive(Parser, Debug)]
#[command(name = "cuwatch")]
#[command(author, version, about = "CUWatch muon detector node", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the acquisition loop
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Data directory (overrides the config file)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Device number used in topic names
        #[arg(long)]
        device_id: Option<u16>,

        /// Use the simulated front end
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        simulate: bool,

        /// Read control messages from this FIFO instead of stdin
        #[arg(long)]
        control: Option<PathBuf>,
    },

    /// Set the role used from the next run on
    Role {
        /// New role
        role: RoleArg,

        /// Data directory holding the role marker
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Leader,
    Follower,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Leader => Role::Leader,
            RoleArg::Follower => Role::Follower,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries telemetry, so logs go to stderr
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("CUWatch node v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { config, data_dir, device_id, simulate, control } => {
            let mut node_config = NodeConfig::load(config.as_deref())?;
            if let Some(dir) = data_dir {
                node_config.data_dir = dir;
            }
            if device_id.is_some() {
                node_config.device_id = device_id;
            }
            if !simulate {
                anyhow::bail!("The hardware front end is only available in the embedded build; use --simulate");
            }
            run_node(node_config, control)
        }
        Commands::Role { role, data_dir } => {
            RoleStore::new(&data_dir).persist(role.into())?;
            Ok(())
        }
    }
}

/// Run the node on a current-thread runtime until it stops.
fn run_node(config: NodeConfig, control_path: Option<PathBuf>) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&rt, async move {
        let node = Node::new(config.clone())?;
        info!("Device {:03}, data in {}", node.device_id(), config.data_dir.display());

        tokio::task::spawn_local(runtime::watch_interrupt(node.switch()));

        let (handle, intake) = control::channel(config.control_queue);
        tokio::task::spawn_local(async move {
            let read = match control_path {
                Some(path) => match tokio::fs::File::open(&path).await {
                    Ok(file) => control::read_commands(BufReader::new(file), handle).await,
                    Err(e) => {
                        warn!("Cannot open control FIFO {}: {}", path.display(), e);
                        return;
                    }
                },
                None => control::read_commands(BufReader::new(tokio::io::stdin()), handle).await,
            };
            match read {
                Ok(accepted) => info!("Control input closed after {} accepted commands", accepted),
                Err(e) => warn!("Control input failed: {}", e),
            }
        });

        let report = node.run(intake, tokio::io::stdout()).await?;
        info!(
            "Stopped ({}) after {} run(s); last run {} muons, {} messages published, files: {:?}",
            report.last.reason, report.runs, report.last.muon_count, report.published, report.files
        );
        anyhow::Ok(())
    });

    // A blocked stdin read must not hold up exit
    drop(local);
    rt.shutdown_background();
    result
}
