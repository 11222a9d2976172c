//! Binary entrypoint for the meshbridge CLI.
//!
//! Commands:
//! - `run` - run the bridge; stdin carries the pub/sub feed and host writes
//! - `init` - create a starter `config.toml`
//! - `parse <file>` - parse a saved `meshtastic --nodes` output and print it as JSON
//! - `status` - print the nodes and chats in the state snapshot
//!
//! Feed stdin from the broker, e.g.
//! `mosquitto_sub -v -t 'msh/+/2/json/#' | meshbridge run`.
//!
//! See the library crate docs for module-level details: `meshbridge::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use meshbridge::bridge::{parse_feed_line, BridgeServer, FeedEvent};
use meshbridge::config::Config;
use meshbridge::meshtastic::table::parse_nodes;
use meshbridge::storage::StateStore;

#[derive(Parser)]
#[command(name = "meshbridge")]
#[command(about = "Bridge a Meshtastic mesh into a home-automation state tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge, reading feed lines and host writes from stdin
    Run,
    /// Write a default configuration file
    Init,
    /// Parse a saved `meshtastic --nodes` output and print the records as JSON
    Parse {
        /// File holding the CLI output
        file: String,
    },
    /// Show the nodes and chats in the state snapshot
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting meshbridge v{}", env!("CARGO_PKG_VERSION"));

            let mut server = BridgeServer::new(config).await?;
            let (tx, rx) = mpsc::unbounded_channel();
            std::thread::spawn(move || read_stdin(tx));

            server.run(rx).await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new meshbridge configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Parse { file } => {
            init_logging(&None, cli.verbose);
            let text = tokio::fs::read_to_string(&file).await?;
            let records: Vec<_> = parse_nodes(&text).collect();
            info!("Parsed {} node record(s) from {}", records.len(), file);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = StateStore::open(&config.storage.state_file);
            let runner = std::sync::Arc::new(meshbridge::meshtastic::CliRunner::new(
                config.device.cli_path.clone(),
                config.device.cli_timeout(),
            ));
            let server = BridgeServer::with_runner(config, runner, store)?;
            server.show_status();
        }
    }

    Ok(())
}

/// Forward stdin lines to the bridge loop until EOF.
///
/// Runs on a plain thread so a blocked read never holds up runtime shutdown.
fn read_stdin(tx: mpsc::UnboundedSender<FeedEvent>) {
    use std::io::BufRead;
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if let Some(event) = parse_feed_line(&line) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("stdin read error: {}", e);
                return;
            }
        }
    }
    debug!("stdin closed");
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides the configured level
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
