/*!
 * notaryd - command line entry point for the notary daemon
 */

use clap::{Parser, Subcommand};
use futures::StreamExt;
use notary::{
    cli_style::{self, drain_table, health_table, print_error, print_info, print_success},
    config::{LogLevel, NotaryConfig},
    error::{NotaryError, Result, EXIT_PARTIAL, EXIT_SUCCESS},
    logging, DrainScheduler, NotaryService,
};
use notary_connect::{DrainOutcome, EventStream};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "notaryd")]
#[command(version, about = "Sign spans, keep them in a durable outbox and deliver them to the ledger", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the outbox on a timer until Ctrl-C
    Run,

    /// Sign and queue a span read from a JSON file ("-" for stdin)
    Enqueue {
        file: PathBuf,
    },

    /// Show service health
    Health {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },

    /// Show how many spans are waiting for delivery
    Status,

    /// Upload due spans now
    Drain,

    /// Register this device with the ledger
    Enroll {
        /// Stable fingerprint identifying this machine
        #[arg(long)]
        fingerprint: String,
    },

    /// Store a policy document read from a JSON file ("-" for stdin)
    SetPolicy {
        file: PathBuf,
    },

    /// Download a named manifest
    Manifest {
        name: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print timeline events as they arrive
    Events {
        /// Query parameter as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write a default configuration file
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            let hint = match e {
                NotaryError::NotEnrolled => Some("run `notaryd enroll --fingerprint <id>`"),
                NotaryError::Config(_) => Some("check the file passed with --config"),
                _ => None,
            };
            print_error(&e.to_string(), hint);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        init_config(path, *force)?;
        return Ok(EXIT_SUCCESS);
    }

    let mut config = NotaryConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.verbose = true;
        config.log_level = LogLevel::Debug;
    }

    if let Err(e) = logging::init_logging(&config) {
        cli_style::print_warning(&format!("Failed to initialize logging: {}", e));
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| NotaryError::Other(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(async move {
        let service = Arc::new(NotaryService::open(&config).await?);
        handle_command(cli.command, service, &config).await
    })
}

async fn handle_command(
    command: Commands,
    service: Arc<NotaryService>,
    config: &NotaryConfig,
) -> Result<i32> {
    match command {
        Commands::Run => {
            let scheduler = DrainScheduler::new(service.clone(), config.drain_interval());
            let token = scheduler.cancellation_token();
            let handle = scheduler.spawn();

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| NotaryError::Other(format!("Cannot listen for Ctrl-C: {}", e)))?;
            info!("Received shutdown signal");

            token.cancel();
            handle
                .await
                .map_err(|e| NotaryError::Other(format!("Scheduler task failed: {}", e)))?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Enqueue { file } => {
            let bytes = read_input(&file)?;
            let reply = service.enqueue_span(&bytes).await;
            match reply.error {
                None => {
                    print_success("Span signed and queued");
                    Ok(EXIT_SUCCESS)
                }
                Some(error) => Err(NotaryError::Other(error)),
            }
        }

        Commands::Health { json } => {
            let health = service.health().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("{}", health_table(&health));
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Status => {
            let pending = service.outbox_status().await?;
            print_info(&format!("{} span(s) waiting for delivery", pending));
            Ok(EXIT_SUCCESS)
        }

        Commands::Drain => match service.drain_now().await? {
            DrainOutcome::AlreadyRunning => {
                print_info("A drain is already running");
                Ok(EXIT_SUCCESS)
            }
            DrainOutcome::Completed(report) => {
                println!("{}", drain_table(&report));
                if report.succeeded() {
                    Ok(EXIT_SUCCESS)
                } else {
                    Ok(EXIT_PARTIAL)
                }
            }
        },

        Commands::Enroll { fingerprint } => {
            let reply = service.enroll(&fingerprint).await;
            match reply.error {
                None => {
                    let health = service.health().await;
                    print_success(&format!("Enrolled as device {}", health.device_id));
                    Ok(EXIT_SUCCESS)
                }
                Some(error) => Err(NotaryError::Other(error)),
            }
        }

        Commands::SetPolicy { file } => {
            let bytes = read_input(&file)?;
            if service.set_policy(&bytes).await {
                print_success("Policy stored");
                Ok(EXIT_SUCCESS)
            } else {
                Err(NotaryError::InvalidInput(
                    "policy must be a valid JSON document".to_string(),
                ))
            }
        }

        Commands::Manifest { name, output } => {
            let bytes = service.fetch_manifest(&name).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)?;
                    print_success(&format!("Wrote {} bytes to {}", bytes.len(), path.display()));
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Events { params, limit } => {
            let pairs = parse_params(&params)?;
            let borrowed: Vec<(&str, &str)> = pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let stream = service.stream_events(&borrowed).await?;
            print_events(stream, limit).await
        }

        Commands::InitConfig { .. } => Ok(EXIT_SUCCESS),
    }
}

async fn print_events(mut stream: EventStream, limit: Option<usize>) -> Result<i32> {
    let mut seen = 0usize;
    while let Some(event) = stream.next().await {
        println!("{}", event?);
        seen += 1;
        if limit.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    Ok(EXIT_SUCCESS)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(NotaryError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    NotaryConfig::default().to_file(path)?;
    print_success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(path)?)
    }
}

fn parse_params(params: &[String]) -> Result<Vec<(String, String)>> {
    params
        .iter()
        .map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    NotaryError::InvalidInput(format!("expected KEY=VALUE, got '{}'", p))
                })
        })
        .collect()
}
