// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use podtail::init::agent::Agent;
use podtail::init::args::AgentRun;
use podtail::init::wait;

/// Slack on top of the agent's own shutdown timeout
const SHUTDOWN_GRACE_MILLIS: u64 = 1_000;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run agent
    Start(Box<AgentRun>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "podtail")]
#[command(bin_name = "podtail")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "PODTAIL_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(agent)) => {
            let _guard = match setup_logging(&opt.log_format, agent.logs_to_stderr()) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            match run_agent(agent) {
                Ok(_) => {}
                Err(e) => {
                    error!(error = e, "Failed to run agent.");
                    return ExitCode::from(1);
                }
            }
        }
        _ => {
            // it shouldn't be possible to get here since we mark a subcommand as
            // required
            eprintln!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_agent(agent_args: Box<AgentRun>) -> Result<(), BoxError> {
    let config = agent_args.container_logs.build_config()?;
    let shutdown_timeout = agent_args.shutdown_timeout();

    let mut agent_join_set = JoinSet::new();
    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        let agent = Agent::new(config, agent_args.build_sink())
            .with_shutdown_timeout(shutdown_timeout);
        agent_join_set.spawn(async move { agent.run(token).await });
    };

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;
    select! {
        _ = sig_term.recv() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        _ = sig_int.recv() => {
            info!("Interrupt received.");
            cancel_token.cancel();
        },
        e = wait::wait_for_any_task(&mut agent_join_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of agent."),
                Err(e) => return Err(e),
            }
        },
    }

    wait::wait_for_tasks_with_timeout(
        &mut agent_join_set,
        shutdown_timeout + std::time::Duration::from_millis(SHUTDOWN_GRACE_MILLIS),
    )
    .await?;

    info!("exited");
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg, to_stderr: bool) -> Result<LoggerGuard, BoxError> {
    use std::io::{self, IsTerminal};

    LogTracer::init()?;

    let (non_blocking_writer, guard, is_terminal) = if to_stderr {
        let (writer, guard) = tracing_appender::non_blocking(io::stderr());
        (writer, guard, io::stderr().is_terminal())
    } else {
        let (writer, guard) = tracing_appender::non_blocking(io::stdout());
        (writer, guard, io::stdout().is_terminal())
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("notify=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Skip color codes when not in a terminal
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(is_terminal)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
