use crate::exporters::EventSink;
use crate::exporters::blackhole::BlackholeSink;
use crate::exporters::stdout::{StdoutFormat, StdoutSink};
use crate::receivers::container_logs::ContainerLogsConfig;
use crate::receivers::container_logs::config::DEFAULT_LOG_DIR;
use crate::receivers::container_logs::watcher::WatchMode;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    #[command(flatten)]
    pub container_logs: ContainerLogsArgs,

    /// Exporter
    #[arg(value_enum, long, env = "PODTAIL_EXPORTER", default_value = "stdout")]
    pub exporter: Exporter,

    /// Line format of the stdout exporter
    #[arg(
        value_enum,
        long,
        env = "PODTAIL_STDOUT_FORMAT",
        default_value = "text"
    )]
    pub stdout_format: StdoutFormatArg,

    /// How long to wait for tailers to drain on shutdown
    #[arg(long, env = "PODTAIL_SHUTDOWN_TIMEOUT_MS", default_value = "5000")]
    pub shutdown_timeout_ms: u64,
}

impl AgentRun {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Agent logs go to stderr when shipped entries own stdout.
    pub fn logs_to_stderr(&self) -> bool {
        self.exporter == Exporter::Stdout
    }

    pub fn build_sink(&self) -> Arc<dyn EventSink> {
        match self.exporter {
            Exporter::Stdout => Arc::new(StdoutSink::new(self.stdout_format.into())),
            Exporter::Blackhole => Arc::new(BlackholeSink::new()),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ContainerLogsArgs {
    /// Directory containing the container runtime's log files
    #[arg(long, env = "PODTAIL_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// How file changes are detected
    #[arg(value_enum, long, env = "PODTAIL_WATCH_MODE", default_value = "auto")]
    pub watch_mode: WatchModeArg,

    /// Poll interval in milliseconds
    #[arg(long, env = "PODTAIL_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Capacity of each tailer's entry queue
    #[arg(long, env = "PODTAIL_QUEUE_SIZE", default_value = "4096")]
    pub queue_size: usize,
}

impl ContainerLogsArgs {
    pub fn build_config(&self) -> Result<ContainerLogsConfig, String> {
        let config = ContainerLogsConfig {
            log_dir: self.log_dir.clone(),
            watch_mode: self.watch_mode.into(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_size: self.queue_size,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Exporter {
    Stdout,
    Blackhole,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum WatchModeArg {
    Auto,
    Native,
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(value: WatchModeArg) -> Self {
        match value {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum StdoutFormatArg {
    Text,
    Json,
}

impl From<StdoutFormatArg> for StdoutFormat {
    fn from(value: StdoutFormatArg) -> Self {
        match value {
            StdoutFormatArg::Text => StdoutFormat::Text,
            StdoutFormatArg::Json => StdoutFormat::Json,
        }
    }
}
