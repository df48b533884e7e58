use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use streamfeed_session::{Feature, DEFAULT_CHUNK_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod replay;
pub mod serve;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a file or named pipe to an endpoint and collect responses.
    Stream(StreamArgs),
    /// Print the records of a persisted response file.
    Replay(ReplayArgs),
    /// Run the reference exchange server on a Unix socket.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Stream(args) => stream::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Socket path of the exchange endpoint.
    #[arg(long, env = "STREAMFEED_ENDPOINT")]
    pub endpoint: PathBuf,
    /// Inference feature requested in the configuration message.
    #[arg(long, default_value = "shot_change_detection")]
    pub feature: Feature,
    /// Input file or named pipe.
    #[arg(long)]
    pub source: PathBuf,
    /// Treat the source as a named pipe and poll it until the writer hangs up.
    #[arg(long)]
    pub pipe: bool,
    /// Also write every sent chunk to this file.
    #[arg(long, value_name = "FILE")]
    pub mirror: Option<PathBuf>,
    /// Persist responses without an error flag as length-prefixed records.
    #[arg(long, value_name = "FILE")]
    pub persist: Option<PathBuf>,
    /// Deadline for the whole exchange (e.g. 10800s, 500ms).
    #[arg(long, default_value = "10800s")]
    pub timeout: String,
    /// Maximum bytes per content message.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Stationary-camera hint (label detection only).
    #[arg(long)]
    pub stationary_camera: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Record file written by `stream --persist`.
    pub path: PathBuf,
    /// Reject records of this many bytes or more.
    #[arg(long)]
    pub max_record_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Chunks larger than this get an error-flagged response.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub max_chunk: usize,
    /// Exit after answering N exchanges.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
