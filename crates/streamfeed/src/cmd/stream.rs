use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use streamfeed_session::{FeatureProcessor, StreamConfig, StreamOrchestrator, UdsChannelFactory};
use streamfeed_transport::{open_source, SourceKind};
use tracing::info;

use crate::cmd::{parse_duration, StreamArgs};
use crate::exit::{io_error, session_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat};

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    let budget = parse_duration(&args.timeout)?;
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let deadline = Instant::now() + budget;

    let kind = if args.pipe {
        SourceKind::Pipe
    } else {
        SourceKind::File
    };
    let mut source = open_source(kind, &args.source)
        .map_err(|err| transport_error("open source failed", err))?;
    info!(path = ?args.source, kind = kind.name(), "source opened");

    let mut mirror = create_sink(args.mirror.as_deref(), "open mirror failed")?;
    let mut persist = create_sink(args.persist.as_deref(), "open persist file failed")?;

    let factory = UdsChannelFactory::new(&args.endpoint);
    let mut orchestrator = StreamOrchestrator::init(&factory, deadline)
        .map_err(|err| session_error("connect failed", err))?;

    let config = StreamConfig::new(args.feature).with_stationary_camera(args.stationary_camera);
    let mut processor = FeatureProcessor::new(args.feature);
    let outcome = orchestrator.run(
        &config,
        &mut *source,
        args.chunk_size,
        mirror.as_mut().map(|sink| sink as &mut dyn Write),
        &mut processor,
        persist.as_mut().map(|sink| sink as &mut (dyn Write + Send)),
    );

    match outcome {
        Ok(report) => {
            print_report(&report, format);
            Ok(SUCCESS)
        }
        Err(err) => {
            if let Some(report) = orchestrator.report() {
                print_report(report, format);
            }
            Err(session_error("exchange failed", err))
        }
    }
}

fn create_sink(path: Option<&Path>, context: &str) -> CliResult<Option<BufWriter<File>>> {
    path.map(|path| File::create(path).map(BufWriter::new))
        .transpose()
        .map_err(|err| io_error(context, err))
}
