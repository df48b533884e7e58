use std::fs::File;
use std::io::BufReader;

use streamfeed_frame::{RecordConfig, RecordReader};
use tracing::debug;

use crate::cmd::ReplayArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{OutputFormat, RecordPrinter};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = RecordConfig::default();
    if let Some(max) = args.max_record_size {
        if max == 0 {
            return Err(CliError::new(USAGE, "--max-record-size must be greater than zero"));
        }
        config.max_record_size = max;
    }

    let file = File::open(&args.path).map_err(|err| io_error("open record file failed", err))?;
    let mut reader = RecordReader::with_config(BufReader::new(file), config);
    let mut printer = RecordPrinter::new(format);

    let mut index = 0u64;
    let outcome = loop {
        match reader.read_record() {
            Ok(Some(payload)) => {
                printer.print(index, &payload);
                index += 1;
            }
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    printer.finish();

    match outcome {
        Ok(()) => {
            debug!(records = index, path = ?args.path, "replay complete");
            Ok(SUCCESS)
        }
        Err(err) => Err(frame_error(
            &format!("replay failed after {index} records"),
            err,
        )),
    }
}
