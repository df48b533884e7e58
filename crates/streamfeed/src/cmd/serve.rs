use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use streamfeed_session::{answer_exchange, ExchangeListener, ServeOptions};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::OutputFormat;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    if args.max_chunk == 0 {
        return Err(CliError::new(USAGE, "--max-chunk must be greater than zero"));
    }
    let listener =
        ExchangeListener::bind(&args.path).map_err(|err| session_error("bind failed", err))?;
    let options = ServeOptions {
        max_chunk: args.max_chunk,
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut answered = 0usize;
    while running.load(Ordering::SeqCst) {
        let exchange = match listener.accept_while(&running, ACCEPT_POLL) {
            Ok(Some(exchange)) => exchange,
            Ok(None) => break,
            Err(err) => return Err(session_error("accept failed", err)),
        };

        match answer_exchange(exchange, &options) {
            Ok(summary) => info!(
                chunks = summary.chunks,
                bytes = summary.bytes,
                rejected = summary.rejected,
                "exchange answered"
            ),
            Err(err) => warn!(error = %err, "exchange aborted"),
        }

        answered = answered.saturating_add(1);
        if args.count.is_some_and(|count| answered >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
