use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use streamfeed_frame::RecordWriter;
use streamfeed_transport::ByteSource;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelFactory, DuplexChannel, MessageReceiver, MessageSender};
use crate::error::{Result, SessionError};
use crate::message::{FinalStatus, Request, StreamConfig};
use crate::processor::ResponseProcessor;

/// Default content chunk: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default exchange deadline: three hours.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10_800);

/// Tunables for one exchange.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum bytes per content message.
    pub chunk_size: usize,
    /// Time budget for the whole exchange, measured from `init`.
    pub deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// Lifecycle of one exchange.
///
/// `Idle -> ConfigSent -> Streaming -> HalfClosed -> Finished`, or `Failed`
/// from any stage. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    ConfigSent,
    Streaming,
    HalfClosed,
    Finished,
    Failed,
}

/// Counters for a completed (or failed) exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Content messages written, not counting the configuration message.
    pub requests_sent: u64,
    pub bytes_sent: u64,
    pub responses_received: u64,
    pub responses_persisted: u64,
    pub final_status: Option<FinalStatus>,
}

/// Drives one duplex exchange over a channel obtained from a [`ChannelFactory`].
pub struct StreamOrchestrator<C: DuplexChannel> {
    channel: Option<C>,
    state: ExchangeState,
    deadline: Instant,
    report: Option<ExchangeReport>,
}

impl<C: DuplexChannel> StreamOrchestrator<C> {
    /// Establish the channel. Fails if it is not ready before `deadline`.
    pub fn init<F>(factory: &F, deadline: Instant) -> Result<Self>
    where
        F: ChannelFactory<Channel = C>,
    {
        let channel = factory.connect(deadline)?;
        debug!("exchange channel ready");
        Ok(Self::from_channel(channel, deadline))
    }

    /// Establish the channel with the deadline taken from `config`.
    pub fn connect<F>(factory: &F, config: &OrchestratorConfig) -> Result<Self>
    where
        F: ChannelFactory<Channel = C>,
    {
        Self::init(factory, Instant::now() + config.deadline)
    }

    /// Wrap an already-established channel.
    pub fn from_channel(channel: C, deadline: Instant) -> Self {
        Self {
            channel: Some(channel),
            state: ExchangeState::Idle,
            deadline,
            report: None,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Counters from the last `run`, successful or not.
    pub fn report(&self) -> Option<&ExchangeReport> {
        self.report.as_ref()
    }

    /// Run the exchange to completion.
    ///
    /// The configuration message is written first; if that fails nothing else
    /// starts. Then a read task dispatches each response to `processor` (and
    /// to `persist` when the response carries no error) while this thread
    /// writes `source` in chunks of at most `chunk_size` bytes, mirroring them
    /// to `mirror`. Once the source is exhausted or fails, the channel is
    /// half-closed and the read task is joined before the final status is
    /// collected. Every stage is allowed to finish before a failure is
    /// reported.
    pub fn run(
        &mut self,
        config: &StreamConfig,
        source: &mut dyn ByteSource,
        chunk_size: usize,
        mirror: Option<&mut dyn Write>,
        processor: &mut dyn ResponseProcessor,
        persist: Option<&mut (dyn Write + Send)>,
    ) -> Result<ExchangeReport> {
        if self.state != ExchangeState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        let channel = self
            .channel
            .take()
            .ok_or(SessionError::InvalidState(self.state))?;
        if Instant::now() >= self.deadline {
            self.transition(ExchangeState::Failed);
            return Err(SessionError::DeadlineExceeded);
        }

        let (mut sender, mut receiver) = channel.into_split();
        if let Err(err) = sender.send(&Request::Config(config.clone())) {
            error!(error = %err, "failed to send configuration");
            self.transition(ExchangeState::Failed);
            return Err(err);
        }
        self.transition(ExchangeState::ConfigSent);

        let chunk_size = chunk_size.max(1);
        let staged = thread::scope(|scope| -> Result<(WriteOutcome, Result<()>, ReadOutcome)> {
            let receiver = &mut receiver;
            let read_task = thread::Builder::new()
                .name("streamfeed-read".into())
                .spawn_scoped(scope, move || read_responses(receiver, processor, persist))?;
            self.transition(ExchangeState::Streaming);

            let written = write_content(&mut sender, source, chunk_size, mirror);
            let half_close = sender.writes_done();
            self.transition(ExchangeState::HalfClosed);

            let read = read_task.join().unwrap_or_else(|_| ReadOutcome {
                error: Some(SessionError::Exchange("response reader panicked".into())),
                ..ReadOutcome::default()
            });
            Ok((written, half_close, read))
        });
        let (written, half_close, read) = match staged {
            Ok(stages) => stages,
            Err(err) => {
                error!(error = %err, "failed to start response reader");
                self.transition(ExchangeState::Failed);
                return Err(err);
            }
        };

        info!(
            "Sent {} requests consisting of {} bytes",
            written.requests, written.bytes
        );
        info!("Received {} responses", read.received);

        let mut report = ExchangeReport {
            requests_sent: written.requests,
            bytes_sent: written.bytes,
            responses_received: read.received,
            responses_persisted: read.persisted,
            final_status: None,
        };

        let mut failures = Vec::new();
        failures.extend(written.error);
        if let Err(err) = half_close {
            error!(error = %err, "failed to half-close the channel");
            failures.push(err);
        }
        failures.extend(read.error);

        match receiver.finish() {
            Ok(status) => {
                if !status.is_ok() {
                    error!(code = status.code, message = %status.message, "exchange finished with error status");
                    failures.push(SessionError::Status {
                        code: status.code,
                        message: status.message.clone(),
                    });
                }
                report.final_status = Some(status);
            }
            Err(err) => {
                error!(error = %err, "failed to finalize channel");
                failures.push(err);
            }
        }

        self.report = Some(report.clone());
        match combine(failures) {
            None => {
                self.transition(ExchangeState::Finished);
                Ok(report)
            }
            Some(err) => {
                self.transition(ExchangeState::Failed);
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }
}

#[derive(Default)]
struct WriteOutcome {
    requests: u64,
    bytes: u64,
    error: Option<SessionError>,
}

#[derive(Default)]
struct ReadOutcome {
    received: u64,
    persisted: u64,
    error: Option<SessionError>,
}

fn write_content<S: MessageSender>(
    sender: &mut S,
    source: &mut dyn ByteSource,
    chunk_size: usize,
    mut mirror: Option<&mut dyn Write>,
) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = match source.read_bytes(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                error!(error = %err, "byte source failed");
                outcome.error = Some(err.into());
                break;
            }
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        if let Err(err) = sender.send(&Request::Content(chunk)) {
            error!(error = %err, "failed to send content");
            outcome.error = Some(err);
            break;
        }
        let mirrored = match mirror.as_deref_mut() {
            Some(sink) => sink.write_all(&buf[..n]),
            None => Ok(()),
        };
        if let Err(err) = mirrored {
            warn!(error = %err, "mirror sink failed; mirroring stopped");
            mirror = None;
        }
        outcome.requests += 1;
        outcome.bytes += n as u64;
    }

    source.close();
    if let Some(sink) = mirror {
        if let Err(err) = sink.flush() {
            warn!(error = %err, "failed to flush mirror sink");
        }
    }
    outcome
}

fn read_responses<R: MessageReceiver>(
    receiver: &mut R,
    processor: &mut dyn ResponseProcessor,
    persist: Option<&mut (dyn Write + Send)>,
) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    let mut records = persist.map(RecordWriter::new);

    loop {
        let response = match receiver.recv() {
            Ok(Some(response)) => response,
            Ok(None) => break,
            Err(err) => {
                error!(error = %err, "failed to read response");
                outcome.error = Some(err);
                break;
            }
        };
        outcome.received += 1;
        processor.process(&response);

        if let Some(flag) = &response.error {
            warn!(code = flag.code, message = %flag.message, "received an error response");
            continue;
        }
        if let Some(writer) = records.as_mut() {
            match writer.write_json(&response.results) {
                Ok(()) => outcome.persisted += 1,
                Err(err) => {
                    error!(error = %err, "failed to persist response; persistence stopped");
                    outcome.error.get_or_insert(err.into());
                    records = None;
                }
            }
        }
    }

    if let Some(mut writer) = records {
        if let Err(err) = writer.flush() {
            error!(error = %err, "failed to flush persisted responses");
            outcome.error.get_or_insert(err.into());
        }
    }
    outcome
}

fn combine(mut failures: Vec<SessionError>) -> Option<SessionError> {
    if failures.len() <= 1 {
        return failures.pop();
    }
    if let Some(pos) = failures.iter().position(SessionError::is_deadline) {
        return Some(failures.swap_remove(pos));
    }
    let joined: Vec<String> = failures.iter().map(ToString::to_string).collect();
    Some(SessionError::Exchange(joined.join("; ")))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use streamfeed_frame::RecordReader;
    use streamfeed_transport::{QueueSource, TransportError};

    use super::*;
    use crate::message::{Feature, Response};

    /// What the in-memory "server" observed, in order.
    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Config(StreamConfig),
        Content(usize),
        WritesDone,
    }

    type Inbound = std::result::Result<Response, String>;

    struct MockChannel {
        seen: Arc<Mutex<Vec<Seen>>>,
        fail_config: bool,
        fail_content_after: Option<usize>,
        inbound: Receiver<Inbound>,
        status: Option<FinalStatus>,
    }

    struct MockSender {
        seen: Arc<Mutex<Vec<Seen>>>,
        fail_config: bool,
        fail_content_after: Option<usize>,
        contents: usize,
    }

    struct MockReceiver {
        inbound: Receiver<Inbound>,
        status: Option<FinalStatus>,
    }

    impl DuplexChannel for MockChannel {
        type Sender = MockSender;
        type Receiver = MockReceiver;

        fn into_split(self) -> (MockSender, MockReceiver) {
            (
                MockSender {
                    seen: self.seen,
                    fail_config: self.fail_config,
                    fail_content_after: self.fail_content_after,
                    contents: 0,
                },
                MockReceiver {
                    inbound: self.inbound,
                    status: self.status,
                },
            )
        }
    }

    impl MessageSender for MockSender {
        fn send(&mut self, request: &Request) -> Result<()> {
            match request {
                Request::Config(_) if self.fail_config => {
                    Err(SessionError::Disconnected("config rejected".into()))
                }
                Request::Config(config) => {
                    self.seen.lock().unwrap().push(Seen::Config(config.clone()));
                    Ok(())
                }
                Request::Content(_) if Some(self.contents) == self.fail_content_after => {
                    Err(SessionError::Disconnected("content rejected".into()))
                }
                Request::Content(chunk) => {
                    self.contents += 1;
                    self.seen.lock().unwrap().push(Seen::Content(chunk.len()));
                    Ok(())
                }
            }
        }

        fn writes_done(&mut self) -> Result<()> {
            self.seen.lock().unwrap().push(Seen::WritesDone);
            Ok(())
        }
    }

    impl MessageReceiver for MockReceiver {
        fn recv(&mut self) -> Result<Option<Response>> {
            match self.inbound.recv() {
                Ok(Ok(response)) => Ok(Some(response)),
                Ok(Err(message)) => Err(SessionError::Disconnected(message)),
                Err(_) => Ok(None),
            }
        }

        fn finish(&mut self) -> Result<FinalStatus> {
            self.status
                .take()
                .ok_or_else(|| SessionError::Disconnected("no status".into()))
        }
    }

    struct Harness {
        seen: Arc<Mutex<Vec<Seen>>>,
        server: Sender<Inbound>,
        channel: MockChannel,
    }

    fn harness() -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (server, inbound) = mpsc::channel();
        let channel = MockChannel {
            seen: Arc::clone(&seen),
            fail_config: false,
            fail_content_after: None,
            inbound,
            status: Some(FinalStatus::ok()),
        };
        Harness {
            seen,
            server,
            channel,
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    /// A byte source that hands out fixed slices, then optionally fails.
    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
        fail_at_end: bool,
        closed: bool,
    }

    impl ByteSource for ScriptedSource {
        fn read_bytes(&mut self, buf: &mut [u8]) -> streamfeed_transport::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None if self.fail_at_end => Err(TransportError::Io(std::io::Error::other(
                    "device unplugged",
                ))),
                None => Ok(0),
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn config() -> StreamConfig {
        StreamConfig::new(Feature::LabelDetection)
    }

    #[test]
    fn streams_two_and_a_half_chunks_in_order() {
        let Harness {
            seen,
            server,
            channel,
        } = harness();
        drop(server);

        let chunk = DEFAULT_CHUNK_SIZE;
        let (injector, mut source) = QueueSource::channel(4);
        injector.push(vec![1u8; chunk * 2 + chunk / 2]);
        injector.finish();

        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let report = orchestrator
            .run(&config(), &mut source, chunk, None, &mut |_: &Response| {}, None)
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Seen::Config(config()),
                Seen::Content(chunk),
                Seen::Content(chunk),
                Seen::Content(chunk / 2),
                Seen::WritesDone,
            ]
        );
        assert_eq!(report.requests_sent, 3);
        assert_eq!(report.bytes_sent, (chunk * 2 + chunk / 2) as u64);
        assert_eq!(orchestrator.state(), ExchangeState::Finished);
    }

    #[test]
    fn mirror_receives_every_sent_byte() {
        let Harness { server, channel, .. } = harness();
        drop(server);

        let mut source = ScriptedSource {
            chunks: VecDeque::from(vec![b"abc".to_vec(), b"defg".to_vec()]),
            fail_at_end: false,
            closed: false,
        };
        let mut mirror = Vec::new();
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        orchestrator
            .run(
                &config(),
                &mut source,
                16,
                Some(&mut mirror as &mut dyn Write),
                &mut |_: &Response| {},
                None,
            )
            .unwrap();

        assert_eq!(mirror, b"abcdefg");
        assert!(source.closed);
    }

    #[test]
    fn source_failure_still_drains_responses() {
        let Harness {
            seen,
            server,
            channel,
        } = harness();
        for i in 0..3 {
            server
                .send(Ok(Response::with_results(json!({ "n": i }))))
                .unwrap();
        }
        drop(server);

        let mut source = ScriptedSource {
            chunks: VecDeque::from(vec![vec![0u8; 8]]),
            fail_at_end: true,
            closed: false,
        };
        let mut processed = 0;
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let result = orchestrator.run(
            &config(),
            &mut source,
            8,
            None,
            &mut |_: &Response| processed += 1,
            None,
        );

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(processed, 3);
        assert_eq!(orchestrator.state(), ExchangeState::Failed);
        let report = orchestrator.report().unwrap();
        assert_eq!(report.requests_sent, 1);
        assert_eq!(report.responses_received, 3);
        assert_eq!(seen.lock().unwrap().last(), Some(&Seen::WritesDone));
    }

    #[test]
    fn config_failure_starts_nothing() {
        let Harness {
            seen,
            server,
            mut channel,
        } = harness();
        channel.fail_config = true;
        server.send(Ok(Response::default())).unwrap();

        let mut source = ScriptedSource {
            chunks: VecDeque::from(vec![vec![1u8; 4]]),
            fail_at_end: false,
            closed: false,
        };
        let mut processed = 0;
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let result = orchestrator.run(
            &config(),
            &mut source,
            4,
            None,
            &mut |_: &Response| processed += 1,
            None,
        );

        assert!(matches!(result, Err(SessionError::Disconnected(_))));
        assert_eq!(processed, 0);
        assert_eq!(source.chunks.len(), 1, "source must not be read");
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(orchestrator.state(), ExchangeState::Failed);
    }

    #[test]
    fn error_responses_are_processed_but_not_persisted() {
        let Harness { server, channel, .. } = harness();
        server
            .send(Ok(Response::with_results(json!({"label": "a"}))))
            .unwrap();
        server.send(Ok(Response::with_error(3, "bad chunk"))).unwrap();
        server
            .send(Ok(Response::with_results(json!({"label": "b"}))))
            .unwrap();
        drop(server);

        let (injector, mut source) = QueueSource::channel(1);
        injector.finish();

        let mut persisted = Vec::new();
        let mut processed = 0;
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let report = orchestrator
            .run(
                &config(),
                &mut source,
                1024,
                None,
                &mut |_: &Response| processed += 1,
                Some(&mut persisted as &mut (dyn Write + Send)),
            )
            .unwrap();

        assert_eq!(processed, 3);
        assert_eq!(report.responses_received, 3);
        assert_eq!(report.responses_persisted, 2);

        let mut records = RecordReader::new(persisted.as_slice());
        let first: serde_json::Value = records.read_json().unwrap().unwrap();
        let second: serde_json::Value = records.read_json().unwrap().unwrap();
        assert_eq!(first, json!({"label": "a"}));
        assert_eq!(second, json!({"label": "b"}));
        assert!(records.read_record().unwrap().is_none());
    }

    #[test]
    fn send_failure_stops_write_path_and_reports() {
        let Harness {
            seen,
            server,
            mut channel,
        } = harness();
        channel.fail_content_after = Some(1);
        drop(server);

        let mut source = ScriptedSource {
            chunks: VecDeque::from(vec![vec![1u8; 4], vec![2u8; 4], vec![3u8; 4]]),
            fail_at_end: false,
            closed: false,
        };
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let result = orchestrator.run(&config(), &mut source, 4, None, &mut |_: &Response| {}, None);

        assert!(matches!(result, Err(SessionError::Disconnected(_))));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Seen::Config(config()), Seen::Content(4), Seen::WritesDone]
        );
        assert!(source.closed);
    }

    #[test]
    fn read_error_and_bad_status_are_combined() {
        let Harness {
            server,
            mut channel,
            ..
        } = harness();
        channel.status = Some(FinalStatus::error(14, "unavailable"));
        server.send(Err("stream reset".into())).unwrap();
        drop(server);

        let (injector, mut source) = QueueSource::channel(1);
        injector.finish();
        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        let err = orchestrator
            .run(&config(), &mut source, 16, None, &mut |_: &Response| {}, None)
            .unwrap_err();

        let SessionError::Exchange(message) = err else {
            panic!("expected combined failure, got {err:?}");
        };
        assert!(message.contains("stream reset"));
        assert!(message.contains("unavailable"));
        let report = orchestrator.report().unwrap();
        assert_eq!(report.final_status, Some(FinalStatus::error(14, "unavailable")));
    }

    #[test]
    fn run_twice_is_rejected() {
        let Harness { server, channel, .. } = harness();
        drop(server);
        let (injector, mut source) = QueueSource::channel(1);
        injector.finish();

        let mut orchestrator = StreamOrchestrator::from_channel(channel, deadline());
        orchestrator
            .run(&config(), &mut source, 16, None, &mut |_: &Response| {}, None)
            .unwrap();
        assert!(matches!(
            orchestrator.run(&config(), &mut source, 16, None, &mut |_: &Response| {}, None),
            Err(SessionError::InvalidState(ExchangeState::Finished))
        ));
    }

    #[test]
    fn expired_deadline_fails_before_config() {
        let Harness { seen, channel, .. } = harness();
        let (_injector, mut source) = QueueSource::channel(1);
        let mut orchestrator = StreamOrchestrator::from_channel(channel, Instant::now());
        assert!(matches!(
            orchestrator.run(&config(), &mut source, 16, None, &mut |_: &Response| {}, None),
            Err(SessionError::DeadlineExceeded)
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    /// Answers each chunk immediately but refuses the next chunk until the
    /// processor has seen the previous answer, like a peer with no buffer room.
    struct LockstepChannel {
        acks: Receiver<()>,
    }

    struct LockstepSender {
        acks: Receiver<()>,
        replies: Option<Sender<Response>>,
        sent: usize,
    }

    struct LockstepReceiver {
        replies: Receiver<Response>,
    }

    impl DuplexChannel for LockstepChannel {
        type Sender = LockstepSender;
        type Receiver = LockstepReceiver;

        fn into_split(self) -> (LockstepSender, LockstepReceiver) {
            let (replies, inbound) = mpsc::channel();
            (
                LockstepSender {
                    acks: self.acks,
                    replies: Some(replies),
                    sent: 0,
                },
                LockstepReceiver { replies: inbound },
            )
        }
    }

    impl MessageSender for LockstepSender {
        fn send(&mut self, request: &Request) -> Result<()> {
            let Request::Content(chunk) = request else {
                return Ok(());
            };
            if self.sent > 0 && self.acks.recv_timeout(Duration::from_secs(5)).is_err() {
                return Err(SessionError::Exchange(format!(
                    "chunk {} blocked: response {} was never processed",
                    self.sent,
                    self.sent - 1
                )));
            }
            let replies = self
                .replies
                .as_ref()
                .ok_or_else(|| SessionError::Protocol("send after writes_done".into()))?;
            let _ = replies.send(Response::with_results(json!({ "bytes": chunk.len() })));
            self.sent += 1;
            Ok(())
        }

        fn writes_done(&mut self) -> Result<()> {
            self.replies = None;
            Ok(())
        }
    }

    impl MessageReceiver for LockstepReceiver {
        fn recv(&mut self) -> Result<Option<Response>> {
            Ok(self.replies.recv().ok())
        }

        fn finish(&mut self) -> Result<FinalStatus> {
            Ok(FinalStatus::ok())
        }
    }

    #[test]
    fn responses_are_read_while_content_is_still_being_written() {
        let (ack, acks) = mpsc::channel();
        let mut source = ScriptedSource {
            chunks: (0..5).map(|i| vec![i as u8; 64]).collect(),
            fail_at_end: false,
            closed: false,
        };

        let mut processed = 0u64;
        let mut orchestrator = StreamOrchestrator::from_channel(LockstepChannel { acks }, deadline());
        let report = orchestrator
            .run(
                &config(),
                &mut source,
                64,
                None,
                &mut |_: &Response| {
                    processed += 1;
                    let _ = ack.send(());
                },
                None,
            )
            .unwrap();

        assert_eq!(report.requests_sent, 5);
        assert_eq!(report.responses_received, 5);
        assert_eq!(processed, 5);
        assert_eq!(orchestrator.state(), ExchangeState::Finished);
    }

    #[test]
    fn combine_prefers_deadline() {
        assert!(combine(Vec::new()).is_none());
        let err = combine(vec![
            SessionError::Disconnected("x".into()),
            SessionError::DeadlineExceeded,
        ])
        .unwrap();
        assert!(err.is_deadline());
    }
}
