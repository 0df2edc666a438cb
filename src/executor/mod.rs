// src/executor/mod.rs

//! Streaming command executor
//!
//! Runs one external command for a session and turns its output into an
//! ordered [`StreamEvent`] sequence:
//!
//! ```text
//! start -> (output | error)* -> complete
//! ```
//!
//! Exactly one `start` comes first and exactly one `complete` comes last,
//! whatever happens in between: non-zero exit, timeout, spawn failure or
//! cancellation while the consumer is still listening.
//!
//! # Process handling
//!
//! The child runs in its own process group so that everything it starts can
//! be signalled together. Termination sends `SIGTERM` to the group, waits
//! the configured grace period, then sends `SIGKILL`.
//!
//! stdout and stderr are read in one `select!` loop. Events are emitted in
//! the order bytes arrive, not grouped by pipe.
//!
//! # Backpressure and cancellation
//!
//! Events go through a bounded channel. A slow consumer slows the reader;
//! nothing is buffered without limit. Dropping the [`Invocation`] (a client
//! disconnect) cancels the worker, which then terminates the process group.
//!
//! The worker owns the session lock and releases it only after the process
//! has been reaped.

pub mod capture;
pub mod event;
pub mod line;
pub mod spack;
pub mod tail;

pub use capture::Captured;
pub use event::{EventDecoder, EventKind, Outcome, StreamEvent};
pub use line::LineBuffer;
pub use spack::{
    CommandSpec, OutputScanner, info_command, install_command, list_command, uninstall_command,
    validate_command,
};
pub use tail::TailBuffer;

use crate::workspace::SessionLock;
use futures::Stream;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

const READ_CHUNK: usize = 8 * 1024;
const TAIL_BYTES: usize = 16 * 1024;
const BUILD_LOG_BYTES: u64 = 16 * 1024;

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Spack executable
    pub spack: String,
    /// Wall-clock limit per invocation
    pub timeout: Duration,
    /// Limit for one-shot catalog queries
    pub query_timeout: Duration,
    /// Wait between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Capacity of the event channel
    pub event_buffer: usize,
    /// Lines kept for the failure tail
    pub tail_lines: usize,
    /// Argv prefix for wrapped execution (`{session_root}`, `{session_id}`)
    pub wrapper: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            spack: "spack".to_string(),
            timeout: Duration::from_secs(30 * 60),
            query_timeout: Duration::from_secs(2 * 60),
            kill_grace: Duration::from_secs(5),
            event_buffer: 256,
            tail_lines: 60,
            wrapper: Vec::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_spack(mut self, spack: &str) -> Self {
        self.spack = spack.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }
}

/// Spawns streamed invocations
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
}

/// A running invocation's event stream
///
/// Dropping it cancels the invocation.
pub struct Invocation {
    id: String,
    events: ReceiverStream<StreamEvent>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl Invocation {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event; `None` after `complete`
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    /// Ask the worker to stop the process
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Collect every remaining event
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for Invocation {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `spec` to completion under the query timeout
    pub async fn run_captured(&self, spec: &CommandSpec) -> crate::Result<Captured> {
        capture::run_captured(spec, self.config.query_timeout).await
    }

    /// Start `spec` in the background, holding `lock` until it ends
    pub fn spawn(&self, spec: CommandSpec, lock: SessionLock) -> Invocation {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4().simple().to_string();

        let worker = Worker {
            id: id.clone(),
            config: self.config.clone(),
            tx,
            cancel: cancel.clone(),
            tail: TailBuffer::new(self.config.tail_lines, TAIL_BYTES),
            scanner: OutputScanner::new(spec.package.as_deref()),
        };
        tokio::spawn(worker.run(spec, lock));

        Invocation {
            id,
            events: ReceiverStream::new(rx),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }
}

/// How the process loop ended
enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    /// Consumer went away; nobody to report to
    Disconnected,
}

/// Result of handing one output line to the consumer
enum Delivery {
    Sent,
    /// Consumer gone or cancel token fired
    Stopped,
    /// The deadline passed while the consumer was not reading
    TimedOut,
}

struct Worker {
    id: String,
    config: ExecutorConfig,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    tail: TailBuffer,
    scanner: OutputScanner,
}

impl Worker {
    async fn run(mut self, spec: CommandSpec, lock: SessionLock) {
        let started = Instant::now();
        let session_id = lock.session_id().to_string();
        let command_line = spec.display();

        info!(session_id = %session_id, invocation = %self.id, command = %command_line, "Invocation started");

        if !self.emit(StreamEvent::start(command_line.clone())).await {
            debug!(invocation = %self.id, "Consumer gone before start");
            return;
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(session_id = %session_id, program = %spec.program, "Spawn failed: {}", e);
                let outcome = Outcome {
                    success: false,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    diagnostic: Some(format!("failed to spawn {}: {}", spec.program, e)),
                    ..Default::default()
                };
                self.emit(StreamEvent::complete("Failed to start process", outcome))
                    .await;
                drop(lock);
                return;
            }
        };

        let ending = self.pump(&mut child).await;
        let elapsed = started.elapsed().as_secs_f64();

        let (data, mut outcome) = match ending {
            Ending::Exited(status) => {
                let success = status.success();
                let data = match status.code() {
                    Some(code) => format!("Process exited with code {}", code),
                    None => "Process terminated by signal".to_string(),
                };
                let outcome = Outcome {
                    success,
                    exit_code: status.code(),
                    elapsed_secs: elapsed,
                    ..Default::default()
                };
                (data, outcome)
            }
            Ending::TimedOut => {
                let diagnostic = format!("timed out after {:?}", self.config.timeout);
                let outcome = Outcome {
                    success: false,
                    elapsed_secs: elapsed,
                    diagnostic: Some(diagnostic.clone()),
                    ..Default::default()
                };
                (format!("Process {}", diagnostic), outcome)
            }
            Ending::Cancelled => {
                let outcome = Outcome {
                    success: false,
                    elapsed_secs: elapsed,
                    diagnostic: Some("cancelled".to_string()),
                    ..Default::default()
                };
                ("Process cancelled".to_string(), outcome)
            }
            Ending::Disconnected => {
                info!(session_id = %session_id, invocation = %self.id, "Consumer disconnected, process stopped");
                drop(lock);
                return;
            }
        };

        outcome.install_digest = self.scanner.install_digest().map(str::to_string);
        if !outcome.success {
            if !self.tail.is_empty() {
                outcome.error_tail = Some(self.tail.render());
            }
            if let Some(path) = self.scanner.build_log() {
                match tail::read_file_tail(path, self.config.tail_lines, BUILD_LOG_BYTES) {
                    Ok(log) if !log.is_empty() => outcome.build_log = Some(log),
                    Ok(_) => {}
                    Err(e) => debug!("Build log {:?} unreadable: {}", path, e),
                }
            }
        }

        info!(
            session_id = %session_id,
            invocation = %self.id,
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            elapsed_secs = elapsed,
            "Invocation finished"
        );

        // The final send does not race the cancel token; the consumer decides
        let _ = self.tx.send(StreamEvent::complete(data, outcome)).await;
        drop(lock);
    }

    /// Forward output until the process ends, times out or is cancelled
    async fn pump(&mut self, child: &mut Child) -> Ending {
        let pid = child.id();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_lines = LineBuffer::new();
        let mut err_lines = LineBuffer::new();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];

        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            let pipes_open = stdout.is_some() || stderr.is_some();

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.terminate(pid, child).await;
                    return self.stopped();
                }
                _ = self.tx.closed() => {
                    self.terminate(pid, child).await;
                    return Ending::Disconnected;
                }
                _ = &mut timer => {
                    return self.time_out(pid, child).await;
                }
                n = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    let lines = match n {
                        Some(n) => out_lines.push(&out_buf[..n]),
                        None => {
                            stdout = None;
                            out_lines.finish().into_iter().collect()
                        }
                    };
                    for line in lines {
                        match self.line(EventKind::Output, line, deadline).await {
                            Delivery::Sent => {}
                            Delivery::Stopped => {
                                self.terminate(pid, child).await;
                                return self.stopped();
                            }
                            Delivery::TimedOut => return self.time_out(pid, child).await,
                        }
                    }
                }
                n = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    let lines = match n {
                        Some(n) => err_lines.push(&err_buf[..n]),
                        None => {
                            stderr = None;
                            err_lines.finish().into_iter().collect()
                        }
                    };
                    for line in lines {
                        match self.line(EventKind::Error, line, deadline).await {
                            Delivery::Sent => {}
                            Delivery::Stopped => {
                                self.terminate(pid, child).await;
                                return self.stopped();
                            }
                            Delivery::TimedOut => return self.time_out(pid, child).await,
                        }
                    }
                }
                status = child.wait(), if !pipes_open => {
                    return match status {
                        Ok(status) => Ending::Exited(status),
                        Err(e) => {
                            warn!(invocation = %self.id, "Wait failed: {}", e);
                            self.terminate(pid, child).await;
                            Ending::Cancelled
                        }
                    };
                }
            }
        }
    }

    async fn time_out(&self, pid: Option<u32>, child: &mut Child) -> Ending {
        warn!(invocation = %self.id, "Timed out after {:?}", self.config.timeout);
        self.terminate(pid, child).await;
        Ending::TimedOut
    }

    fn stopped(&self) -> Ending {
        if self.tx.is_closed() {
            Ending::Disconnected
        } else {
            Ending::Cancelled
        }
    }

    async fn line(
        &mut self,
        kind: EventKind,
        line: String,
        deadline: tokio::time::Instant,
    ) -> Delivery {
        self.scanner.observe(&line);
        self.tail.push(&line);
        let event = match kind {
            EventKind::Error => StreamEvent::error(line),
            _ => StreamEvent::output(line),
        };
        tokio::select! {
            sent = self.tx.send(event) => {
                if sent.is_ok() { Delivery::Sent } else { Delivery::Stopped }
            }
            _ = self.cancel.cancelled() => Delivery::Stopped,
            _ = tokio::time::sleep_until(deadline) => Delivery::TimedOut,
        }
    }

    /// Send unless cancelled first; false when the consumer is gone
    async fn emit(&self, event: StreamEvent) -> bool {
        tokio::select! {
            sent = self.tx.send(event) => sent.is_ok(),
            _ = self.cancel.cancelled() => false,
        }
    }

    /// SIGTERM the group, then SIGKILL after the grace period
    async fn terminate(&self, pid: Option<u32>, child: &mut Child) {
        let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
            let _ = child.kill().await;
            return;
        };
        let group = Pid::from_raw(pid);

        if let Err(e) = killpg(group, Signal::SIGTERM) {
            debug!(pid, "SIGTERM to process group failed: {}", e);
        }

        match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
            Ok(_) => debug!(pid, "Process group stopped after SIGTERM"),
            Err(_) => {
                warn!(pid, "Process group ignored SIGTERM, sending SIGKILL");
                if let Err(e) = killpg(group, Signal::SIGKILL) {
                    debug!(pid, "SIGKILL to process group failed: {}", e);
                }
                let _ = child.wait().await;
            }
        }

        // Stragglers that left the leader behind
        let _ = killpg(group, Signal::SIGKILL);
    }
}

/// Read one chunk; `None` at EOF or on a read error
async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<usize>
where
    R: AsyncRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{StoreConfig, WorkspaceStore};
    use futures::StreamExt;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> WorkspaceStore {
        WorkspaceStore::new(StoreConfig::new(temp_dir.path().join("sessions"))).unwrap()
    }

    fn sh(session_root: &std::path::Path, script: &str) -> CommandSpec {
        CommandSpec::new("sh", session_root).arg("-c").arg(script)
    }

    fn assert_framed(events: &[StreamEvent]) {
        assert_eq!(events.first().map(|e| e.kind), Some(EventKind::Start));
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Complete));
        assert_eq!(events.iter().filter(|e| e.kind == EventKind::Start).count(), 1);
        assert_eq!(events.iter().filter(|e| e.is_complete()).count(), 1);
    }

    #[tokio::test]
    async fn test_successful_run_streams_lines() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let executor = Executor::new(ExecutorConfig::default());
        let events = executor
            .spawn(sh(&session.root, "echo one; echo two; printf 'three'"), lock)
            .collect()
            .await;

        assert_framed(&events);
        let lines: Vec<&str> = events
            .iter()
            .filter(|e| e.kind == EventKind::Output)
            .map(|e| e.data.as_str())
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);

        let outcome = events.last().unwrap().outcome.clone().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.error_tail.is_none());

        // Lock released once the worker finished
        assert!(store.try_lock(&session.id).is_ok());
    }

    #[tokio::test]
    async fn test_failure_carries_tail_and_stderr_events() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let executor = Executor::new(ExecutorConfig::default().with_tail_lines(2));
        let events = executor
            .spawn(sh(&session.root, "echo a; echo b; sleep 0.2; echo boom >&2; exit 3"), lock)
            .collect()
            .await;

        assert_framed(&events);
        assert!(events.iter().any(|e| e.kind == EventKind::Error && e.data == "boom"));

        let outcome = events.last().unwrap().outcome.clone().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        let tail = outcome.error_tail.unwrap();
        assert_eq!(tail.lines().count(), 2);
        assert!(tail.contains("boom"));
    }

    #[tokio::test]
    async fn test_spawn_failure_still_framed() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let executor = Executor::new(ExecutorConfig::default());
        let spec = CommandSpec::new("/nonexistent/spack-binary", &session.root).arg("install");
        let events = executor.spawn(spec, lock).collect().await;

        assert_eq!(events.len(), 2);
        assert_framed(&events);
        let outcome = events[1].outcome.clone().unwrap();
        assert!(!outcome.success);
        assert!(outcome.diagnostic.unwrap().contains("failed to spawn"));
        assert!(store.try_lock(&session.id).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let config = ExecutorConfig::default()
            .with_timeout(Duration::from_millis(300))
            .with_kill_grace(Duration::from_millis(200));
        let executor = Executor::new(config);

        let started = Instant::now();
        let events = executor
            .spawn(sh(&session.root, "echo begin; sleep 30"), lock)
            .collect()
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_framed(&events);
        let outcome = events.last().unwrap().outcome.clone().unwrap();
        assert!(!outcome.success);
        assert!(outcome.diagnostic.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_fires_while_consumer_is_not_reading() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();
        let marker = session.root.join("survived");

        let config = ExecutorConfig::default()
            .with_timeout(Duration::from_millis(300))
            .with_kill_grace(Duration::from_millis(200))
            .with_event_buffer(1);
        let script = format!(
            "for i in 1 2 3 4 5; do echo line $i; done; sleep 1; touch {}",
            marker.display()
        );
        let invocation = Executor::new(config).spawn(sh(&session.root, &script), lock);

        // Channel full after `start`; nobody reads for a while
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());

        let events = invocation.collect().await;
        assert_framed(&events);
        let outcome = events.last().unwrap().outcome.clone().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.diagnostic.as_deref(), Some("timed out after 300ms"));
    }

    #[tokio::test]
    async fn test_long_line_survives_sse_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let script = "head -c 70000 /dev/zero | tr '\\000' x; echo; echo after";
        let events = Executor::new(ExecutorConfig::default())
            .spawn(sh(&session.root, script), lock)
            .collect()
            .await;
        assert_framed(&events);

        let output: Vec<&str> = events
            .iter()
            .filter(|e| e.kind == EventKind::Output)
            .map(|e| e.data.as_str())
            .collect();
        assert!(output.iter().all(|l| l.len() <= line::DEFAULT_MAX_LINE));
        assert_eq!(output.last(), Some(&"after"));
        let xs: usize = output.iter().filter(|l| l.starts_with('x')).map(|l| l.len()).sum();
        assert_eq!(xs, 70000);

        let wire: String = events.iter().map(|e| e.to_sse()).collect();
        let mut decoder = EventDecoder::new();
        let mut decoded = Vec::new();
        for chunk in wire.as_bytes().chunks(4096) {
            decoded.extend(decoder.feed(chunk).unwrap());
        }
        decoded.extend(decoder.finish().unwrap());

        assert_eq!(decoded.len(), events.len());
        for (sent, received) in events.iter().zip(&decoded) {
            assert_eq!(sent.kind, received.kind);
            assert_eq!(sent.data, received.data);
        }
    }

    #[tokio::test]
    async fn test_sigterm_ignored_gets_sigkill() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let config = ExecutorConfig::default()
            .with_timeout(Duration::from_millis(300))
            .with_kill_grace(Duration::from_millis(200));
        let events = Executor::new(config)
            .spawn(sh(&session.root, "trap '' TERM; echo ready; sleep 30"), lock)
            .collect()
            .await;

        assert_framed(&events);
        assert_eq!(events.last().unwrap().success(), Some(false));
    }

    #[tokio::test]
    async fn test_dropping_invocation_kills_process() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();
        let marker = session.root.join("finished");

        let config = ExecutorConfig::default().with_kill_grace(Duration::from_millis(200));
        let script = format!("echo started; sleep 2; touch {}", marker.display());
        let mut invocation = Executor::new(config).spawn(sh(&session.root, &script), lock);

        assert_eq!(invocation.next().await.map(|e| e.kind), Some(EventKind::Start));
        assert_eq!(invocation.next().await.map(|e| e.data), Some("started".to_string()));
        drop(invocation);

        // The lock comes back once the worker has reaped the process
        let mut released = false;
        for _ in 0..50 {
            if store.try_lock(&session.id).is_ok() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(released);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_cancel_reports_complete() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let config = ExecutorConfig::default().with_kill_grace(Duration::from_millis(200));
        let mut invocation = Executor::new(config).spawn(sh(&session.root, "echo go; sleep 30"), lock);
        assert_eq!(invocation.recv().await.map(|e| e.kind), Some(EventKind::Start));
        assert_eq!(invocation.recv().await.map(|e| e.data), Some("go".to_string()));

        invocation.cancel();
        let rest = invocation.collect().await;
        let last = rest.last().unwrap();
        assert!(last.is_complete());
        assert_eq!(last.outcome.as_ref().unwrap().diagnostic.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_install_digest_and_build_log_captured() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let session = store.create(None).unwrap();
        let lock = store.try_lock(&session.id).unwrap();

        let log = session.root.join("logs").join("spack-build-out.txt");
        std::fs::write(&log, "configure: error: no compiler\n").unwrap();
        let script = format!(
            "echo '[+] /opt/spack/zlib-1.3.1-abcdefghijklmnopqrstuvwxyz234567'; echo '  {}'; exit 1",
            log.display()
        );
        let spec = sh(&session.root, &script).for_package("zlib");
        let events = Executor::new(ExecutorConfig::default()).spawn(spec, lock).collect().await;

        let outcome = events.last().unwrap().outcome.clone().unwrap();
        assert_eq!(outcome.install_digest.as_deref(), Some("abcdefghijklmnopqrstuvwxyz234567"));
        assert_eq!(outcome.build_log.as_deref(), Some("configure: error: no compiler"));
    }
}
