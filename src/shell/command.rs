//! Supervised shell command execution.
//!
//! [`execute`] runs one command to completion, timeout or cancellation. Both
//! output streams are read on helper threads; the calling thread polls the
//! child, keeps a bounded tail of masked output lines and mirrors them into
//! an optional log file.

use crate::error::{Result, StagegateError};
use crate::secrets::OutputMasker;
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::platform::{kill_process_tree, shell_command, CancelToken};

/// How long the supervisor waits for output between child status checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep draining output after the child exited. Background
/// processes that inherited the pipes would otherwise hold them open forever.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Default number of output lines retained.
pub const DEFAULT_TAIL_LINES: usize = 40;

/// Options for command execution.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,

    /// Kill the command after this long.
    pub timeout: Option<Duration>,

    /// Number of trailing output lines to keep.
    pub tail_lines: usize,

    /// Redacts credential values from captured output.
    pub masker: OutputMasker,

    /// Mirror masked output into this file.
    pub log_file: Option<PathBuf>,

    /// Stop the command when cancelled.
    pub cancel: CancelToken,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
            tail_lines: DEFAULT_TAIL_LINES,
            masker: OutputMasker::new(),
            log_file: None,
            cancel: CancelToken::new(),
        }
    }
}

/// How a supervised command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own. `None` when killed by a signal.
    Exited(Option<i32>),
    /// The timeout elapsed and the process tree was killed.
    TimedOut,
    /// Cancellation was requested and the process tree was killed.
    Cancelled,
}

/// Result of a supervised command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// How the command ended.
    pub termination: Termination,

    /// Last lines of combined stdout/stderr, masked.
    pub tail: Vec<String>,

    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(Some(0))
    }

    /// Exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => code,
            _ => None,
        }
    }
}

/// Execute `command` through the platform shell and supervise it.
///
/// # Errors
///
/// Returns [`StagegateError::CommandFailed`] if the process cannot be
/// spawned. Everything after a successful spawn is reported through
/// [`CommandOutput`].
pub fn execute(command: &str, options: &CommandOptions) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut cmd = shell_command(command);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&options.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        tracing::debug!(error = %e, "spawn failed");
        StagegateError::CommandFailed {
            command: options.masker.mask(command),
            code: None,
        }
    })?;

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(stdout, &tx));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(stderr, &tx));
    }
    drop(tx);

    let mut sink = OutputSink::new(options);
    let deadline = options.timeout.map(|t| start + t);

    let termination = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => sink.push(&line),
            Err(RecvTimeoutError::Timeout) => {}
            // Both pipes closed but the process may still be running.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }

        match child.try_wait() {
            Ok(Some(status)) => break Termination::Exited(status.code()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll child; killing it");
                kill_process_tree(&mut child);
                break Termination::Exited(None);
            }
        }

        if options.cancel.is_cancelled() {
            tracing::warn!("cancellation requested; killing command");
            kill_process_tree(&mut child);
            break Termination::Cancelled;
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::warn!(
                timeout_secs = options.timeout.map(|t| t.as_secs()),
                "command timed out; killing process group"
            );
            kill_process_tree(&mut child);
            break Termination::TimedOut;
        }
    };

    let drain_until = Instant::now() + DRAIN_GRACE;
    loop {
        let remaining = drain_until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => sink.push(&line),
            Err(_) => break,
        }
    }

    Ok(CommandOutput {
        termination,
        tail: sink.finish(),
        duration: start.elapsed(),
    })
}

/// Forward lines from a pipe until EOF. Invalid UTF-8 is replaced.
fn forward_lines(pipe: impl Read, tx: &mpsc::Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

/// Masked line tail plus optional log file.
struct OutputSink<'a> {
    masker: &'a OutputMasker,
    tail: VecDeque<String>,
    capacity: usize,
    log: Option<BufWriter<File>>,
}

impl<'a> OutputSink<'a> {
    fn new(options: &'a CommandOptions) -> Self {
        let log = options.log_file.as_ref().and_then(|path| {
            let opened = path
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| File::create(path));
            match opened {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot open stage log");
                    None
                }
            }
        });

        Self {
            masker: &options.masker,
            tail: VecDeque::with_capacity(options.tail_lines),
            capacity: options.tail_lines,
            log,
        }
    }

    fn push(&mut self, line: &str) {
        let masked = self.masker.mask(line);

        if let Some(log) = &mut self.log {
            if let Err(e) = writeln!(log, "{}", masked) {
                tracing::warn!(error = %e, "stage log write failed; disabling log");
                self.log = None;
            }
        }

        if self.capacity == 0 {
            return;
        }
        if self.tail.len() == self.capacity {
            self.tail.pop_front();
        }
        self.tail.push_back(masked);
    }

    fn finish(mut self) -> Vec<String> {
        if let Some(log) = &mut self.log {
            let _ = log.flush();
        }
        self.tail.into_iter().collect()
    }
}
