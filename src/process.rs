//! One engine subprocess.
//!
//! The process handle and the protocol session sit behind separate locks so that
//! liveness checks (taken under the pool lock) never wait on protocol I/O that is
//! in flight on another thread.

use crossbeam::channel::{unbounded, Sender};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EngineOption;
use crate::errors::Result;
use crate::query::{Query, QueryType};
use crate::session::UciSession;
use crate::{init_error, protocol_error};

/// How long an engine gets to exit on its own after `quit`
const QUIT_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineRole {
    Regular,
    Evaluator,
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRole::Regular => f.write_str("engine"),
            EngineRole::Evaluator => f.write_str("evaluator"),
        }
    }
}

/// Everything needed to start one engine
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub options: Vec<EngineOption>,
    pub handshake_timeout: Duration,
    pub stall_window: Duration,
}

pub struct EngineProcess {
    id: usize,
    role: EngineRole,
    pid: u32,
    label: String,
    child: Mutex<Option<Child>>,
    stdin: EngineStdin,
    session: Mutex<Option<UciSession>>,
    busy: AtomicBool,
}

/// Engine stdin, shared by the session (which writes to it) and the process
/// handle (which can release it even while the session is locked by a request)
#[derive(Clone)]
struct EngineStdin(Arc<Mutex<Option<ChildStdin>>>);

impl EngineStdin {
    fn new(stdin: ChildStdin) -> Self {
        Self(Arc::new(Mutex::new(Some(stdin))))
    }

    fn lock(&self) -> MutexGuard<'_, Option<ChildStdin>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the pipe; later writes fail with `BrokenPipe`
    fn release(&self) {
        self.lock().take();
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.lock().is_some()
    }
}

impl Write for EngineStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock().as_mut() {
            Some(stdin) => stdin.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl EngineProcess {
    /// Start the executable, wire its stdin/stdout and run the UCI handshake.
    /// On failure the half-started process is killed before returning.
    pub fn spawn(id: usize, role: EngineRole, spec: &LaunchSpec) -> Result<Self> {
        let label = format!("{}-{}", role, id);
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                init_error!(
                    "Unable to start and bind engine process {}: {}",
                    spec.program.display(),
                    e
                )
            })?;
        let pid = child.id();

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                reap(&mut child);
                return Err(init_error!("{}: failed to get engine stdin/stdout", label));
            }
        };

        let (tx, rx) = unbounded();
        let reader = thread::Builder::new()
            .name(format!("uci-reader-{}", label))
            .spawn(move || forward_lines(BufReader::new(stdout), &tx));
        if let Err(e) = reader {
            reap(&mut child);
            return Err(init_error!("{}: failed to start reader thread: {}", label, e));
        }

        let stdin = EngineStdin::new(stdin);
        let session = UciSession::new(
            Box::new(BufWriter::new(stdin.clone())),
            rx,
            spec.stall_window,
            label.clone(),
        );
        let engine = Self {
            id,
            role,
            pid,
            label,
            child: Mutex::new(Some(child)),
            stdin,
            session: Mutex::new(Some(session)),
            busy: AtomicBool::new(false),
        };

        // Dropping `engine` on error tears the process down
        engine.with_session(|session| session.handshake(&spec.options, spec.handshake_timeout))?;
        info!("{} started (pid {}, {})", engine.label, pid, spec.program.display());
        Ok(engine)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn role(&self) -> EngineRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_busy(&self) -> bool {
        let busy = self.busy.load(Ordering::SeqCst);
        if busy {
            debug!("{} is busy", self.label);
        }
        busy
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// True once the OS process has exited or its handle was released by cleanup
    pub fn is_dead(&self) -> bool {
        match self.lock_child().as_mut() {
            Some(child) => match child.try_wait() {
                Ok(status) => status.is_some(),
                Err(e) => {
                    warn!("{}: unable to query process status: {}", self.label, e);
                    true
                }
            },
            None => true,
        }
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.lock_child()
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten())
    }

    /// Run the protocol operation matching the query type
    pub fn execute(&self, query: &Query) -> Result<String> {
        match query.query_type() {
            QueryType::BestMove => self.best_move_from_continuation(query),
            QueryType::MakeMove => self.make_move(query),
            QueryType::LegalMoves => self.legal_moves(query),
            QueryType::Checkers => self.checkers(query),
            QueryType::Eval => self.eval(query),
        }
    }

    pub fn send_command(&self, command: &str) -> Result<()> {
        self.with_session(|session| session.send_command(command))
    }

    pub fn wait_for_ready(&self) -> Result<()> {
        self.with_session(UciSession::wait_for_ready)
    }

    pub fn best_move(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.best_move(query))
    }

    pub fn best_move_from_continuation(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.best_move_from_continuation(query))
    }

    pub fn make_move(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.make_move(query))
    }

    pub fn checkers(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.checkers(query))
    }

    pub fn eval(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.eval(query))
    }

    pub fn legal_moves(&self, query: &Query) -> Result<String> {
        self.with_session(|session| session.legal_moves(query))
    }

    /// Send `quit` if the engine is alive, then close both streams and terminate
    /// the process. Teardown runs even when `quit` can not be delivered.
    ///
    /// With a request in flight the session itself stays with that request; stdin is
    /// still closed here and stdout reaches EOF once the process is gone, which fails
    /// the request with a protocol error.
    pub fn close(&self) -> Result<()> {
        let mut quit_result = Ok(());
        match self.session.try_lock() {
            Ok(mut guard) => {
                if let Some(session) = guard.as_mut() {
                    if !self.is_dead() {
                        quit_result = session.send_command("quit");
                    }
                }
                // Dropping the session closes stdin and the line channel
                guard.take();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().take();
            }
            Err(TryLockError::WouldBlock) => {
                // An operation is in flight; killing the process ends it with EOF
                debug!("{}: closing while an operation is in flight", self.label);
            }
        }
        self.stdin.release();

        if quit_result.is_ok() {
            self.wait_for_exit(QUIT_GRACE);
        }
        let terminate_result = self.terminate();
        quit_result.and(terminate_result)
    }

    /// [`close`](Self::close) that logs failures and drops the process handle afterwards.
    /// A session still held by an in-flight operation is released when the engine drops.
    pub fn cleanup(&self) {
        if let Err(e) = self.close() {
            error!("{}: {}", self.label, e);
        }
        self.lock_child().take();
    }

    /// Kill the process (if still running) and reap it
    pub fn terminate(&self) -> Result<()> {
        let mut guard = self.lock_child();
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        child.wait()?;
        Ok(())
    }

    fn wait_for_exit(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.is_dead() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn with_session<T>(&self, op: impl FnOnce(&mut UciSession) -> Result<T>) -> Result<T> {
        let mut guard = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .as_mut()
            .ok_or_else(|| protocol_error!("{} is closed", self.label))?;
        op(session)
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("busy", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if self.lock_child().is_some() {
            self.cleanup();
        }
    }
}

/// Forward engine stdout to the session one line at a time. Bytes that are not
/// UTF-8 are replaced rather than ending the stream.
fn forward_lines(mut reader: impl BufRead, lines: &Sender<String>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if lines.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PoolError;
    use std::io::Cursor;

    fn fake_engine_spec() -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec![concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fake_uci.sh").to_string()],
            options: Vec::new(),
            handshake_timeout: Duration::from_secs(5),
            stall_window: Duration::from_millis(5),
        }
    }

    fn spec_for(program: &str) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from(program),
            args: Vec::new(),
            options: Vec::new(),
            handshake_timeout: Duration::from_millis(500),
            stall_window: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_spawn_missing_binary_is_initialization_error() {
        let result = EngineProcess::spawn(0, EngineRole::Regular, &spec_for("/nonexistent/engine"));
        assert!(matches!(result, Err(PoolError::Initialization(_))));
    }

    #[test]
    fn test_spawn_non_uci_program_fails_handshake() {
        // `true` exits immediately without ever printing uciok
        let result = EngineProcess::spawn(1, EngineRole::Regular, &spec_for("true"));
        assert!(matches!(result, Err(PoolError::Initialization(_))));
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(EngineRole::Regular.to_string(), "engine");
        assert_eq!(EngineRole::Evaluator.to_string(), "evaluator");
    }

    #[test]
    fn test_forward_lines_replaces_invalid_utf8() {
        let output: &[u8] = b"info string caf\xe9\r\ninfo depth 1 pv e2e4\nbestmove e2e4";
        let (tx, rx) = unbounded();
        forward_lines(Cursor::new(output), &tx);
        drop(tx);

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(
            lines,
            vec!["info string caf\u{FFFD}", "info depth 1 pv e2e4", "bestmove e2e4"]
        );
    }

    #[test]
    fn test_close_releases_stdin_while_request_in_flight() {
        let engine = EngineProcess::spawn(2, EngineRole::Regular, &fake_engine_spec()).unwrap();
        let query = Query::builder(QueryType::BestMove, "8/8/8/8/8/8/8/8 w - - 0 1")
            .movetime(3000)
            .build()
            .unwrap();

        thread::scope(|scope| {
            let search = scope.spawn(|| engine.best_move_from_continuation(&query));
            // Let the search take the session lock and send `go`
            thread::sleep(Duration::from_millis(300));
            assert!(engine.stdin.is_open());

            engine.close().unwrap();
            assert!(!engine.stdin.is_open());
            assert!(engine.is_dead());
            assert!(matches!(search.join().unwrap(), Err(PoolError::Protocol(_))));
        });
    }
}
