//! UCI protocol primitives.
//!
//! A [`UciSession`] is one strict request/response conversation with an engine:
//! commands go out through a writer, engine stdout arrives as whole lines on a
//! channel fed by a reader thread. The channel disconnecting is how the session
//! learns that the engine process has gone away.

use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, info};
use std::io::Write;
use std::time::Duration;

use crate::config::EngineOption;
use crate::errors::Result;
use crate::{init_error, protocol_error};

pub struct UciSession {
    writer: Box<dyn Write + Send>,
    lines: Receiver<String>,
    stall_window: Duration,
    label: String,
    /// Skill Level last set below the engine default, if any
    pub(crate) skill_level: Option<u32>,
}

impl UciSession {
    pub fn new(
        writer: Box<dyn Write + Send>,
        lines: Receiver<String>,
        stall_window: Duration,
        label: impl Into<String>,
    ) -> Self {
        Self {
            writer,
            lines,
            stall_window,
            label: label.into(),
            skill_level: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `uci` / `uciok`, configured options, then `isready` / `readyok`
    pub fn handshake(&mut self, options: &[EngineOption], timeout: Duration) -> Result<()> {
        self.send_command("uci")
            .map_err(|e| init_error!("{}", e))?;
        loop {
            match self.lines.recv_timeout(timeout) {
                Ok(line) => {
                    debug!("{} >> {}", self.label, line);
                    if line.trim() == "uciok" {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(init_error!(
                        "{}: no uciok within {}ms",
                        self.label,
                        timeout.as_millis()
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(init_error!("{}: engine exited during handshake", self.label));
                }
            }
        }

        for option in options {
            info!("{}: {}", self.label, option.to_command());
            self.send_command(&option.to_command())
                .map_err(|e| init_error!("{}", e))?;
        }

        self.wait_for_ready()
            .map_err(|e| init_error!("{}", e))
    }

    pub fn send_command(&mut self, command: &str) -> Result<()> {
        debug!("{} << {}", self.label, command);
        writeln!(self.writer, "{}", command)
            .and_then(|_| self.writer.flush())
            .map_err(|e| protocol_error!("{}: failed to send '{}': {}", self.label, command, e))
    }

    pub fn wait_for_ready(&mut self) -> Result<()> {
        self.send_command("isready")?;
        self.read_line("readyok").map(|_| ())
    }

    /// First line starting with `prefix`; everything before it is discarded
    pub fn read_line(&mut self, prefix: &str) -> Result<String> {
        while let Some(line) = self.next_line() {
            if line.starts_with(prefix) {
                return Ok(line);
            }
        }
        Err(protocol_error!(
            "{}: can not find expected line: {}",
            self.label,
            prefix
        ))
    }

    /// Reads one line, then keeps reading only while more output is immediately
    /// available. Returns the first line containing any of `markers`, or the last
    /// line read once output stalls.
    pub fn read_line_any(&mut self, markers: &[&str]) -> Result<String> {
        let mut line = self
            .next_line()
            .ok_or_else(|| protocol_error!("{}: engine output ended", self.label))?;
        loop {
            if markers.iter().any(|marker| line.contains(marker)) {
                return Ok(line);
            }
            match self.poll_line() {
                Some(next) => line = next,
                None => return Ok(line),
            }
        }
    }

    /// Every line up to and including the first one starting with `prefix`
    pub fn read_response(&mut self, prefix: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            let done = line.starts_with(prefix);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
        Err(protocol_error!(
            "{}: can not find expected line: {}",
            self.label,
            prefix
        ))
    }

    /// `(bestmove line, line printed just before it)`, or `None` if output ends first
    pub fn best_move_and_continuation(&mut self) -> Option<(String, String)> {
        let mut previous = String::new();
        while let Some(line) = self.next_line() {
            if line.starts_with("bestmove") {
                debug!("{}: bestmove found", self.label);
                return Some((line, previous));
            }
            previous = line;
        }
        debug!("{}: bestmove not found", self.label);
        None
    }

    fn next_line(&self) -> Option<String> {
        let line = self.lines.recv().ok()?;
        debug!("{} >> {}", self.label, line);
        Some(line)
    }

    fn poll_line(&self) -> Option<String> {
        let line = if self.stall_window.is_zero() {
            self.lines.try_recv().ok()?
        } else {
            self.lines.recv_timeout(self.stall_window).ok()?
        };
        debug!("{} >> {}", self.label, line);
        Some(line)
    }
}
