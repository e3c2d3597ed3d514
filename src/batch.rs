//! Batch analysis of many positions across the pool.
//!
//! Positions fan out over a rayon worker pool sized to the engine cap, so every
//! worker normally finds an idle engine. A `PoolExhausted` (for instance while a
//! dead engine is being replaced) is retried a bounded number of times.

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::config_error;
use crate::errors::Result;
use crate::query::{Query, QueryType, UNSET};
use crate::service::AnalysisService;

const RETRY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub depth: i32,
    pub movetime: i32,
    pub skill: i32,
    pub workers: usize,       // Parallel requests in flight
    pub busy_retries: u32,    // Attempts after a retryable error
    pub show_progress: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            depth: UNSET,
            movetime: UNSET,
            skill: UNSET,
            workers: 1,
            busy_retries: 20,
            show_progress: false,
        }
    }
}

/// One analyzed position; `error` is set instead of the analysis fields on failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub fen: String,
    pub best_move: String,
    pub eval: String,
    pub continuation: String,
    pub mate: String,
    pub error: Option<String>,
}

impl BatchEntry {
    fn failed(fen: &str, error: impl ToString) -> Self {
        Self {
            fen: fen.to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// FENs from a text file, one per line. Blank lines and `#` comments are skipped.
pub fn read_positions<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Best move and evaluation for every position, in input order
pub fn analyze_batch(
    service: &AnalysisService,
    positions: &[String],
    settings: &BatchSettings,
) -> Result<Vec<BatchEntry>> {
    let start_time = Instant::now();
    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers.max(1))
        .thread_name(|i| format!("batch-worker-{}", i))
        .build()
        .map_err(|e| config_error!("Unable to start batch workers: {}", e))?;

    let progress = progress_bar(positions.len(), settings.show_progress)?;
    let entries: Vec<BatchEntry> = workers.install(|| {
        positions
            .par_iter()
            .map(|fen| {
                let entry = analyze_position(service, fen, settings);
                progress.inc(1);
                entry
            })
            .collect()
    });
    progress.finish_and_clear();

    let failed = entries.iter().filter(|entry| !entry.is_ok()).count();
    info!(
        "Analyzed {} position(s) in {:.2?} ({} failed)",
        entries.len(),
        start_time.elapsed(),
        failed
    );
    Ok(entries)
}

/// Entries as CSV with a header row
pub fn write_csv<W: Write>(entries: &[BatchEntry], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        csv_writer.serialize(entry)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn analyze_position(service: &AnalysisService, fen: &str, settings: &BatchSettings) -> BatchEntry {
    let query = match Query::builder(QueryType::BestMove, fen)
        .depth(settings.depth)
        .movetime(settings.movetime)
        .difficulty(settings.skill)
        .build()
    {
        Ok(query) => query,
        Err(e) => return BatchEntry::failed(fen, e),
    };

    let mut attempt = 0;
    loop {
        match service.best_move_eval(&query) {
            Ok(answer) => {
                return BatchEntry {
                    fen: fen.to_string(),
                    best_move: answer.best_move,
                    eval: answer.eval,
                    continuation: answer.continuation,
                    mate: answer.mate,
                    error: None,
                }
            }
            Err(e) if e.is_retryable() && attempt < settings.busy_retries => {
                attempt += 1;
                thread::sleep(RETRY_PAUSE);
            }
            Err(e) => {
                warn!("{}: {}", fen, e);
                return BatchEntry::failed(fen, e);
            }
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Analyzing [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%)")
            .map_err(|e| config_error!("Invalid progress template: {}", e))?
            .progress_chars("██░"),
    );
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_positions_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.txt");
        std::fs::write(
            &path,
            "# opening\nrnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\n\n  7k/5Q2/6K1/8/8/8/8/8 b - - 0 1  \n",
        )
        .unwrap();

        let positions = read_positions(&path).unwrap();
        assert_eq!(
            positions,
            vec![
                "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
                "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
            ]
        );
        assert!(read_positions(dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_write_csv() {
        let entries = vec![
            BatchEntry {
                fen: "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1".to_string(),
                best_move: "a1a8".to_string(),
                eval: "+9.50".to_string(),
                continuation: "a1a8".to_string(),
                mate: "1".to_string(),
                error: None,
            },
            BatchEntry::failed("bad", "Invalid position: Empty FEN"),
        ];

        let mut out = Vec::new();
        write_csv(&entries, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "fen,best_move,eval,continuation,mate,error");
        assert_eq!(lines[1], "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1,a1a8,+9.50,a1a8,1,");
        assert_eq!(lines[2], "bad,,,,,Invalid position: Empty FEN");
    }
}
