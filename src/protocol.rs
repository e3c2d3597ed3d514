//! High-level engine operations and the result parser.
//!
//! Every operation first synchronizes with `isready` so that stale output from a
//! previous request (late `info` lines, an unread `readyok`) is flushed before
//! the new position is set up.

use log::debug;

use crate::errors::{PoolError, Result};
use crate::protocol_error;
use crate::query::{find_move_token, Query, MAX_SKILL_LEVEL};
use crate::session::UciSession;

/// Result of a best-move search when the side to move has no legal move
pub const NO_MOVE_SENTINEL: &str = "0|none";

/// Markers of the score line in an `eval` dump (older and newer engine versions)
pub const EVAL_MARKERS: [&str; 2] = ["Total evaluation", "Final evaluation"];

impl UciSession {
    /// FEN after playing the query's move
    pub fn make_move(&mut self, query: &Query) -> Result<String> {
        let mv = query.move_str().ok_or_else(|| {
            PoolError::Validation("a move is required for make-move queries".to_string())
        })?;
        self.wait_for_ready()?;
        self.send_command(&format!("position fen {} moves {}", query.fen(), mv))?;
        self.current_fen()
    }

    /// Squares of the pieces giving check, space separated (empty when not in check)
    pub fn checkers(&mut self, query: &Query) -> Result<String> {
        self.wait_for_ready()?;
        self.send_command(&format!("position fen {}", query.fen()))?;

        self.wait_for_ready()?;
        self.send_command("d")?;

        let line = self.read_line("Checkers:")?;
        Ok(strip_label(&line, "Checkers:"))
    }

    /// Set up the position and start the search. A query without a difficulty
    /// restores full strength if an earlier query on this engine lowered it.
    pub fn send_go_command(&mut self, query: &Query) -> Result<()> {
        let limits = query.search_limits();

        let skill_level = match limits.skill_level {
            Some(level) => Some(level),
            None => self.skill_level.take().map(|_| MAX_SKILL_LEVEL),
        };
        if let Some(skill_level) = skill_level {
            self.wait_for_ready()?;
            self.send_command(&format!("setoption name Skill Level value {}", skill_level))?;
            self.skill_level = limits.skill_level.filter(|&level| level < MAX_SKILL_LEVEL);
        }

        self.wait_for_ready()?;
        if !query.fen().is_empty() {
            self.send_command(&format!("position fen {}", query.fen()))?;
        }

        self.wait_for_ready()?;
        self.send_command(&limits.go_command())
    }

    /// Just the move from the `bestmove` line
    pub fn best_move(&mut self, query: &Query) -> Result<String> {
        self.send_go_command(query)?;
        let line = self.read_line("bestmove")?;
        parse_best_move(&line)
    }

    /// `"<mate>|<continuation>"`, [`NO_MOVE_SENTINEL`], or a bare move in the degenerate case
    pub fn best_move_from_continuation(&mut self, query: &Query) -> Result<String> {
        self.send_go_command(query)?;
        let (best_move_line, continuation_line) = self
            .best_move_and_continuation()
            .ok_or_else(|| protocol_error!("{}: engine output ended before bestmove", self.label()))?;
        debug!("{}, {}", best_move_line, continuation_line);
        Ok(parse_continuation(&best_move_line, &continuation_line))
    }

    /// Static evaluation score from the engine's `eval` dump
    pub fn eval(&mut self, query: &Query) -> Result<String> {
        self.wait_for_ready()?;
        self.send_command(&format!("position fen {}", query.fen()))?;
        self.wait_for_ready()?;
        self.send_command("eval")?;

        let line = self.read_line_any(&EVAL_MARKERS)?;
        parse_eval_score(&line)
    }

    /// Legal moves of the side to move, space separated
    pub fn legal_moves(&mut self, query: &Query) -> Result<String> {
        self.wait_for_ready()?;
        self.send_command(&format!("position fen {}", query.fen()))?;

        self.wait_for_ready()?;
        self.send_command("go perft 1")?;

        let response = self.read_response("Nodes")?;
        Ok(parse_legal_moves(&response))
    }

    fn current_fen(&mut self) -> Result<String> {
        self.wait_for_ready()?;
        self.send_command("d")?;

        let line = self.read_line("Fen:")?;
        Ok(strip_label(&line, "Fen:"))
    }
}

fn strip_label(line: &str, label: &str) -> String {
    line.strip_prefix(label).unwrap_or(line).trim().to_string()
}

/// Second token of a `bestmove` line
pub fn parse_best_move(line: &str) -> Result<String> {
    line.split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| protocol_error!("malformed bestmove line: '{}'", line))
}

/// Combine the `bestmove` line with the last principal-variation line before it
pub fn parse_continuation(best_move_line: &str, continuation_line: &str) -> String {
    let best = find_move_token(best_move_line);
    let continuation = find_move_token(continuation_line);

    if let (Some(_), Some((offset, _))) = (best, continuation) {
        let mate = continuation_line
            .find("mate ")
            .map(|index| {
                continuation_line[index + "mate ".len()..]
                    .chars()
                    .take(2)
                    .collect::<String>()
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();
        return format!("{}|{}", mate, &continuation_line[offset..]);
    }

    // No legal move: stalemate, or checkmate already on the board
    if best_move_line.trim() == "bestmove (none)" || continuation_line.contains("mate 0") {
        return NO_MOVE_SENTINEL.to_string();
    }

    best_move_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

/// Third whitespace token of the evaluation line
pub fn parse_eval_score(line: &str) -> Result<String> {
    line.split_whitespace()
        .nth(2)
        .map(str::to_string)
        .ok_or_else(|| protocol_error!("malformed evaluation line: '{}'", line))
}

/// Moves listed by `go perft 1` as `<move>: <count>` lines
pub fn parse_legal_moves(lines: &[String]) -> String {
    lines
        .iter()
        .filter(|line| !line.is_empty() && !line.contains("Nodes") && line.contains(':'))
        .filter_map(|line| line.split(':').next())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}
