use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{PoolError, Result};

/// Sentinel for "not set" on the integer query fields
pub const UNSET: i32 = -1;

/// Depth used when a search query carries neither a positive depth nor a positive movetime.
/// A bare `go` would search forever.
pub const DEFAULT_SEARCH_DEPTH: u32 = 10;

/// Upper bound of the UCI "Skill Level" option
pub const MAX_SKILL_LEVEL: u32 = 20;

/// Kind of analysis a [`Query`] asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    BestMove,
    MakeMove,
    LegalMoves,
    Checkers,
    Eval,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::BestMove => "best-move",
            QueryType::MakeMove => "make-move",
            QueryType::LegalMoves => "legal-moves",
            QueryType::Checkers => "checkers",
            QueryType::Eval => "eval",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for QueryType {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best-move" | "bestmove" => Ok(QueryType::BestMove),
            "make-move" | "makemove" => Ok(QueryType::MakeMove),
            "legal-moves" | "legalmoves" => Ok(QueryType::LegalMoves),
            "checkers" => Ok(QueryType::Checkers),
            "eval" => Ok(QueryType::Eval),
            other => Err(PoolError::Validation(format!("unknown query type '{}'", other))),
        }
    }
}

/// One analysis request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    query_type: QueryType,
    fen: String,
    #[serde(rename = "move")]
    mv: Option<String>,
    depth: i32,
    movetime: i32,
    difficulty: i32,
}

impl Query {
    pub fn builder(query_type: QueryType, fen: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            query_type,
            fen: fen.into(),
            mv: None,
            depth: UNSET,
            movetime: UNSET,
            difficulty: UNSET,
        }
    }

    /// Shorthand for a query without optional fields
    pub fn new(query_type: QueryType, fen: impl Into<String>) -> Result<Self> {
        Self::builder(query_type, fen).build()
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn move_str(&self) -> Option<&str> {
        self.mv.as_deref()
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn movetime(&self) -> i32 {
        self.movetime
    }

    pub fn difficulty(&self) -> i32 {
        self.difficulty
    }

    /// Same request re-targeted at another operation
    pub fn with_type(&self, query_type: QueryType) -> Query {
        Query {
            query_type,
            ..self.clone()
        }
    }

    /// Normalized limits for the `go` command: non-positive values are dropped
    pub fn search_limits(&self) -> SearchLimits {
        let positive = |value: i32| u32::try_from(value).ok().filter(|v| *v > 0);
        SearchLimits {
            depth: positive(self.depth),
            movetime: positive(self.movetime),
            skill_level: u32::try_from(self.difficulty)
                .ok()
                .map(|level| level.min(MAX_SKILL_LEVEL)),
        }
    }
}

/// Builder for [`Query`]
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query_type: QueryType,
    fen: String,
    mv: Option<String>,
    depth: i32,
    movetime: i32,
    difficulty: i32,
}

impl QueryBuilder {
    pub fn depth(mut self, depth: i32) -> Self {
        self.depth = depth;
        self
    }

    pub fn movetime(mut self, movetime_ms: i32) -> Self {
        self.movetime = movetime_ms;
        self
    }

    pub fn difficulty(mut self, skill_level: i32) -> Self {
        self.difficulty = skill_level;
        self
    }

    pub fn with_move(mut self, mv: impl Into<String>) -> Self {
        self.mv = Some(mv.into());
        self
    }

    pub fn build(self) -> Result<Query> {
        let fen = self.fen.trim().to_string();
        if fen.is_empty() {
            return Err(PoolError::Validation("FEN is required".to_string()));
        }
        let mv = self.mv.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
        if self.query_type == QueryType::MakeMove && mv.is_none() {
            return Err(PoolError::Validation(
                "a move is required for make-move queries".to_string(),
            ));
        }
        Ok(Query {
            query_type: self.query_type,
            fen,
            mv,
            depth: self.depth,
            movetime: self.movetime,
            difficulty: self.difficulty,
        })
    }
}

/// Search parameters after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchLimits {
    pub depth: Option<u32>,
    pub movetime: Option<u32>,
    pub skill_level: Option<u32>,
}

impl SearchLimits {
    pub fn go_command(&self) -> String {
        let mut command = String::from("go");
        let depth = match (self.depth, self.movetime) {
            (None, None) => Some(DEFAULT_SEARCH_DEPTH),
            (depth, _) => depth,
        };
        if let Some(depth) = depth {
            command.push_str(&format!(" depth {}", depth));
        }
        if let Some(movetime) = self.movetime {
            command.push_str(&format!(" movetime {}", movetime));
        }
        command
    }
}

/// True for long-algebraic moves such as `e2e4` or `e7e8q`
pub fn is_uci_move(token: &str) -> bool {
    let bytes = token.as_bytes();
    let square = |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);
    match bytes.len() {
        4 => square(bytes[0], bytes[1]) && square(bytes[2], bytes[3]),
        5 => {
            square(bytes[0], bytes[1])
                && square(bytes[2], bytes[3])
                && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}

/// First move-shaped token in `line`, with its byte offset
pub fn find_move_token(line: &str) -> Option<(usize, &str)> {
    let mut offset = 0;
    for token in line.split(' ') {
        let trimmed = token.trim();
        if is_uci_move(trimmed) {
            let lead = token.len() - token.trim_start().len();
            return Some((offset + lead, trimmed));
        }
        offset += token.len() + 1;
    }
    None
}

/// Combined best-move / evaluation answer returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMoveEval {
    pub best_move: String,
    pub eval: String,
    pub continuation: String,
    pub mate: String, // Empty when no forced mate was found
}

impl BestMoveEval {
    /// Assemble from a `"<mate>|<continuation>"` best-move response and an evaluation score
    pub fn from_responses(best_move_response: &str, eval: &str) -> Self {
        let (mate, continuation) = match best_move_response.split_once('|') {
            Some((mate, continuation)) => (mate.trim(), continuation.trim()),
            None => ("", best_move_response.trim()),
        };
        let best_move = continuation
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            best_move,
            eval: eval.trim().to_string(),
            continuation: continuation.to_string(),
            mate: mate.to_string(),
        }
    }
}

impl fmt::Display for BestMoveEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.best_move, self.eval)
    }
}
