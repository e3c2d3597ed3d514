use chess::{Board, Color, Square};
use std::str::FromStr;

/// Outcome of checking a FEN before it is sent to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub description: String,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            description: "Valid position".to_string(),
        }
    }

    pub fn invalid(description: impl Into<String>) -> Self {
        Self {
            valid: false,
            description: description.into(),
        }
    }
}

pub trait PositionValidator: Send + Sync {
    fn validate(&self, fen: &str) -> ValidationVerdict;
}

/// FEN syntax and board sanity through the `chess` crate, plus a king-distance check
#[derive(Debug, Clone, Copy, Default)]
pub struct FenValidator;

impl FenValidator {
    pub fn new() -> Self {
        Self
    }
}

impl PositionValidator for FenValidator {
    fn validate(&self, fen: &str) -> ValidationVerdict {
        let fen = fen.trim();
        if fen.is_empty() {
            return ValidationVerdict::invalid("Empty FEN");
        }

        let board = match Board::from_str(fen) {
            Ok(board) => board,
            Err(e) => return ValidationVerdict::invalid(format!("Illegal FEN '{}': {}", fen, e)),
        };

        if kings_adjacent(&board) {
            return ValidationVerdict::invalid("Kings are placed on adjacent squares");
        }

        ValidationVerdict::valid()
    }
}

fn kings_adjacent(board: &Board) -> bool {
    let white = board.king_square(Color::White);
    let black = board.king_square(Color::Black);
    chebyshev_distance(white, black) <= 1
}

fn chebyshev_distance(a: Square, b: Square) -> usize {
    let ranks = a.get_rank().to_index().abs_diff(b.get_rank().to_index());
    let files = a.get_file().to_index().abs_diff(b.get_file().to_index());
    ranks.max(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_position_is_valid() {
        let verdict =
            FenValidator::new().validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        assert!(verdict.valid, "{}", verdict.description);
    }

    #[test]
    fn test_adjacent_kings_are_rejected() {
        let verdict = FenValidator::new().validate("8/8/8/3kK3/8/8/8/8 w - - 0 1");
        assert!(!verdict.valid);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let validator = FenValidator::new();
        assert!(!validator.validate("").valid);
        assert!(!validator.validate("not a fen").valid);
        // Missing black king
        assert!(!validator.validate("8/8/8/8/8/8/8/4K3 w - - 0 1").valid);
    }

    #[test]
    fn test_chebyshev_distance() {
        assert_eq!(chebyshev_distance(Square::E1, Square::E8), 7);
        assert_eq!(chebyshev_distance(Square::E4, Square::F5), 1);
        assert_eq!(chebyshev_distance(Square::A1, Square::A1), 0);
    }
}
