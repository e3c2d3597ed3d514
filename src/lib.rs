//! # UCI Engine Pool
//!
//! Chess-position analysis backed by a pool of UCI engine subprocesses (Stockfish or
//! any other engine speaking the protocol).
//!
//! ## Features
//!
//! - **Engine pool**: grows on demand up to a cap, prunes dead processes, and keeps
//!   one dedicated evaluator for static-evaluation queries
//! - **UCI client**: best move with continuation and mate count, static evaluation,
//!   legal moves, make-move and checkers over a strict request/response session
//! - **Sync and async dispatch**: blocking calls, or futures on the tokio runtime
//! - **Request pipeline**: FEN validation, per-client throttling and the combined
//!   [`BestMoveEval`] answer
//! - **Batch analysis**: many positions in parallel with a CSV report
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uci_engine_pool::{AnalysisService, EnginePool, PoolConfig, Query, QueryType};
//!
//! let pool = Arc::new(EnginePool::new(&PoolConfig::with_engine_path("stockfish"))?);
//! let service = AnalysisService::new(Arc::clone(&pool));
//!
//! let query = Query::builder(
//!     QueryType::BestMove,
//!     "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
//! )
//! .depth(15)
//! .build()?;
//!
//! let answer = service.best_move_eval(&query)?;
//! println!("{} ({})", answer.best_move, answer.eval);
//!
//! pool.shutdown();
//! # Ok::<(), uci_engine_pool::PoolError>(())
//! ```

// Core modules
pub mod errors;
pub mod config;
pub mod query;

// Engine protocol
pub mod session;
pub mod protocol;
pub mod process;

pub mod resolver;
pub mod pool;

// Request pipeline
pub mod validation;
pub mod throttle;
pub mod service;
pub mod batch;

// Re-export commonly used types
pub use batch::{BatchEntry, BatchSettings};
pub use config::{EngineOption, PoolConfig, Variant};
pub use errors::{PoolError, Result};
pub use pool::{EngineLease, EnginePool};
pub use process::{EngineProcess, EngineRole, LaunchSpec};
pub use protocol::{parse_continuation, NO_MOVE_SENTINEL};
pub use query::{BestMoveEval, Query, QueryBuilder, QueryType, SearchLimits};
pub use resolver::{AssetsResolver, BinaryResolver, FixedPathResolver};
pub use service::AnalysisService;
pub use session::UciSession;
pub use throttle::RequestThrottle;
pub use validation::{FenValidator, PositionValidator, ValidationVerdict};
