//! Request-level analysis API on top of the pool.

use log::{debug, info};
use std::sync::Arc;

use crate::errors::{PoolError, Result};
use crate::pool::EnginePool;
use crate::query::{BestMoveEval, Query, QueryType};
use crate::throttle::RequestThrottle;
use crate::validation::{FenValidator, PositionValidator};

pub struct AnalysisService {
    pool: Arc<EnginePool>,
    validator: Box<dyn PositionValidator>,
    throttle: Option<RequestThrottle>,
}

impl AnalysisService {
    pub fn new(pool: Arc<EnginePool>) -> Self {
        Self {
            pool,
            validator: Box::new(FenValidator::new()),
            throttle: None,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn PositionValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn pool(&self) -> &Arc<EnginePool> {
        &self.pool
    }

    /// Admission check for one request from `client`; always passes without a throttle
    pub fn admit(&self, client: &str) -> Result<()> {
        match &self.throttle {
            Some(throttle) => throttle.admit(client),
            None => Ok(()),
        }
    }

    /// Reject the query's position before any engine is contacted
    pub fn validate(&self, query: &Query) -> Result<()> {
        let verdict = self.validator.validate(query.fen());
        if verdict.valid {
            Ok(())
        } else {
            debug!("Rejected '{}': {}", query.fen(), verdict.description);
            Err(PoolError::Validation(verdict.description))
        }
    }

    /// Validate, then run the query as given
    pub fn respond(&self, query: &Query) -> Result<String> {
        self.validate(query)?;
        self.pool.dispatch(query)
    }

    pub async fn respond_async(&self, query: Query) -> Result<String> {
        self.validate(&query)?;
        self.pool.dispatch_async(query).await
    }

    /// Best move with continuation and mate count, plus the static evaluation
    pub fn best_move_eval(&self, query: &Query) -> Result<BestMoveEval> {
        self.validate(query)?;
        let best_move = self.pool.dispatch(&query.with_type(QueryType::BestMove))?;
        let eval = self.pool.dispatch(&query.with_type(QueryType::Eval))?;
        let result = BestMoveEval::from_responses(&best_move, &eval);
        info!("{}: {}", query.fen(), result);
        Ok(result)
    }

    /// [`best_move_eval`](Self::best_move_eval) with both searches in flight at once
    pub async fn best_move_eval_async(&self, query: &Query) -> Result<BestMoveEval> {
        self.validate(query)?;
        let (best_move, eval) = tokio::join!(
            self.pool.dispatch_async(query.with_type(QueryType::BestMove)),
            self.pool.dispatch_async(query.with_type(QueryType::Eval)),
        );
        let result = BestMoveEval::from_responses(&best_move?, &eval?);
        info!("{}: {}", query.fen(), result);
        Ok(result)
    }
}
