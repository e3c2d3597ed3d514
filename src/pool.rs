//! Engine pool: selection, on-demand growth, dead-engine pruning and dispatch.
//!
//! Selection and busy-marking happen under one pool-wide lock. Protocol I/O runs
//! on the leased engine with the lock released, so requests against different
//! engines proceed in parallel.

use log::{debug, error, info, warn};
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::errors::{PoolError, Result};
use crate::process::{EngineProcess, EngineRole, LaunchSpec};
use crate::query::{Query, QueryType};
use crate::resolver::{resolver_for, BinaryResolver};

struct PoolState {
    engines: Vec<Arc<EngineProcess>>,
    evaluator: Arc<EngineProcess>,
    next_id: usize,
    shut_down: bool,
}

impl PoolState {
    fn take_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct EnginePool {
    state: Mutex<PoolState>,
    evaluator_idle: Condvar,
    regular_spec: LaunchSpec,
    evaluator_spec: LaunchSpec,
    max_instances: usize,
    poll_interval: Duration,
}

impl EnginePool {
    /// Resolve the executables and start `initial_instances` engines plus the evaluator
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let resolver = resolver_for(config)?;
        Self::with_resolver(config, resolver.as_ref())
    }

    pub fn with_resolver(config: &PoolConfig, resolver: &dyn BinaryResolver) -> Result<Self> {
        config.validate()?;
        let launch_spec = |version| -> Result<LaunchSpec> {
            Ok(LaunchSpec {
                program: resolver.resolve(config.variant, version)?,
                args: config.engine_args.clone(),
                options: config.options.clone(),
                handshake_timeout: config.handshake_timeout(),
                stall_window: config.eval_stall_window(),
            })
        };
        let regular_spec = launch_spec(config.engine_version)?;
        let evaluator_spec = launch_spec(config.evaluator_version)?;

        // Engines spawned before a failure are dropped, which kills their processes
        let mut engines = Vec::with_capacity(config.max_instances);
        for id in 0..config.initial_instances {
            engines.push(Arc::new(EngineProcess::spawn(
                id,
                EngineRole::Regular,
                &regular_spec,
            )?));
        }
        let evaluator_id = config.initial_instances;
        let evaluator = Arc::new(EngineProcess::spawn(
            evaluator_id,
            EngineRole::Evaluator,
            &evaluator_spec,
        )?);

        info!(
            "Engine pool ready: {} engine(s) of max {}, evaluator {}",
            engines.len(),
            config.max_instances,
            evaluator_spec.program.display()
        );

        Ok(Self {
            state: Mutex::new(PoolState {
                engines,
                evaluator,
                next_id: evaluator_id + 1,
                shut_down: false,
            }),
            evaluator_idle: Condvar::new(),
            regular_spec,
            evaluator_spec,
            max_instances: config.max_instances,
            poll_interval: config.evaluator_poll_interval(),
        })
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Run `query` on a suitable engine and return the raw operation result
    pub fn dispatch(&self, query: &Query) -> Result<String> {
        let engine = self.select_engine(query.query_type())?;
        debug!("{} dispatched to {}", query.query_type(), engine.label());
        engine.execute(query)
    }

    /// [`dispatch`](Self::dispatch) on the blocking thread pool
    pub async fn dispatch_async(self: &Arc<Self>, query: Query) -> Result<String> {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.dispatch(&query)).await?
    }

    /// Prune, then lease the evaluator (waiting for it if necessary) for `Eval`,
    /// or the first idle regular engine, spawning one if below the cap.
    pub fn select_engine(&self, query_type: QueryType) -> Result<EngineLease<'_>> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(PoolError::ShutDown);
        }
        prune(&mut state);

        let engine = if query_type == QueryType::Eval {
            state = self.wait_for_evaluator(state)?;
            Arc::clone(&state.evaluator)
        } else {
            self.idle_or_spawned(&mut state)?
        };
        engine.set_busy(true);
        drop(state);

        Ok(EngineLease { pool: self, engine })
    }

    /// Remove every dead regular engine from the pool and return them
    pub fn prune_dead_engines(&self) -> Vec<Arc<EngineProcess>> {
        prune(&mut self.lock_state())
    }

    /// Close every engine. Failures are logged and do not stop the remaining closes.
    pub fn shutdown(&self) {
        let engines = {
            let mut state = self.lock_state();
            if state.shut_down {
                debug!("Engine pool already shut down");
                return;
            }
            state.shut_down = true;
            let mut engines: Vec<_> = state.engines.drain(..).collect();
            engines.push(Arc::clone(&state.evaluator));
            engines
        };
        // Evaluator waiters observe the flag and give up
        self.evaluator_idle.notify_all();

        for engine in &engines {
            match engine.close() {
                Ok(()) => debug!("{} closed", engine.label()),
                Err(e) => error!("Failed to close {}: {}", engine.label(), e),
            }
        }
        info!("Engine pool shut down ({} engine(s) closed)", engines.len());
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shut_down
    }

    pub fn regular_count(&self) -> usize {
        self.lock_state().engines.len()
    }

    pub fn engine_ids(&self) -> Vec<usize> {
        self.lock_state().engines.iter().map(|e| e.id()).collect()
    }

    pub fn engine(&self, id: usize) -> Option<Arc<EngineProcess>> {
        let state = self.lock_state();
        if state.evaluator.id() == id {
            return Some(Arc::clone(&state.evaluator));
        }
        state.engines.iter().find(|e| e.id() == id).cloned()
    }

    pub fn evaluator_id(&self) -> usize {
        self.lock_state().evaluator.id()
    }

    /// Busy engines, evaluator included
    pub fn busy_count(&self) -> usize {
        let state = self.lock_state();
        state
            .engines
            .iter()
            .chain(std::iter::once(&state.evaluator))
            .filter(|e| e.is_busy())
            .count()
    }

    fn wait_for_evaluator<'a>(
        &self,
        mut state: MutexGuard<'a, PoolState>,
    ) -> Result<MutexGuard<'a, PoolState>> {
        loop {
            if state.shut_down {
                return Err(PoolError::ShutDown);
            }
            if state.evaluator.is_dead() {
                self.respawn_evaluator(&mut state)?;
            }
            if !state.evaluator.is_busy() {
                return Ok(state);
            }
            // No overall timeout: a caller waits for as long as the evaluator stays busy
            state = self
                .evaluator_idle
                .wait_timeout(state, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn respawn_evaluator(&self, state: &mut PoolState) -> Result<()> {
        let dead = &state.evaluator;
        warn!(
            "{} (pid {}) is dead, status {:?}; starting a new evaluator",
            dead.label(),
            dead.pid(),
            dead.exit_status()
        );
        dead.cleanup();
        let id = state.take_id();
        let evaluator = EngineProcess::spawn(id, EngineRole::Evaluator, &self.evaluator_spec)?;
        state.evaluator = Arc::new(evaluator);
        Ok(())
    }

    fn idle_or_spawned(&self, state: &mut PoolState) -> Result<Arc<EngineProcess>> {
        if let Some(engine) = state
            .engines
            .iter()
            .find(|e| e.role() == EngineRole::Regular && !e.is_busy() && !e.is_dead())
        {
            return Ok(Arc::clone(engine));
        }

        let size = state.engines.len();
        if size >= self.max_instances {
            return Err(PoolError::PoolExhausted {
                size,
                threshold: self.max_instances,
            });
        }

        let id = state.take_id();
        let engine = Arc::new(EngineProcess::spawn(
            id,
            EngineRole::Regular,
            &self.regular_spec,
        )?);
        info!("Pool grew to {} engine(s)", size + 1);
        state.engines.push(Arc::clone(&engine));
        Ok(engine)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EnginePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn prune(state: &mut PoolState) -> Vec<Arc<EngineProcess>> {
    let (dead, alive): (Vec<_>, Vec<_>) = state.engines.drain(..).partition(|e| e.is_dead());
    state.engines = alive;

    for engine in &dead {
        warn!(
            "Pruning dead {} (pid {}), exit status {:?}",
            engine.label(),
            engine.pid(),
            engine.exit_status()
        );
        engine.cleanup();
    }
    dead
}

/// An engine marked busy for the lifetime of the lease. Dropping the lease marks
/// it idle again and wakes callers waiting for the evaluator.
pub struct EngineLease<'a> {
    pool: &'a EnginePool,
    engine: Arc<EngineProcess>,
}

impl EngineLease<'_> {
    pub fn engine(&self) -> &Arc<EngineProcess> {
        &self.engine
    }
}

impl Deref for EngineLease<'_> {
    type Target = EngineProcess;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl Drop for EngineLease<'_> {
    fn drop(&mut self) {
        // Cleared under the pool lock so a waiter can not miss the wakeup
        let state = self.pool.lock_state();
        self.engine.set_busy(false);
        drop(state);
        self.pool.evaluator_idle.notify_all();
    }
}
