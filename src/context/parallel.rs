//! Parallel execution on a rayon scope.
//!
//! The root copy runs on the invoking side of the scope; every scheduled continuation is
//! spawned onto the scope and may itself spawn more. The scope joins all of them before
//! [`run`] returns, which is the only blocking point of the invocation.
//!
//! ## Failure handling
//!
//! Cancellation is cooperative. The first failure is captured and flips the `running` flag;
//! from then on `schedule` drops new continuations and spawned tasks that have not started yet
//! return immediately. Tasks already running are not interrupted. The captured error is
//! reported as [`CloneError::Execution`] unless the root copy itself failed, in which case
//! that error is returned as is. A panic inside a continuation is caught and reported like
//! any other failure; the slot its copier had reserved is failed so that waiters wake up.
//!
//! ## Concurrent discovery
//!
//! Two tasks reaching the same original race on the identity cache's atomic get-or-insert;
//! exactly one reserves the slot and builds the clone, the other parks on the slot's private
//! condvar until the clone is registered.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rayon::{Scope, ThreadPool};
use tracing::warn;

use crate::error::{CloneError, Result};
use crate::model::{Obj, Value};

use super::{Continuation, CopyContext, CopyCore};

/// State shared by every task of one parallel invocation.
struct ParallelState<'c> {
    core: &'c CopyCore,
    running: AtomicBool,
    failure: Mutex<Option<CloneError>>,
    submitted: AtomicUsize,
    cancelled: AtomicUsize,
}

impl<'c> ParallelState<'c> {
    fn new(core: &'c CopyCore) -> Self {
        Self {
            core,
            running: AtomicBool::new(true),
            failure: Mutex::new(None),
            submitted: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    fn signal_error(&self, err: CloneError) {
        let mut guard = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(err);
            self.running.store(false, Ordering::SeqCst);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn cancel_one(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn take_failure(&self) -> Option<CloneError> {
        self.failure.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Context spawning continuations onto a rayon scope.
pub struct ParallelCopyContext<'a, 'scope> {
    state: &'scope ParallelState<'scope>,
    scope: &'a Scope<'scope>,
}

impl CopyContext for ParallelCopyContext<'_, '_> {
    fn copy(&self, value: &Value) -> Result<Value> {
        self.state.core.copy(value, self)
    }

    fn register(&self, original: &Obj, clone: &Obj) -> Result<()> {
        self.state.core.register(original, clone)
    }

    fn schedule(&self, task: Continuation) -> Result<()> {
        if !self.state.is_running() {
            self.state.cancel_one();
            return Ok(());
        }

        let state = self.state;
        state.submitted.fetch_add(1, Ordering::Relaxed);
        self.scope.spawn(move |scope| {
            // Fast abort check
            if !state.is_running() {
                state.cancel_one();
                return;
            }
            state.core.count_continuation();
            let ctx = ParallelCopyContext { state, scope };
            // Panics are reported like errors.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(&ctx)))
                .unwrap_or_else(|payload| Err(panicked(payload)));
            if let Err(err) = outcome {
                state.signal_error(err);
            }
        });
        Ok(())
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> CloneError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());
    CloneError::Internal(format!("continuation panicked: {message}"))
}

fn copy_root<'scope>(
    state: &'scope ParallelState<'scope>,
    scope: &Scope<'scope>,
    root: &Value,
) -> Result<Value> {
    let ctx = ParallelCopyContext { state, scope };
    ctx.copy(root).inspect_err(|err| state.signal_error(err.clone()))
}

/// Copies `root` on `pool` (the global rayon pool when `None`) and waits for every spawned
/// continuation.
pub fn run(core: &CopyCore, pool: Option<&ThreadPool>, root: &Value) -> Result<Value> {
    let state = ParallelState::new(core);

    let copied = match pool {
        Some(pool) => pool.scope(|scope| copy_root(&state, scope, root)),
        None => rayon::scope(|scope| copy_root(&state, scope, root)),
    };

    let failure = state.take_failure();
    match (copied, failure) {
        (Err(err), _) => {
            warn!(
                submitted = state.submitted.load(Ordering::Relaxed),
                cancelled = state.cancelled.load(Ordering::Relaxed),
                error = %err,
                "parallel clone failed on the root copy"
            );
            Err(err)
        }
        (Ok(_), Some(err)) => {
            warn!(
                submitted = state.submitted.load(Ordering::Relaxed),
                cancelled = state.cancelled.load(Ordering::Relaxed),
                error = %err,
                "parallel clone failed, outstanding continuations cancelled"
            );
            Err(CloneError::Execution(Arc::new(err)))
        }
        (Ok(copied), None) => Ok(copied),
    }
}
