//! Routines: module fragments evaluated on their own thread.
//!
//! A routine owns its state outright. The only thing it shares with its
//! spawner is the result slot, which is written once when the routine ends
//! and read any number of times by `wait_result`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{panic_message, EvalError, EvalResult};
use crate::value::Value;

static NEXT_ROUTINE_ID: AtomicU64 = AtomicU64::new(1);

/// Hard ceiling on call depth. A larger `stack` grant or configured
/// default is clamped to this.
pub const MAX_STACK_HEIGHT: usize = 1024;

/// Native stack reserved per permitted script call, with room for deeply
/// nested expressions inside each function body in unoptimized builds.
const FRAME_STACK_SIZE: usize = 256 * 1024;

/// Native stack for everything outside script calls.
const BASE_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Thread stack size for a routine that may reach `max_height` calls.
pub(crate) fn stack_size(max_height: usize) -> usize {
    BASE_STACK_SIZE + max_height.min(MAX_STACK_HEIGHT) * FRAME_STACK_SIZE
}

/// Handle to a running or finished routine.
pub struct Routine {
    id: u64,
    outcome: Mutex<Option<EvalResult<Value>>>,
    finished: Condvar,
}

impl Routine {
    /// Start `body` on a new thread with `stack_size` bytes of stack.
    pub(crate) fn spawn<F>(stack_size: usize, body: F) -> EvalResult<Arc<Routine>>
    where
        F: FnOnce() -> EvalResult<Value> + Send + 'static,
    {
        let id = NEXT_ROUTINE_ID.fetch_add(1, Ordering::Relaxed);
        let routine = Arc::new(Routine {
            id,
            outcome: Mutex::new(None),
            finished: Condvar::new(),
        });
        let handle = Arc::clone(&routine);
        thread::Builder::new()
            .name(format!("warden-routine-{id}"))
            .stack_size(stack_size)
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(routine = id, %message, "routine panicked");
                        Err(EvalError::RoutinePanic(message))
                    }
                };
                match &outcome {
                    Ok(_) => debug!(routine = id, "routine finished"),
                    Err(e) => debug!(routine = id, error = %e, "routine failed"),
                }
                handle.finish(outcome);
            })
            .map_err(|e| EvalError::Runtime(format!("cannot start routine: {e}")))?;
        Ok(routine)
    }

    fn finish(&self, outcome: EvalResult<Value>) {
        *self.outcome.lock() = Some(outcome);
        self.finished.notify_all();
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_done(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Block until the routine ends and return its outcome. Later calls
    /// return the same outcome.
    pub fn wait_result(&self) -> EvalResult<Value> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.finished.wait(&mut outcome);
        }
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Routines spawned into the same named group.
#[derive(Debug)]
pub struct RoutineGroup {
    name: String,
    routines: Mutex<Vec<Arc<Routine>>>,
}

impl RoutineGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routines: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, routine: Arc<Routine>) {
        self.routines.lock().push(routine);
    }

    pub fn len(&self) -> usize {
        self.routines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every member in spawn order. The first failure is returned
    /// once every earlier member has been waited for.
    pub fn wait_all_results(&self) -> EvalResult<Vec<Value>> {
        let routines = self.routines.lock().clone();
        routines.iter().map(|r| r.wait_result()).collect()
    }
}
