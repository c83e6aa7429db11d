//! Warden evaluator and host runtime.
//!
//! ```text
//! Source → Parser → Checker → Evaluator
//!                                 │
//!                     Context checks, routines, imports
//! ```
//!
//! A [`Runtime`] holds what the host provides: global values, native
//! functions, record methods and configuration. [`Runtime::run`] parses and
//! checks a module, then evaluates it as the top-level routine under the
//! supplied [`warden_context::Context`].

mod builtins;
mod config;
mod error;
mod evaluator;
mod import;
mod ops;
mod native;
mod routine;
mod runtime;
mod state;
mod value;

pub use builtins::{FS_READ_LIMIT, HTTP_READ_LIMIT};
pub use config::{ConfigError, RuntimeConfig, MODULE_CONTENT_TYPE};
pub use error::{Error, ErrorKind, EvalError, EvalResult};
pub use import::{sha256_hex, FetchError, HttpFetcher, Importer, ModuleFetcher};
pub use native::{
    EntityAccess, NativeCall, NativeFunction, NativeResult, ParamKind, Signature, StructShape,
};
pub use routine::{Routine, RoutineGroup, MAX_STACK_HEIGHT};
pub use runtime::{module_requirements, Runtime};
pub use value::{FunctionValue, IntRange, LazyValue, Object, Record, Value};
