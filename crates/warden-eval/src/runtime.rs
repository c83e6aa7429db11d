//! Host embedding: registered globals and methods, configuration, and the
//! entry point that runs a module.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info_span;
use warden_checker::check_module;
use warden_context::{permissions_from_object, Context, Requirements};
use warden_parser::parse_module;
use warden_types::SourceFile;

use crate::builtins;
use crate::config::RuntimeConfig;
use crate::error::{Error, EvalError};
use crate::evaluator::{spawn_routine, RoutineBody};
use crate::import::{HttpFetcher, Importer, ModuleFetcher};
use crate::native::NativeFunction;
use crate::value::{Object, Value};

/// Everything a routine can see of its host. Shared read-only by every
/// routine of a run.
#[derive(Clone)]
pub(crate) struct HostEnv {
    globals: HashMap<String, Value>,
    /// Record type name → method name → function.
    methods: HashMap<String, HashMap<String, Arc<NativeFunction>>>,
    config: RuntimeConfig,
    importer: Arc<Importer>,
}

impl HostEnv {
    pub(crate) fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub(crate) fn method(&self, type_name: &str, name: &str) -> Option<Arc<NativeFunction>> {
        self.methods.get(type_name)?.get(name).cloned()
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn importer(&self) -> &Importer {
        &self.importer
    }
}

/// A configured interpreter.
///
/// ```ignore
/// let mut runtime = Runtime::new().with_builtins();
/// runtime.define_global("greeting", Value::str("hello"));
/// let source = SourceFile::new("main.wd", r#"log(greeting)"#);
/// let context = Context::new(vec![Permission::global(PermissionKind::Use, "*")], vec![]);
/// runtime.run(&source, context)?;
/// ```
pub struct Runtime {
    env: HostEnv,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let importer = Importer::new(
            Box::new(HttpFetcher::new(&config)),
            config.import_cache_capacity,
        );
        Self {
            env: HostEnv {
                globals: HashMap::new(),
                methods: HashMap::new(),
                config,
                importer: Arc::new(importer),
            },
        }
    }

    /// Replace the module fetcher, e.g. with a local or in-memory source.
    pub fn with_fetcher(mut self, fetcher: impl ModuleFetcher + 'static) -> Self {
        self.env.importer = Arc::new(Importer::new(
            Box::new(fetcher),
            self.env.config.import_cache_capacity,
        ));
        self
    }

    /// Register `read_file`, `http_get`, `exec`, `sleep` and `log`.
    pub fn with_builtins(mut self) -> Self {
        builtins::register(&mut self);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.env.config
    }

    /// Make `value` visible as a global to every routine.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.env.globals.insert(name.into(), value);
    }

    /// Register a native function as a global under its own name.
    pub fn define_native(&mut self, native: NativeFunction) {
        let name = native.name().to_string();
        self.define_global(name, Value::Native(Arc::new(native)));
    }

    /// Register a method on records of `type_name`. The method's first
    /// parameter receives the record.
    pub fn register_method(&mut self, type_name: impl Into<String>, method: NativeFunction) {
        self.env
            .methods
            .entry(type_name.into())
            .or_default()
            .insert(method.name().to_string(), Arc::new(method));
    }

    /// Parse, check and run a module as the top-level routine, then wait for
    /// its result.
    pub fn run(&self, source: &SourceFile, context: Context) -> Result<Value, Error> {
        let span = info_span!("run", module = %source.name);
        let _enter = span.enter();

        let module = parse_module(source)?;
        let errors = check_module(&module, source);
        if errors.has_errors() {
            return Err(Error::Check(errors));
        }

        let routine = spawn_routine(
            Arc::new(self.env.clone()),
            context,
            Arc::new(source.clone()),
            Object::new(),
            RoutineBody::Module(Arc::new(module)),
        )?;
        Ok(routine.wait_result()?)
    }

    pub fn run_str(&self, name: &str, text: &str, context: Context) -> Result<Value, Error> {
        self.run(&SourceFile::new(name, text), context)
    }
}

/// The requirements a module declares, empty when it has no `require`
/// block. Hosts can turn them into the context to run the module with.
pub fn module_requirements(source: &SourceFile) -> Result<Requirements, Error> {
    let module = parse_module(source)?;
    match &module.requirements {
        Some(requirements) => {
            permissions_from_object(&requirements.object).map_err(|e| Error::from(EvalError::from(e)))
        }
        None => Ok(Requirements::default()),
    }
}
