//! Tree-walking evaluator.
//!
//! One [`Evaluator`] drives one routine's [`State`]. Every access to a
//! global, every host call and every routine creation is checked against the
//! routine's context first; locals and constants are never checked.

use std::sync::Arc;

use tracing::{debug, info_span};
use warden_checker::{check_fragment, check_module};
use warden_context::{
    permissions_from_object, Context, Host, HostPattern, Path, PathPattern, Permission,
    PermissionKind, Requirements, Url, UrlPattern,
};
use warden_parser::parse_module;
use warden_types::ast::{
    BinaryOp, Block, Case, ElseBranch, ForStmt, FunctionExpr, IfStmt, ImportStmt, Module, Node,
    NodeKind, ObjectProperty, Slice, SpawnExpr,
};
use warden_types::{CheckErrors, SourceFile};

use crate::error::{mismatch, EvalError, EvalResult};
use crate::ops::{
    binary, byte_amount, index_value, member, quantity, set_path, slice_value, test_matcher,
    Accessor, AssignRoot,
};
use crate::native::{unwrap_must, NativeFunction};
use crate::config::RuntimeConfig;
use crate::routine::{self, Routine, RoutineGroup, MAX_STACK_HEIGHT};
use crate::runtime::HostEnv;
use crate::state::{LoopSignal, State};
use crate::value::{FunctionValue, IntRange, LazyValue, Object, Value};

/// Permissions a routine loses unless its spawner grants them explicitly.
fn stripped_permissions() -> [Permission; 4] {
    [
        Permission::global(PermissionKind::Read, "*"),
        Permission::global(PermissionKind::Update, "*"),
        Permission::global(PermissionKind::Create, "*"),
        Permission::Routine,
    ]
}

/// A resolved call target.
enum Callee {
    Value(Value),
    Method { receiver: Value, name: String },
}

/// What a spawned routine runs.
pub(crate) enum RoutineBody {
    Module(Arc<Module>),
    Call { callee: Value, args: Vec<Value> },
    Lazy(LazyValue),
}

impl RoutineBody {
    /// The module text the body was written in, when it differs from the
    /// spawner's.
    fn source(&self) -> Option<&Arc<SourceFile>> {
        match self {
            RoutineBody::Call {
                callee: Value::Function(f),
                ..
            } => Some(&f.source),
            RoutineBody::Lazy(lazy) => Some(&lazy.source),
            _ => None,
        }
    }
}

/// Start a routine with `globals` layered over the host globals.
pub(crate) fn spawn_routine(
    host: Arc<HostEnv>,
    context: Context,
    source: Arc<SourceFile>,
    globals: Object,
    body: RoutineBody,
) -> EvalResult<Arc<Routine>> {
    let mut base = host.globals().clone();
    base.extend(globals);
    let stack = routine::stack_size(stack_ceiling(&context, host.config()));
    let state = State::new(context, source, base);
    Routine::spawn(stack, move || {
        let mut state = state;
        let span = info_span!("routine", module = %state.source().name);
        let _enter = span.enter();
        let mut evaluator = Evaluator::new(&mut state, &host);
        evaluator.run_body(body)
    })
}

/// The call depth a routine may reach: its `stack` grant, or the configured
/// default, never more than [`MAX_STACK_HEIGHT`].
pub(crate) fn stack_ceiling(context: &Context, config: &RuntimeConfig) -> usize {
    context
        .max_stack_height()
        .unwrap_or(config.max_stack_height)
        .min(MAX_STACK_HEIGHT)
}

// ══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) struct Evaluator<'a> {
    state: &'a mut State,
    host: &'a Arc<HostEnv>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(state: &'a mut State, host: &'a Arc<HostEnv>) -> Self {
        Self { state, host }
    }

    pub(crate) fn run_body(&mut self, body: RoutineBody) -> EvalResult<Value> {
        match body {
            RoutineBody::Module(module) => self.run_module(&module),
            RoutineBody::Call { callee, args } => self.invoke(Callee::Value(callee), args, false),
            RoutineBody::Lazy(lazy) => self.eval(&lazy.node),
        }
    }

    // ── Modules ──────────────────────────────────────────────────────────────

    /// Run a module to completion and return the value of its `return`.
    pub(crate) fn run_module(&mut self, module: &Module) -> EvalResult<Value> {
        if let Some(requirements) = &module.requirements {
            let requirements = permissions_from_object(&requirements.object)?;
            self.check_requirements(&requirements)?;
            self.state.narrow_limits(&requirements.limits)?;
        }
        for constant in &module.constants {
            let value = self.eval(&constant.value)?;
            self.state.define_constant(constant.name.name.clone(), value);
        }
        for stmt in &module.statements {
            if let NodeKind::FunctionDecl(decl) = &stmt.kind {
                let value = self.function_value(&decl.function);
                self.state.set_global(decl.name.name.clone(), value);
            }
        }
        self.exec_statements(&module.statements)?;
        Ok(self.state.pending_return.take().unwrap_or(Value::Nil))
    }

    /// A module may only run in a context that grants everything it requires.
    /// Its declared limits are installed separately and may only tighten.
    fn check_requirements(&self, requirements: &Requirements) -> EvalResult<()> {
        for permission in &requirements.permissions {
            self.state.context().check(permission)?;
        }
        Ok(())
    }

    fn exec_statements(&mut self, stmts: &[Node]) -> EvalResult<()> {
        for stmt in stmts {
            self.eval(stmt).map_err(|e| e.at(stmt.span))?;
            if self.state.pending_return.is_some() || self.state.signal.is_some() {
                break;
            }
        }
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    pub(crate) fn eval(&mut self, node: &Node) -> EvalResult<Value> {
        match &node.kind {
            NodeKind::Nil => Ok(Value::Nil),
            NodeKind::Bool(b) => Ok(Value::Bool(*b)),
            NodeKind::Int(i) => Ok(Value::Int(*i)),
            NodeKind::Float(f) => Ok(Value::Float(*f)),
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            NodeKind::Quantity { value, unit } => quantity(*value, *unit),
            NodeKind::Rate { value, unit } => byte_amount(*value, *unit).map(Value::ByteRate),
            NodeKind::IntRange {
                start,
                end,
                exclusive,
            } => Ok(Value::IntRange(IntRange::new(*start, *end, *exclusive))),
            NodeKind::AbsPath(p) | NodeKind::RelPath(p) => Ok(Value::Path(Path::new(p.as_str())?)),
            NodeKind::PathPattern { pattern, .. } => {
                Ok(Value::PathPattern(PathPattern::new(pattern.as_str())?))
            }
            NodeKind::PathExpr { slices, .. } => {
                let text = self.interpolate(slices)?;
                Ok(Value::Path(Path::new(text)?))
            }
            NodeKind::Url(u) => Ok(Value::Url(Url::new(u.as_str())?)),
            NodeKind::Host(h) => Ok(Value::Host(Host::new(h.as_str())?)),
            NodeKind::UrlPattern { pattern, .. } => {
                Ok(Value::UrlPattern(UrlPattern::new(pattern.as_str())?))
            }
            NodeKind::HostPattern(p) => Ok(Value::HostPattern(HostPattern::new(p.as_str())?)),
            NodeKind::UrlExpr { slices } => {
                let text = self.interpolate(slices)?;
                Ok(Value::Url(Url::new(text)?))
            }

            NodeKind::Object(properties) => self.eval_object(properties),
            NodeKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            NodeKind::KeyList(keys) => Ok(Value::KeyList(keys.iter().map(|k| k.name.clone()).collect())),
            NodeKind::Function(function) => Ok(self.function_value(function)),
            NodeKind::Lazy(inner) => Ok(Value::Lazy(LazyValue {
                node: Arc::clone(inner),
                source: Arc::clone(self.state.source()),
            })),
            NodeKind::EmbeddedModule(_) => Err(EvalError::Runtime(
                "an embedded module can only be the body of a routine".into(),
            )),

            NodeKind::LocalVar(name) => self.read_local(name),
            NodeKind::GlobalVar(name) | NodeKind::Identifier(name) => self.read_global(name),

            NodeKind::Member { object, property } => {
                let value = self.eval(object)?;
                member(value, &property.name)
            }
            NodeKind::Index { indexed, index } => {
                let value = self.eval(indexed)?;
                let index = self.eval(index)?;
                index_value(value, index)
            }
            NodeKind::Slice {
                indexed,
                start,
                end,
            } => {
                let value = self.eval(indexed)?;
                let start = self.eval_bound(start.as_deref())?;
                let end = self.eval_bound(end.as_deref())?;
                slice_value(value, start, end)
            }
            NodeKind::Call { callee, args, must } => {
                let target = self.resolve_callee(callee)?;
                let args = self.eval_args(args)?;
                self.invoke(target, args, *must)
            }

            NodeKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            NodeKind::Not(inner) => match self.eval(inner)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(mismatch("a bool after '!'", &other)),
            },
            NodeKind::UpperBoundRange(inner) => match self.eval(inner)? {
                Value::Int(end) => Ok(Value::IntRange(IntRange::new(0, end, false))),
                other => Err(mismatch("an int upper bound", &other)),
            },
            NodeKind::Paren(inner) => self.eval(inner),

            NodeKind::Spawn(spawn) => self.eval_spawn(spawn),

            NodeKind::Assignment { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
                Ok(Value::Nil)
            }
            NodeKind::If(stmt) => {
                self.exec_if(stmt)?;
                Ok(Value::Nil)
            }
            NodeKind::For(stmt) => {
                self.exec_for(stmt)?;
                Ok(Value::Nil)
            }
            NodeKind::Switch(stmt) => {
                let discriminant = self.eval(&stmt.discriminant)?;
                self.exec_cases(&discriminant, &stmt.cases, stmt.default.as_ref(), |case, d| case == d)?;
                Ok(Value::Nil)
            }
            NodeKind::Match(stmt) => {
                let discriminant = self.eval(&stmt.discriminant)?;
                self.exec_cases(&discriminant, &stmt.cases, stmt.default.as_ref(), test_matcher)?;
                Ok(Value::Nil)
            }
            NodeKind::Break => {
                self.state.signal = Some(LoopSignal::Break);
                Ok(Value::Nil)
            }
            NodeKind::Continue => {
                self.state.signal = Some(LoopSignal::Continue);
                Ok(Value::Nil)
            }
            NodeKind::Return(value) => {
                let value = match value {
                    Some(v) => self.eval(v)?,
                    None => Value::Nil,
                };
                self.state.pending_return = Some(value);
                Ok(Value::Nil)
            }
            // bound when the module starts
            NodeKind::FunctionDecl(_) => Ok(Value::Nil),
            NodeKind::Import(import) => {
                self.exec_import(import)?;
                Ok(Value::Nil)
            }
            NodeKind::Block(block) => {
                self.exec_statements(&block.stmts)?;
                Ok(Value::Nil)
            }
        }
    }

    fn function_value(&self, function: &Arc<FunctionExpr>) -> Value {
        Value::Function(FunctionValue {
            function: Arc::clone(function),
            source: Arc::clone(self.state.source()),
        })
    }

    fn eval_object(&mut self, properties: &[ObjectProperty]) -> EvalResult<Value> {
        let mut object = Object::new();
        let mut implicit = 0usize;
        for property in properties {
            let value = self.eval(&property.value)?;
            let key = match &property.key {
                Some(key) => key.name.clone(),
                None => {
                    implicit += 1;
                    implicit.to_string()
                }
            };
            object.insert(key, value);
        }
        if implicit > 0 {
            object.insert("len".into(), Value::Int(implicit as i64));
        }
        Ok(Value::Object(object))
    }

    fn eval_args(&mut self, args: &[Node]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn eval_bound(&mut self, bound: Option<&Node>) -> EvalResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(node) => match self.eval(node)? {
                Value::Int(i) => Ok(Some(i)),
                other => Err(mismatch("an int slice bound", &other)),
            },
        }
    }

    /// Build the text of an interpolated path or URL. Interpolated values
    /// cannot introduce new segments.
    fn interpolate(&self, slices: &[Slice]) -> EvalResult<String> {
        let mut text = String::new();
        for slice in slices {
            match slice {
                Slice::Literal(s) => text.push_str(s),
                Slice::Interpolation(ident) => match self.read_local(&ident.name)? {
                    Value::Str(s) => {
                        if s.contains('/') || s == ".." || s == "." {
                            return Err(EvalError::Runtime(format!(
                                "interpolated value {s:?} would change the path structure"
                            )));
                        }
                        text.push_str(&s);
                    }
                    Value::Int(i) => text.push_str(&i.to_string()),
                    other => return Err(mismatch("a string or an int to interpolate", &other)),
                },
            }
        }
        Ok(text)
    }

    // ── Variables ────────────────────────────────────────────────────────────

    fn read_local(&self, name: &str) -> EvalResult<Value> {
        self.state
            .local(name)
            .cloned()
            .ok_or_else(|| EvalError::UndeclaredLocal(name.to_string()))
    }

    fn read_global(&self, name: &str) -> EvalResult<Value> {
        if !self.state.is_constant(name) {
            self.state
                .context()
                .check(&Permission::global(PermissionKind::Read, name))?;
        }
        self.global_unchecked(name)
    }

    fn global_unchecked(&self, name: &str) -> EvalResult<Value> {
        self.state
            .global(name)
            .cloned()
            .ok_or_else(|| EvalError::UndeclaredGlobal(name.to_string()))
    }

    fn assign(&mut self, target: &Node, value: Value) -> EvalResult<()> {
        let mut path = Vec::new();
        let root = self.assignment_path(target, &mut path)?;
        match root {
            AssignRoot::Local(name) => {
                if path.is_empty() {
                    self.state.set_local(name, value);
                    return Ok(());
                }
                let slot = self
                    .state
                    .local_mut(&name)
                    .ok_or(EvalError::UndeclaredLocal(name))?;
                set_path(slot, &path, value)
            }
            AssignRoot::Global(name) => {
                if self.state.is_constant(&name) {
                    return Err(EvalError::ConstantReassigned(name));
                }
                let exists = self.state.global(&name).is_some();
                if !exists && !path.is_empty() {
                    return Err(EvalError::UndeclaredGlobal(name));
                }
                let kind = if exists {
                    PermissionKind::Update
                } else {
                    PermissionKind::Create
                };
                self.state
                    .context()
                    .check(&Permission::global(kind, name.as_str()))?;
                if path.is_empty() {
                    self.state.set_global(name, value);
                    return Ok(());
                }
                let slot = self
                    .state
                    .global_mut(&name)
                    .ok_or(EvalError::UndeclaredGlobal(name))?;
                set_path(slot, &path, value)
            }
        }
    }

    /// Resolve an assignment target to its variable and the accessors below
    /// it. Index expressions are evaluated left to right.
    fn assignment_path(&mut self, node: &Node, path: &mut Vec<Accessor>) -> EvalResult<AssignRoot> {
        match &node.kind {
            NodeKind::LocalVar(name) => Ok(AssignRoot::Local(name.clone())),
            NodeKind::GlobalVar(name) => Ok(AssignRoot::Global(name.clone())),
            NodeKind::Member { object, property } => {
                let root = self.assignment_path(object, path)?;
                path.push(Accessor::Key(property.name.clone()));
                Ok(root)
            }
            NodeKind::Index { indexed, index } => {
                let root = self.assignment_path(indexed, path)?;
                match self.eval(index)? {
                    Value::Int(i) => path.push(Accessor::Index(i)),
                    other => return Err(mismatch("an int index", &other)),
                }
                Ok(root)
            }
            _ => Err(EvalError::Runtime("invalid assignment target".into())),
        }
    }

    // ── Calls ────────────────────────────────────────────────────────────────

    /// Calling a global needs `use` on its name, not `read`.
    fn check_use(&self, name: &str) -> EvalResult<()> {
        self.state
            .context()
            .check(&Permission::global(PermissionKind::Use, name))?;
        Ok(())
    }

    fn resolve_callee(&mut self, callee: &Node) -> EvalResult<Callee> {
        match &callee.kind {
            NodeKind::Identifier(name) | NodeKind::GlobalVar(name) => {
                self.check_use(name)?;
                Ok(Callee::Value(self.global_unchecked(name)?))
            }
            NodeKind::Member { object, property } => {
                let receiver = match global_root(object) {
                    Some(root) => {
                        self.check_use(root)?;
                        self.global_path(object)?
                    }
                    None => self.eval(object)?,
                };
                let is_method = match &receiver {
                    Value::Routine(_) | Value::RoutineGroup(_) => true,
                    Value::Record(record) => {
                        self.host.method(&record.type_name, &property.name).is_some()
                    }
                    _ => false,
                };
                if is_method {
                    Ok(Callee::Method {
                        receiver,
                        name: property.name.clone(),
                    })
                } else {
                    Ok(Callee::Value(member(receiver, &property.name)?))
                }
            }
            _ => Ok(Callee::Value(self.eval(callee)?)),
        }
    }

    /// Evaluate `ns.a.b` rooted at a global without read checks.
    fn global_path(&self, node: &Node) -> EvalResult<Value> {
        match &node.kind {
            NodeKind::Identifier(name) | NodeKind::GlobalVar(name) => self.global_unchecked(name),
            NodeKind::Member { object, property } => member(self.global_path(object)?, &property.name),
            _ => Err(EvalError::Runtime("expected a global member chain".into())),
        }
    }

    fn invoke(&mut self, callee: Callee, args: Vec<Value>, must: bool) -> EvalResult<Value> {
        match callee {
            Callee::Value(Value::Function(function)) => {
                let value = self.call_function(&function, args)?;
                if must {
                    unwrap_must("function", 1, value)
                } else {
                    Ok(value)
                }
            }
            Callee::Value(Value::Native(native)) => self.call_native(&native, None, args, must),
            Callee::Value(other) => Err(EvalError::NotCallable(other.type_name())),
            Callee::Method { receiver, name } => self.call_method(receiver, &name, args, must),
        }
    }

    fn max_stack_height(&self) -> usize {
        stack_ceiling(self.state.context(), self.host.config())
    }

    pub(crate) fn call_function(&mut self, function: &FunctionValue, args: Vec<Value>) -> EvalResult<Value> {
        let params = &function.function.params;
        if args.len() != params.len() {
            return Err(EvalError::Arity {
                name: "function".into(),
                expected: params.len().to_string(),
                found: args.len(),
            });
        }
        let max = self.max_stack_height();
        if self.state.depth() >= max {
            return Err(EvalError::StackOverflow(max));
        }

        self.state.push_scope();
        for (param, arg) in params.iter().zip(args) {
            self.state.set_local(param.name.clone(), arg);
        }
        let outcome = self.exec_statements(&function.function.body.stmts);
        self.state.signal = None;
        let returned = self.state.pending_return.take();
        self.state.pop_scope();
        outcome?;
        Ok(returned.unwrap_or(Value::Nil))
    }

    fn call_native(
        &mut self,
        native: &NativeFunction,
        receiver: Option<&str>,
        args: Vec<Value>,
        must: bool,
    ) -> EvalResult<Value> {
        let context = self.state.context();
        if let Some(permission) = native.permission(receiver) {
            context.check(&permission)?;
        }
        let args = native.marshal(args)?;
        for permission in native.entity_permissions(&args)? {
            context.check(&permission)?;
        }
        let value = native.invoke(context, args)?;
        if must {
            unwrap_must(native.name(), native.signature().results, value)
        } else {
            Ok(value)
        }
    }

    fn call_method(&mut self, receiver: Value, name: &str, args: Vec<Value>, must: bool) -> EvalResult<Value> {
        let no_args = |args: &[Value]| {
            if args.is_empty() {
                Ok(())
            } else {
                Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: "0".into(),
                    found: args.len(),
                })
            }
        };
        match (&receiver, name) {
            (Value::Routine(routine), "wait_result") => {
                no_args(&args)?;
                routine.wait_result()
            }
            (Value::RoutineGroup(group), "wait_all_results") => {
                no_args(&args)?;
                Ok(Value::List(group.wait_all_results()?))
            }
            (Value::Record(record), _) => {
                let method = self.host.method(&record.type_name, name).ok_or_else(|| {
                    EvalError::UnknownMethod {
                        name: name.to_string(),
                        on: record.type_name.clone(),
                    }
                })?;
                let type_name = record.type_name.clone();
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend(args);
                self.call_native(&method, Some(&type_name), full, must)
            }
            _ => Err(EvalError::UnknownMethod {
                name: name.to_string(),
                on: receiver.type_name().to_string(),
            }),
        }
    }

    // ── Operators ────────────────────────────────────────────────────────────

    fn eval_binary(&mut self, op: BinaryOp, left: &Node, right: &Node) -> EvalResult<Value> {
        let left = self.eval(left)?;
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let Value::Bool(l) = left else {
                return Err(mismatch(&format!("a bool operand for '{}'", op.as_str()), &left));
            };
            if (op == BinaryOp::And) != l {
                return Ok(Value::Bool(l));
            }
            return match self.eval(right)? {
                Value::Bool(r) => Ok(Value::Bool(r)),
                other => Err(mismatch(&format!("a bool operand for '{}'", op.as_str()), &other)),
            };
        }
        let right = self.eval(right)?;
        binary(op, left, right)
    }

    // ── Control flow ─────────────────────────────────────────────────────────

    fn exec_if(&mut self, stmt: &IfStmt) -> EvalResult<()> {
        match self.eval(&stmt.test)? {
            Value::Bool(true) => self.exec_statements(&stmt.consequent.stmts),
            Value::Bool(false) => match &stmt.alternate {
                Some(ElseBranch::ElseIf(next)) => self.exec_if(next),
                Some(ElseBranch::Block(block)) => self.exec_statements(&block.stmts),
                None => Ok(()),
            },
            other => Err(mismatch("a bool condition", &other)),
        }
    }

    fn exec_for(&mut self, stmt: &ForStmt) -> EvalResult<()> {
        let entries: Box<dyn Iterator<Item = (Value, Value)>> = match self.eval(&stmt.iterated)? {
            Value::Object(object) => Box::new(object.into_iter().map(|(k, v)| (Value::Str(k), v))),
            Value::Record(record) => {
                Box::new(record.fields.into_iter().map(|(k, v)| (Value::Str(k), v)))
            }
            Value::List(items) => Box::new(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Value::Int(i as i64), v)),
            ),
            Value::KeyList(keys) => Box::new(
                keys.into_iter()
                    .enumerate()
                    .map(|(i, k)| (Value::Int(i as i64), Value::Str(k))),
            ),
            Value::IntRange(range) => Box::new(
                range
                    .bounds()
                    .enumerate()
                    .map(|(i, n)| (Value::Int(i as i64), Value::Int(n))),
            ),
            other => return Err(EvalError::NotIterable(other.type_name())),
        };

        for (key, value) in entries {
            if let Some(key_name) = &stmt.key {
                self.state.set_local(key_name.name.clone(), key);
            }
            self.state.set_local(stmt.value.name.clone(), value);
            self.exec_statements(&stmt.body.stmts)?;
            if self.state.pending_return.is_some() {
                break;
            }
            if self.state.signal.take() == Some(LoopSignal::Break) {
                break;
            }
        }
        Ok(())
    }

    /// Run the body of the first case accepted by `test`, or the default.
    fn exec_cases(
        &mut self,
        discriminant: &Value,
        cases: &[Case],
        default: Option<&Block>,
        test: fn(&Value, &Value) -> bool,
    ) -> EvalResult<()> {
        for case in cases {
            let value = self.eval(&case.value)?;
            if test(&value, discriminant) {
                return self.exec_statements(&case.body.stmts);
            }
        }
        match default {
            Some(block) => self.exec_statements(&block.stmts),
            None => Ok(()),
        }
    }

    // ── Routines ─────────────────────────────────────────────────────────────

    fn eval_spawn(&mut self, spawn: &SpawnExpr) -> EvalResult<Value> {
        let parent = self.state.context().clone();
        parent.check(&Permission::Routine)?;

        let globals = match &spawn.globals {
            Some(node) => self.routine_globals(node)?,
            None => Object::new(),
        };
        let context = child_context(&parent, spawn.allow.as_ref(), &globals)?;
        let body = self.routine_body(&spawn.body)?;
        let source = Arc::clone(body.source().unwrap_or(self.state.source()));

        debug!(globals = globals.len(), "spawning routine");
        let routine = spawn_routine(Arc::clone(self.host), context, source, globals, body)?;
        if let Some(group) = &spawn.group {
            self.join_group(&group.name, &routine)?;
        }
        Ok(Value::Routine(routine))
    }

    /// The globals passed to a routine. Names in a key list are read from
    /// the spawner's globals.
    fn routine_globals(&mut self, node: &Node) -> EvalResult<Object> {
        let value = self.eval(node)?;
        match value {
            Value::Object(object) => Ok(object),
            Value::KeyList(keys) => {
                let mut object = Object::new();
                for key in keys {
                    let value = self.read_global(&key)?;
                    object.insert(key, value);
                }
                Ok(object)
            }
            Value::Nil => Ok(Object::new()),
            other => Err(mismatch("an object or a key list of routine globals", &other)),
        }
    }

    fn routine_body(&mut self, body: &Node) -> EvalResult<RoutineBody> {
        match &body.kind {
            NodeKind::EmbeddedModule(module) => {
                fragment_checked(check_module(module, self.state.source()))?;
                Ok(RoutineBody::Module(Arc::clone(module)))
            }
            NodeKind::Call { callee, args, .. } => {
                let callee = match self.resolve_callee(callee)? {
                    Callee::Value(value) => value,
                    Callee::Method { name, .. } => {
                        return Err(EvalError::Runtime(format!(
                            "a method call ({name}) cannot be the body of a routine"
                        )))
                    }
                };
                let args = self.eval_args(args)?;
                self.callable_body(callee, args)
            }
            NodeKind::LocalVar(_) | NodeKind::GlobalVar(_) | NodeKind::Identifier(_) => {
                match self.eval(body)? {
                    Value::Lazy(lazy) => {
                        fragment_checked(check_fragment(&lazy.node, &lazy.source))?;
                        Ok(RoutineBody::Lazy(lazy))
                    }
                    other => self.callable_body(other, Vec::new()),
                }
            }
            _ => Err(EvalError::Runtime("invalid routine body".into())),
        }
    }

    fn callable_body(&self, callee: Value, args: Vec<Value>) -> EvalResult<RoutineBody> {
        match &callee {
            Value::Function(f) => {
                let node = Node::new(NodeKind::Function(Arc::clone(&f.function)), f.function.span);
                fragment_checked(check_fragment(&node, &f.source))?;
            }
            Value::Native(_) => {}
            other => return Err(mismatch("a function or a lazy expression", other)),
        }
        Ok(RoutineBody::Call { callee, args })
    }

    fn join_group(&mut self, name: &str, routine: &Arc<Routine>) -> EvalResult<()> {
        match self.state.local(name).cloned() {
            Some(Value::RoutineGroup(group)) => {
                group.add(Arc::clone(routine));
                Ok(())
            }
            Some(other) => Err(mismatch("a routine group", &other)),
            None => {
                let group = Arc::new(RoutineGroup::new(name));
                group.add(Arc::clone(routine));
                self.state.set_local(name, Value::RoutineGroup(group));
                Ok(())
            }
        }
    }

    // ── Imports ──────────────────────────────────────────────────────────────

    /// Fetch, verify, check and run an imported module, binding its result
    /// as a global.
    fn exec_import(&mut self, import: &ImportStmt) -> EvalResult<()> {
        let url = Url::new(import.url.as_str())?;
        let parent = self.state.context().clone();
        parent.check(&Permission::url(PermissionKind::Read, url.clone()))?;

        let text = self.host.importer().load(&url, &import.checksum)?;
        let import_error = |reason: String| EvalError::Import {
            url: url.to_string(),
            reason,
        };
        let source = Arc::new(SourceFile::new(url.as_str(), &*text));
        let module = parse_module(&source).map_err(|e| import_error(e.to_string()))?;
        let errors = check_module(&module, &source);
        if errors.has_errors() {
            return Err(import_error(errors.to_string()));
        }

        let arguments = match self.eval(&import.arguments)? {
            Value::Object(object) => object,
            other => return Err(mismatch("an object of import arguments", &other)),
        };
        let context = child_context(&parent, import.allow.as_ref(), &arguments)?;

        debug!(%url, name = %import.name.name, "running imported module");
        let routine = spawn_routine(
            Arc::clone(self.host),
            context,
            source,
            arguments,
            RoutineBody::Module(Arc::new(module)),
        )?;
        let result = routine.wait_result()?;
        self.state.set_global(import.name.name.clone(), result);
        Ok(())
    }
}

/// Context for a spawned routine or an imported module. With an `allow`
/// block it grants exactly that block, and its limits narrow the inherited
/// limiters; otherwise it keeps the parent's grants minus global and routine
/// access, plus read access to the passed globals.
///
/// Passing a global without `allow` requires the parent itself to hold
/// `read` on that name, so a spawner cannot hand out what it cannot read.
fn child_context(parent: &Context, allow: Option<&Node>, passed: &Object) -> EvalResult<Context> {
    match allow {
        Some(object) => {
            let requirements = permissions_from_object(object)?;
            let child = parent.new_with(requirements.permissions)?;
            Ok(child.narrow_limits(&requirements.limits)?)
        }
        None => {
            let regranted = passed
                .keys()
                .map(|name| Permission::global(PermissionKind::Read, name.as_str()))
                .collect();
            Ok(parent
                .new_without(&stripped_permissions())
                .regrant(parent, regranted)?)
        }
    }
}

fn fragment_checked(errors: CheckErrors) -> EvalResult<()> {
    if errors.has_errors() {
        Err(EvalError::Check(errors))
    } else {
        Ok(())
    }
}

/// The global a callee member chain starts from, if it is made of names only.
fn global_root(node: &Node) -> Option<&str> {
    match &node.kind {
        NodeKind::Identifier(name) | NodeKind::GlobalVar(name) => Some(name.as_str()),
        NodeKind::Member { object, .. } => global_root(object),
        _ => None,
    }
}
