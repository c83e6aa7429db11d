//! Per-routine evaluation state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use warden_context::{Context, Limit, LimitError};
use warden_types::SourceFile;

use crate::value::Value;

/// Pending `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopSignal {
    Break,
    Continue,
}

/// Variables and control state of one routine.
///
/// Scope `0` holds the globals, scope `1` the module's locals. Every
/// function call pushes a fresh scope; locals are only looked up in the
/// innermost one.
#[derive(Debug)]
pub(crate) struct State {
    scopes: Vec<HashMap<String, Value>>,
    constants: HashSet<String>,
    pub(crate) pending_return: Option<Value>,
    pub(crate) signal: Option<LoopSignal>,
    context: Context,
    source: Arc<SourceFile>,
}

impl State {
    pub(crate) fn new(context: Context, source: Arc<SourceFile>, globals: HashMap<String, Value>) -> Self {
        Self {
            scopes: vec![globals, HashMap::new()],
            constants: HashSet::new(),
            pending_return: None,
            signal: None,
            context,
            source,
        }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    /// Tighten the routine's limiters with limits its module declares.
    pub(crate) fn narrow_limits(&mut self, limits: &[Limit]) -> Result<(), LimitError> {
        if !limits.is_empty() {
            self.context = self.context.clone().narrow_limits(limits)?;
        }
        Ok(())
    }

    /// The text of the module being evaluated.
    pub(crate) fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    // ── Globals ──

    pub(crate) fn global(&self, name: &str) -> Option<&Value> {
        self.scopes[0].get(name)
    }

    pub(crate) fn global_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes[0].get_mut(name)
    }

    pub(crate) fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.scopes[0].insert(name.into(), value);
    }

    pub(crate) fn define_constant(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.constants.insert(name.clone());
        self.scopes[0].insert(name, value);
    }

    pub(crate) fn is_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }

    // ── Locals ──

    pub(crate) fn local(&self, name: &str) -> Option<&Value> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }

    pub(crate) fn local_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes.last_mut().and_then(|scope| scope.get_mut(name))
    }

    pub(crate) fn set_local(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    // ── Calls ──

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        if self.scopes.len() > 2 {
            self.scopes.pop();
        }
    }

    /// Number of active function calls.
    pub(crate) fn depth(&self) -> usize {
        self.scopes.len() - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        let globals = HashMap::from([("g".to_string(), Value::Int(1))]);
        State::new(Context::default(), Arc::new(SourceFile::new("t.wd", "")), globals)
    }

    #[test]
    fn locals_do_not_leak_into_calls() {
        let mut state = state();
        state.set_local("a", Value::Int(1));
        state.push_scope();
        assert_eq!(state.depth(), 1);
        assert!(state.local("a").is_none());
        assert_eq!(state.global("g"), Some(&Value::Int(1)));
        state.pop_scope();
        assert_eq!(state.local("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn module_scope_is_never_popped() {
        let mut state = state();
        state.pop_scope();
        assert_eq!(state.depth(), 0);
        state.set_local("a", Value::Nil);
        assert!(state.global("a").is_none());
    }

    #[test]
    fn constants() {
        let mut state = state();
        state.define_constant("A", Value::Int(2));
        assert!(state.is_constant("A"));
        assert!(!state.is_constant("g"));
        assert_eq!(state.global("A"), Some(&Value::Int(2)));
    }
}
