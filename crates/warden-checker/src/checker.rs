//! Warden static checker: walks a parsed module and validates the invariants
//! the grammar cannot express.
//!
//! Entry point: [`Checker::check_module`].
//!
//! Error codes emitted:
//! - E200: duplicate object key (explicit, implicit or synthetic `len`)
//! - E201: spawn body is not a global call, an embedded module or a variable
//! - E202: function declared outside the top level of a module
//! - E203: function declared twice in a module
//! - E204: function name collides with a global seen earlier
//! - E205: assignment to a global constant
//! - E206: constant declared twice
//! - E207/E208: `break`/`continue` outside a loop
//! - E209: `require` or `allow` object that does not convert to permissions
//! - E210: import name collides with a global seen earlier

use std::collections::HashSet;

use warden_context::permissions_from_object;
use warden_types::ast::*;
use warden_types::{CheckError, CheckErrors, ErrorCode, SourceFile, Span};

// ══════════════════════════════════════════════════════════════════════════════
// Ancestors & Symbols
// ══════════════════════════════════════════════════════════════════════════════

/// The constructs between the node being checked and its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ancestor {
    /// A module or an embedded module.
    Module,
    /// A function literal or declaration body.
    Function,
    /// The body of a `for` loop.
    Loop,
    /// An `if`, `switch` or `match` branch, or a plain block.
    Block,
}

/// Global names seen so far in one module.
#[derive(Debug, Default)]
struct ModuleSymbols {
    constants: HashSet<String>,
    functions: HashSet<String>,
    /// Names assigned with `$$name = ...`.
    globals: HashSet<String>,
    imports: HashSet<String>,
}

impl ModuleSymbols {
    /// The kind of global already bound to `name`, if any.
    fn existing(&self, name: &str) -> Option<&'static str> {
        if self.constants.contains(name) {
            Some("constant")
        } else if self.functions.contains(name) {
            Some("function")
        } else if self.imports.contains(name) {
            Some("import")
        } else if self.globals.contains(name) {
            Some("global variable")
        } else {
            None
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Checker
// ══════════════════════════════════════════════════════════════════════════════

pub struct Checker<'a> {
    errors: &'a mut CheckErrors,
    source: &'a SourceFile,
    ancestors: Vec<Ancestor>,
    /// One entry per module being checked; the last is the innermost.
    modules: Vec<ModuleSymbols>,
}

impl<'a> Checker<'a> {
    pub fn new(errors: &'a mut CheckErrors, source: &'a SourceFile) -> Self {
        Self {
            errors,
            source,
            ancestors: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Check a module or an embedded module with fresh symbol tables.
    pub fn check_module(&mut self, module: &Module) {
        self.ancestors.push(Ancestor::Module);
        self.modules.push(ModuleSymbols::default());

        for constant in &module.constants {
            let name = &constant.name.name;
            if !self.symbols().constants.insert(name.clone()) {
                self.error(
                    ErrorCode::DUPLICATE_CONSTANT,
                    format!("constant '{name}' is already declared"),
                    constant.name.span,
                );
            }
        }
        if let Some(requirements) = &module.requirements {
            self.check_permissions(&requirements.object, "require");
        }
        for stmt in &module.statements {
            self.check_node(stmt);
        }

        self.modules.pop();
        self.ancestors.pop();
    }

    /// Check a standalone fragment (a spawned function body, a lazy
    /// expression) as if it were the only statement of a module.
    pub fn check_fragment(&mut self, node: &Node) {
        self.ancestors.push(Ancestor::Module);
        self.modules.push(ModuleSymbols::default());
        self.check_node(node);
        self.modules.pop();
        self.ancestors.pop();
    }

    // ══════════════════════════════════════════════════════════════════════
    // Nodes
    // ══════════════════════════════════════════════════════════════════════

    fn check_node(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Nil
            | NodeKind::Bool(_)
            | NodeKind::Int(_)
            | NodeKind::Float(_)
            | NodeKind::Str(_)
            | NodeKind::Quantity { .. }
            | NodeKind::Rate { .. }
            | NodeKind::IntRange { .. }
            | NodeKind::AbsPath(_)
            | NodeKind::RelPath(_)
            | NodeKind::PathPattern { .. }
            | NodeKind::PathExpr { .. }
            | NodeKind::Url(_)
            | NodeKind::Host(_)
            | NodeKind::UrlPattern { .. }
            | NodeKind::HostPattern(_)
            | NodeKind::UrlExpr { .. }
            | NodeKind::LocalVar(_)
            | NodeKind::GlobalVar(_)
            | NodeKind::Identifier(_) => {}

            NodeKind::Object(properties) => self.check_object(properties),
            NodeKind::List(items) => {
                for item in items {
                    self.check_node(item);
                }
            }
            NodeKind::KeyList(keys) => self.check_key_list(keys),
            NodeKind::Function(function) => self.check_function(function),
            NodeKind::Lazy(inner) => self.check_node(inner),
            NodeKind::EmbeddedModule(module) => self.check_module(module),

            NodeKind::Member { object, .. } => self.check_node(object),
            NodeKind::Index { indexed, index } => {
                self.check_node(indexed);
                self.check_node(index);
            }
            NodeKind::Slice {
                indexed,
                start,
                end,
            } => {
                self.check_node(indexed);
                if let Some(start) = start {
                    self.check_node(start);
                }
                if let Some(end) = end {
                    self.check_node(end);
                }
            }
            NodeKind::Call { callee, args, .. } => {
                self.check_node(callee);
                for arg in args {
                    self.check_node(arg);
                }
            }

            NodeKind::Binary { left, right, .. } => {
                self.check_node(left);
                self.check_node(right);
            }
            NodeKind::Not(inner) | NodeKind::UpperBoundRange(inner) | NodeKind::Paren(inner) => {
                self.check_node(inner)
            }

            NodeKind::Spawn(spawn) => self.check_spawn(spawn),
            NodeKind::Assignment { target, value } => self.check_assignment(target, value),
            NodeKind::If(stmt) => self.check_if(stmt),
            NodeKind::For(stmt) => {
                self.check_node(&stmt.iterated);
                self.check_block(&stmt.body, Ancestor::Loop);
            }
            NodeKind::Switch(stmt) => {
                self.check_cases(&stmt.discriminant, &stmt.cases, stmt.default.as_ref())
            }
            NodeKind::Match(stmt) => {
                self.check_cases(&stmt.discriminant, &stmt.cases, stmt.default.as_ref())
            }
            NodeKind::Break => self.check_loop_control(ErrorCode::MISPLACED_BREAK, "break", node.span),
            NodeKind::Continue => {
                self.check_loop_control(ErrorCode::MISPLACED_CONTINUE, "continue", node.span)
            }
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    self.check_node(value);
                }
            }
            NodeKind::FunctionDecl(decl) => self.check_function_decl(decl),
            NodeKind::Import(import) => self.check_import(import),
            NodeKind::Block(block) => self.check_block(block, Ancestor::Block),
        }
    }

    fn check_block(&mut self, block: &Block, ancestor: Ancestor) {
        self.ancestors.push(ancestor);
        for stmt in &block.stmts {
            self.check_node(stmt);
        }
        self.ancestors.pop();
    }

    // ── Objects ──

    fn check_object(&mut self, properties: &[ObjectProperty]) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut implicit = 0usize;
        for property in properties {
            let (key, span) = match &property.key {
                Some(key) => (key.name.clone(), key.span),
                None => {
                    implicit += 1;
                    (implicit.to_string(), property.span)
                }
            };
            if !seen.insert(key.clone()) {
                self.error(
                    ErrorCode::DUPLICATE_KEY,
                    format!("duplicate key '{key}' in object literal"),
                    span,
                );
            }
            self.check_node(&property.value);
        }

        if implicit > 0 {
            let explicit_len = properties
                .iter()
                .filter_map(|p| p.key.as_ref())
                .find(|k| k.name == "len");
            if let Some(len) = explicit_len {
                self.error(
                    ErrorCode::DUPLICATE_KEY,
                    "key 'len' is reserved in objects with implicit keys",
                    len.span,
                );
            }
        }
    }

    fn check_key_list(&mut self, keys: &[Ident]) {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.name.as_str()) {
                self.error(
                    ErrorCode::DUPLICATE_KEY,
                    format!("duplicate key '{}' in key list", key.name),
                    key.span,
                );
            }
        }
    }

    // ── Functions ──

    fn check_function(&mut self, function: &FunctionExpr) {
        self.ancestors.push(Ancestor::Function);
        for stmt in &function.body.stmts {
            self.check_node(stmt);
        }
        self.ancestors.pop();
    }

    fn check_function_decl(&mut self, decl: &FunctionDecl) {
        let name = &decl.name.name;
        if self.ancestors.last() != Some(&Ancestor::Module) {
            self.error(
                ErrorCode::MISPLACED_FUNCTION,
                format!("function '{name}' must be declared at the top level of a module"),
                decl.name.span,
            );
        } else if self.symbols().functions.contains(name) {
            self.error(
                ErrorCode::DUPLICATE_FUNCTION,
                format!("function '{name}' is already declared"),
                decl.name.span,
            );
        } else if let Some(existing) = self.symbols().existing(name) {
            self.error(
                ErrorCode::FUNCTION_SHADOWS_GLOBAL,
                format!("function '{name}' collides with the {existing} '{name}'"),
                decl.name.span,
            );
        } else {
            self.symbols().functions.insert(name.clone());
        }
        self.check_function(&decl.function);
    }

    // ── Statements ──

    fn check_assignment(&mut self, target: &Node, value: &Node) {
        if let Some((name, span)) = global_root(target) {
            if self.symbols().constants.contains(name) {
                self.error(
                    ErrorCode::CONSTANT_REASSIGNED,
                    format!("cannot assign to the constant '{name}'"),
                    span,
                );
            } else {
                self.symbols().globals.insert(name.to_string());
            }
        }
        self.check_node(target);
        self.check_node(value);
    }

    fn check_if(&mut self, stmt: &IfStmt) {
        self.check_node(&stmt.test);
        self.check_block(&stmt.consequent, Ancestor::Block);
        match &stmt.alternate {
            Some(ElseBranch::ElseIf(next)) => self.check_if(next),
            Some(ElseBranch::Block(block)) => self.check_block(block, Ancestor::Block),
            None => {}
        }
    }

    fn check_cases(&mut self, discriminant: &Node, cases: &[Case], default: Option<&Block>) {
        self.check_node(discriminant);
        for case in cases {
            self.check_node(&case.value);
            self.check_block(&case.body, Ancestor::Block);
        }
        if let Some(default) = default {
            self.check_block(default, Ancestor::Block);
        }
    }

    /// `break` and `continue` may only cross blocks on their way up to a loop.
    fn check_loop_control(&mut self, code: ErrorCode, keyword: &str, span: Span) {
        for ancestor in self.ancestors.iter().rev() {
            match ancestor {
                Ancestor::Loop => return,
                Ancestor::Block => continue,
                Ancestor::Function | Ancestor::Module => break,
            }
        }
        self.error(code, format!("'{keyword}' must be inside a for loop"), span);
    }

    // ── Routines & Imports ──

    fn check_spawn(&mut self, spawn: &SpawnExpr) {
        if let Some(globals) = &spawn.globals {
            self.check_node(globals);
        }

        match &spawn.body.kind {
            NodeKind::EmbeddedModule(module) => self.check_module(module),
            NodeKind::LocalVar(_) | NodeKind::GlobalVar(_) | NodeKind::Identifier(_) => {}
            NodeKind::Call { callee, args, .. } if is_global_callee(callee) => {
                for arg in args {
                    self.check_node(arg);
                }
            }
            _ => self.error(
                ErrorCode::INVALID_SPAWN_BODY,
                "a routine body must be a global call, an embedded module or a variable",
                spawn.body.span,
            ),
        }

        if let Some(allow) = &spawn.allow {
            self.check_permissions(allow, "allow");
        }
    }

    fn check_import(&mut self, import: &ImportStmt) {
        let name = &import.name.name;
        if let Some(existing) = self.symbols().existing(name) {
            self.error(
                ErrorCode::IMPORT_SHADOWS_GLOBAL,
                format!("import '{name}' collides with the {existing} '{name}'"),
                import.name.span,
            );
        } else {
            self.symbols().imports.insert(name.clone());
        }
        self.check_node(&import.arguments);
        if let Some(allow) = &import.allow {
            self.check_permissions(allow, "allow");
        }
    }

    fn check_permissions(&mut self, object: &Node, keyword: &str) {
        if let Err(e) = permissions_from_object(object) {
            self.error(
                ErrorCode::INVALID_PERMISSIONS,
                format!("invalid '{keyword}' permissions: {e}"),
                e.span,
            );
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Helpers
    // ══════════════════════════════════════════════════════════════════════

    fn symbols(&mut self) -> &mut ModuleSymbols {
        if self.modules.is_empty() {
            self.modules.push(ModuleSymbols::default());
        }
        let last = self.modules.len() - 1;
        &mut self.modules[last]
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors
            .push_error(CheckError::new(self.source, code, message, span));
    }
}

/// The global an assignment target writes to: `$$x`, `$$x.a` or `$$x[i]`.
fn global_root(target: &Node) -> Option<(&str, Span)> {
    match &target.kind {
        NodeKind::GlobalVar(name) => Some((name, target.span)),
        NodeKind::Member { object, .. } => global_root(object),
        NodeKind::Index { indexed, .. } => global_root(indexed),
        _ => None,
    }
}

/// `f`, `$$f` or `ns.f`, where the root names a global.
fn is_global_callee(callee: &Node) -> bool {
    match &callee.kind {
        NodeKind::Identifier(_) | NodeKind::GlobalVar(_) => true,
        NodeKind::Member { object, .. } => is_global_callee(object),
        _ => false,
    }
}
