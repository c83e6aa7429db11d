//! Runtime values.
//!
//! Values are plain data except for the handle variants (functions, native
//! functions, lazy expressions, routines and routine groups), which share
//! their payload through [`Arc`] and compare by identity.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use warden_context::{Host, HostPattern, Path, PathPattern, Url, UrlPattern};
use warden_types::ast::{FunctionExpr, Node};
use warden_types::SourceFile;

use crate::native::NativeFunction;
use crate::routine::{Routine, RoutineGroup};

/// Object storage. Keys iterate in sorted order.
pub type Object = BTreeMap<String, Value>;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),

    // ── Quantities ──
    Duration(Duration),
    Percent(f64),
    LineCount(i64),
    ByteCount(i64),
    /// Bytes per second.
    ByteRate(i64),

    // ── Entities ──
    Path(Path),
    PathPattern(PathPattern),
    Url(Url),
    Host(Host),
    UrlPattern(UrlPattern),
    HostPattern(HostPattern),

    // ── Composites ──
    IntRange(IntRange),
    List(Vec<Value>),
    Object(Object),
    KeyList(Vec<String>),
    /// A typed struct produced by the host.
    Record(Record),

    // ── Handles ──
    Function(FunctionValue),
    Native(Arc<NativeFunction>),
    Lazy(LazyValue),
    Routine(Arc<Routine>),
    RoutineGroup(Arc<RoutineGroup>),

    /// An error result returned by a native function.
    Error(String),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn record<K: Into<String>>(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Value::Record(Record {
            type_name: type_name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Duration(_) => "duration",
            Value::Percent(_) => "percentage",
            Value::LineCount(_) => "line count",
            Value::ByteCount(_) => "byte count",
            Value::ByteRate(_) => "byte rate",
            Value::Path(_) => "path",
            Value::PathPattern(_) => "path pattern",
            Value::Url(_) => "url",
            Value::Host(_) => "host",
            Value::UrlPattern(_) => "url pattern",
            Value::HostPattern(_) => "host pattern",
            Value::IntRange(_) => "int range",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::KeyList(_) => "key list",
            Value::Record(_) => "record",
            Value::Function(_) => "function",
            Value::Native(_) => "native function",
            Value::Lazy(_) => "lazy expression",
            Value::Routine(_) => "routine",
            Value::RoutineGroup(_) => "routine group",
            Value::Error(_) => "error",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// JSON rendering of plain data. Handles and host records without a
    /// JSON shape render as their display string.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(object) => Json::Object(
                object.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Record(record) => Json::Object(
                record.fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::KeyList(keys) => Json::Array(keys.iter().cloned().map(Json::String).collect()),
            other => Json::String(other.to_string()),
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b))
            | (LineCount(a), LineCount(b))
            | (ByteCount(a), ByteCount(b))
            | (ByteRate(a), ByteRate(b)) => a == b,
            (Float(a), Float(b)) | (Percent(a), Percent(b)) => a == b,
            (Str(a), Str(b)) | (Error(a), Error(b)) => a == b,
            (Duration(a), Duration(b)) => a == b,
            (Path(a), Path(b)) => a == b,
            (PathPattern(a), PathPattern(b)) => a == b,
            (Url(a), Url(b)) => a == b,
            (Host(a), Host(b)) => a == b,
            (UrlPattern(a), UrlPattern(b)) => a == b,
            (HostPattern(a), HostPattern(b)) => a == b,
            (IntRange(a), IntRange(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (KeyList(a), KeyList(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (Function(a), Function(b)) => Arc::ptr_eq(&a.function, &b.function),
            (Native(a), Native(b)) => Arc::ptr_eq(a, b),
            (Lazy(a), Lazy(b)) => Arc::ptr_eq(&a.node, &b.node),
            (Routine(a), Routine(b)) => Arc::ptr_eq(a, b),
            (RoutineGroup(a), RoutineGroup(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Duration(d) => {
                if d.subsec_nanos() == 0 {
                    write!(f, "{}s", d.as_secs())
                } else {
                    write!(f, "{}ms", d.as_millis())
                }
            }
            Value::Percent(p) => write!(f, "{p}%"),
            Value::LineCount(n) => write!(f, "{n}ln"),
            Value::ByteCount(n) => write!(f, "{n}B"),
            Value::ByteRate(n) => write!(f, "{n}B/s"),
            Value::Path(p) => write!(f, "{p}"),
            Value::PathPattern(p) => write!(f, "{p}"),
            Value::Url(u) => write!(f, "{u}"),
            Value::Host(h) => write!(f, "{h}"),
            Value::UrlPattern(p) => write!(f, "{p}"),
            Value::HostPattern(p) => write!(f, "{p}"),
            Value::IntRange(r) => write!(f, "{r}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Object(object) => fmt_fields(f, "", object),
            Value::KeyList(keys) => write!(f, ".{{{}}}", keys.join(", ")),
            Value::Record(record) => fmt_fields(f, &record.type_name, &record.fields),
            Value::Function(func) => {
                let params: Vec<&str> = func.function.params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "fn({})", params.join(", "))
            }
            Value::Native(native) => write!(f, "<native {}>", native.name()),
            Value::Lazy(_) => write!(f, "@(...)"),
            Value::Routine(r) => write!(f, "<routine {}>", r.id()),
            Value::RoutineGroup(g) => write!(f, "<routine group {}>", g.name()),
            Value::Error(message) => write!(f, "error({message})"),
        }
    }
}

fn fmt_fields(f: &mut fmt::Formatter<'_>, prefix: &str, fields: &Object) -> fmt::Result {
    write!(f, "{prefix}{{")?;
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key}: ")?;
        value.fmt_nested(f)?;
    }
    write!(f, "}}")
}

// ══════════════════════════════════════════════════════════════════════════════
// Payloads
// ══════════════════════════════════════════════════════════════════════════════

/// `start..end` or `start..<end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
    pub exclusive: bool,
}

impl IntRange {
    pub fn new(start: i64, end: i64, exclusive: bool) -> Self {
        Self {
            start,
            end,
            exclusive,
        }
    }

    pub fn contains(&self, i: i64) -> bool {
        self.bounds().contains(&i)
    }

    /// The range as an inclusive iterator; empty when `end` precedes `start`.
    pub fn bounds(&self) -> RangeInclusive<i64> {
        let last = if self.exclusive {
            self.end.checked_sub(1)
        } else {
            Some(self.end)
        };
        match last {
            Some(last) => self.start..=last,
            #[allow(clippy::reversed_empty_ranges)]
            None => 1..=0,
        }
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.exclusive { "..<" } else { ".." };
        write!(f, "{}{op}{}", self.start, self.end)
    }
}

/// A struct value with a host-declared type name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub fields: Object,
}

/// A script function together with the module text it was declared in.
#[derive(Clone)]
pub struct FunctionValue {
    pub function: Arc<FunctionExpr>,
    pub source: Arc<SourceFile>,
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("params", &self.function.params.len())
            .field("source", &self.source.name)
            .finish()
    }
}

/// `@(expr)`: evaluated when a routine runs it.
#[derive(Clone)]
pub struct LazyValue {
    pub node: Arc<Node>,
    pub source: Arc<SourceFile>,
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("span", &self.node.span)
            .field("source", &self.source.name)
            .finish()
    }
}
