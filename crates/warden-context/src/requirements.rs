//! Static conversion of `require` and `allow` object literals into
//! permissions, limits and a stack ceiling.
//!
//! ```text
//! require {
//!     read: {
//!         /data/...
//!         globals: "*"
//!     }
//!     use: {
//!         globals: ["log"]
//!         commands: { git: { push: {} } }
//!         contextless: ["now", "User.save"]
//!         limits: { "fs/read": 10MB/s }
//!         stack: 32
//!     }
//!     create: { routines: {} }
//! }
//! ```

use warden_types::ast::{Node, NodeKind, Number, ObjectProperty};
use warden_types::Span;

use crate::entity::{Host, HostPattern, Path, PathPattern, Url, UrlPattern};
use crate::error::{RequirementsError, RequirementsErrorKind as Kind};
use crate::limiter::Limit;
use crate::permission::{HttpEntity, MAX_SUBCOMMANDS};
use crate::{Context, LimitError, Permission, PermissionKind};

/// What a `require` or `allow` object asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements {
    pub permissions: Vec<Permission>,
    pub limits: Vec<Limit>,
    pub stack: Option<usize>,
}

impl Requirements {
    /// A context granting exactly these requirements.
    pub fn into_context(self) -> std::result::Result<Context, LimitError> {
        Context::new(self.permissions, Vec::new()).with_limits(&self.limits)
    }
}

type Result<T> = std::result::Result<T, RequirementsError>;

fn err<T>(span: Span, kind: Kind) -> Result<T> {
    Err(RequirementsError::new(span, kind))
}

/// Convert an object literal into requirements without evaluating anything.
pub fn permissions_from_object(node: &Node) -> Result<Requirements> {
    let NodeKind::Object(properties) = &node.kind else {
        return err(node.span, Kind::NotAnObject);
    };
    let mut requirements = Requirements::default();
    for property in properties {
        let Some(key) = &property.key else {
            return err(property.span, Kind::MissingKind);
        };
        let Some(kind) = PermissionKind::from_name(&key.name) else {
            return err(key.span, Kind::UnknownKind(key.name.clone()));
        };
        collect_kind(kind, &property.value, &mut requirements)?;
    }
    Ok(requirements)
}

/// The value under a kind key: an entity, a list of entities, or an object.
fn collect_kind(kind: PermissionKind, value: &Node, out: &mut Requirements) -> Result<()> {
    match &value.kind {
        NodeKind::List(items) => {
            for item in items {
                out.permissions.push(entity_permission(kind, item)?);
            }
        }
        NodeKind::Object(properties) => {
            for property in properties {
                collect_property(kind, property, out)?;
            }
        }
        _ => out.permissions.push(entity_permission(kind, value)?),
    }
    Ok(())
}

fn collect_property(kind: PermissionKind, property: &ObjectProperty, out: &mut Requirements) -> Result<()> {
    let Some(key) = &property.key else {
        out.permissions.push(entity_permission(kind, &property.value)?);
        return Ok(());
    };
    let value = &property.value;
    let only_under = |expected: PermissionKind, name: &'static str| -> Result<()> {
        if kind == expected {
            Ok(())
        } else {
            err(
                key.span,
                Kind::MisplacedKey {
                    key: key.name.clone(),
                    expected: name,
                },
            )
        }
    };

    match key.name.as_str() {
        "globals" => {
            for name in global_names(value)? {
                out.permissions.push(Permission::global(kind, name));
            }
        }
        "routines" => {
            only_under(PermissionKind::Create, "create")?;
            out.permissions.push(Permission::Routine);
        }
        "commands" => {
            only_under(PermissionKind::Use, "use")?;
            collect_commands(value, out)?;
        }
        "contextless" => {
            only_under(PermissionKind::Use, "use")?;
            collect_contextless(value, out)?;
        }
        "limits" => {
            only_under(PermissionKind::Use, "use")?;
            collect_limits(value, out)?;
        }
        "stack" => {
            only_under(PermissionKind::Use, "use")?;
            let height = match value.kind {
                NodeKind::Int(h) if h > 0 => h as usize,
                _ => return err(value.span, Kind::InvalidStack),
            };
            out.stack = Some(out.stack.map_or(height, |s| s.max(height)));
            out.permissions.push(Permission::Stack { max_height: height });
        }
        other => {
            return err(
                key.span,
                Kind::UnknownKey {
                    kind: kind.to_string(),
                    key: other.to_string(),
                },
            )
        }
    }
    Ok(())
}

fn global_names(value: &Node) -> Result<Vec<String>> {
    match &value.kind {
        NodeKind::Str(name) => Ok(vec![name.clone()]),
        NodeKind::List(items) => items
            .iter()
            .map(|item| match &item.kind {
                NodeKind::Str(name) => Ok(name.clone()),
                _ => err(item.span, Kind::InvalidGlobals),
            })
            .collect(),
        _ => err(value.span, Kind::InvalidGlobals),
    }
}

/// `{ git: { push: {}, pull: { origin: {} } }, ls: {} }`
fn collect_commands(value: &Node, out: &mut Requirements) -> Result<()> {
    let NodeKind::Object(commands) = &value.kind else {
        return err(value.span, Kind::InvalidCommands);
    };
    for command in commands {
        let Some(name) = &command.key else {
            return err(command.span, Kind::InvalidCommands);
        };
        collect_subcommands(&name.name, Vec::new(), &command.value, out)?;
    }
    Ok(())
}

fn collect_subcommands(
    command: &str,
    chain: Vec<String>,
    value: &Node,
    out: &mut Requirements,
) -> Result<()> {
    let NodeKind::Object(subcommands) = &value.kind else {
        return err(value.span, Kind::InvalidCommands);
    };
    if subcommands.is_empty() {
        out.permissions.push(Permission::command(command, chain));
        return Ok(());
    }
    if chain.len() == MAX_SUBCOMMANDS {
        return err(value.span, Kind::TooManySubcommands(command.to_string()));
    }
    for sub in subcommands {
        let Some(name) = &sub.key else {
            return err(sub.span, Kind::InvalidCommands);
        };
        let mut chain = chain.clone();
        chain.push(name.name.clone());
        collect_subcommands(command, chain, &sub.value, out)?;
    }
    Ok(())
}

/// `["now", "User.save"]`
fn collect_contextless(value: &Node, out: &mut Requirements) -> Result<()> {
    let NodeKind::List(items) = &value.kind else {
        return err(value.span, Kind::InvalidContextless);
    };
    for item in items {
        let NodeKind::Str(callable) = &item.kind else {
            return err(item.span, Kind::InvalidContextless);
        };
        let permission = match callable.split_once('.') {
            Some((receiver, name)) if !receiver.is_empty() && !name.is_empty() => {
                Permission::contextless(Some(receiver), name)
            }
            None if !callable.is_empty() => Permission::contextless(None, callable.as_str()),
            _ => return err(item.span, Kind::InvalidContextless),
        };
        out.permissions.push(permission);
    }
    Ok(())
}

/// `{ "fs/read": 10MB/s, "exec/count": 10 }`
fn collect_limits(value: &Node, out: &mut Requirements) -> Result<()> {
    let NodeKind::Object(limits) = &value.kind else {
        return err(value.span, Kind::InvalidLimit(String::new()));
    };
    for limit in limits {
        let Some(name) = &limit.key else {
            return err(limit.span, Kind::InvalidLimit(String::new()));
        };
        let invalid = || RequirementsError::new(limit.value.span, Kind::InvalidLimit(name.name.clone()));
        let rate = match &limit.value.kind {
            NodeKind::Rate { value, unit } => {
                let multiplier = unit.byte_multiplier().ok_or_else(invalid)?;
                let bytes = match value {
                    Number::Int(i) => i.checked_mul(multiplier).ok_or_else(invalid)?,
                    Number::Float(f) => {
                        let bytes = f * multiplier as f64;
                        if bytes.fract() != 0.0 || bytes > i64::MAX as f64 {
                            return Err(invalid());
                        }
                        bytes as i64
                    }
                };
                u64::try_from(bytes).map_err(|_| invalid())?
            }
            NodeKind::Int(count) => u64::try_from(*count).map_err(|_| invalid())?,
            _ => return Err(invalid()),
        };
        let limit = Limit::new(name.name.clone(), rate);
        limit
            .refill_increment()
            .map_err(|e| RequirementsError::new(name.span, Kind::Limit(e)))?;
        out.limits.push(limit);
    }
    Ok(())
}

/// A permission on the entity literal `node`.
pub fn entity_permission(kind: PermissionKind, node: &Node) -> Result<Permission> {
    let entity_err = |e| RequirementsError::new(node.span, Kind::Entity(e));
    let permission = match &node.kind {
        NodeKind::AbsPath(p) | NodeKind::RelPath(p) => {
            let path = Path::new(p.as_str())
                .and_then(|p| p.to_absolute())
                .map_err(entity_err)?;
            Permission::path(kind, path)
        }
        NodeKind::PathPattern { pattern, .. } => {
            Permission::path_pattern(kind, PathPattern::new(pattern.as_str()).map_err(entity_err)?)
        }
        NodeKind::Url(u) => Permission::url(kind, Url::new(u.as_str()).map_err(entity_err)?),
        NodeKind::Host(h) => Permission::host(kind, Host::new(h.as_str()).map_err(entity_err)?),
        NodeKind::UrlPattern { pattern, .. } => Permission::Http {
            kind,
            entity: HttpEntity::UrlPattern(UrlPattern::new(pattern.as_str()).map_err(entity_err)?),
        },
        NodeKind::HostPattern(p) => Permission::Http {
            kind,
            entity: HttpEntity::HostPattern(HostPattern::new(p.as_str()).map_err(entity_err)?),
        },
        other => return err(node.span, Kind::NotAnEntity(describe(other))),
    };
    Ok(permission)
}

fn describe(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Str(_) => "a string",
        NodeKind::Int(_) | NodeKind::Float(_) => "a number",
        NodeKind::Object(_) => "an object",
        NodeKind::List(_) => "a list",
        NodeKind::PathExpr { .. } | NodeKind::UrlExpr { .. } => "an interpolated literal",
        NodeKind::LocalVar(_) | NodeKind::GlobalVar(_) | NodeKind::Identifier(_) => "a variable",
        _ => "an expression",
    }
}
