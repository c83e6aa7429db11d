//! Capability values and their inclusion order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{Host, HostPattern, Path, PathPattern, Url, UrlPattern};

/// Maximum number of subcommands in a command permission.
pub const MAX_SUBCOMMANDS: usize = 2;

/// The operation a permission grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Read,
    Update,
    Create,
    Delete,
    Use,
    Consume,
    Provide,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 7] = [
        Self::Read,
        Self::Update,
        Self::Create,
        Self::Delete,
        Self::Use,
        Self::Consume,
        Self::Provide,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Use => "use",
            Self::Consume => "consume",
            Self::Provide => "provide",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filesystem permission targets a path or a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEntity {
    Path(Path),
    Pattern(PathPattern),
}

/// An HTTP permission targets a URL, a host, or a pattern of either.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpEntity {
    Url(Url),
    Host(Host),
    UrlPattern(UrlPattern),
    HostPattern(HostPattern),
}

impl fmt::Display for FsEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => p.fmt(f),
            Self::Pattern(p) => p.fmt(f),
        }
    }
}

impl fmt::Display for HttpEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => u.fmt(f),
            Self::Host(h) => h.fmt(f),
            Self::UrlPattern(p) => p.fmt(f),
            Self::HostPattern(p) => p.fmt(f),
        }
    }
}

/// A capability: one operation kind on one entity.
///
/// Permissions are plain values compared structurally. [`Permission::includes`]
/// is the partial order the context engine checks against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Permission {
    /// Access to a global variable; the name `*` stands for every global.
    GlobalVar { kind: PermissionKind, name: String },
    Filesystem { kind: PermissionKind, entity: FsEntity },
    Http { kind: PermissionKind, entity: HttpEntity },
    /// Running a command, optionally restricted to a subcommand chain.
    Command { name: String, subcommands: Vec<String> },
    /// Calling a host function that does not receive the context.
    Contextless {
        receiver: Option<String>,
        name: String,
    },
    /// Ceiling on the call-stack height.
    Stack { max_height: usize },
    /// Creating routines.
    Routine,
}

impl Permission {
    pub fn global(kind: PermissionKind, name: impl Into<String>) -> Self {
        Self::GlobalVar {
            kind,
            name: name.into(),
        }
    }

    pub fn path(kind: PermissionKind, path: Path) -> Self {
        Self::Filesystem {
            kind,
            entity: FsEntity::Path(path),
        }
    }

    pub fn path_pattern(kind: PermissionKind, pattern: PathPattern) -> Self {
        Self::Filesystem {
            kind,
            entity: FsEntity::Pattern(pattern),
        }
    }

    pub fn url(kind: PermissionKind, url: Url) -> Self {
        Self::Http {
            kind,
            entity: HttpEntity::Url(url),
        }
    }

    pub fn host(kind: PermissionKind, host: Host) -> Self {
        Self::Http {
            kind,
            entity: HttpEntity::Host(host),
        }
    }

    pub fn command(name: impl Into<String>, subcommands: Vec<String>) -> Self {
        Self::Command {
            name: name.into(),
            subcommands,
        }
    }

    pub fn contextless(receiver: Option<&str>, name: impl Into<String>) -> Self {
        Self::Contextless {
            receiver: receiver.map(str::to_string),
            name: name.into(),
        }
    }

    /// The operation this permission grants.
    pub fn kind(&self) -> PermissionKind {
        match self {
            Self::GlobalVar { kind, .. } | Self::Filesystem { kind, .. } | Self::Http { kind, .. } => {
                *kind
            }
            Self::Command { .. } | Self::Contextless { .. } | Self::Stack { .. } => {
                PermissionKind::Use
            }
            Self::Routine => PermissionKind::Create,
        }
    }

    /// Whether holding `self` is enough to perform what `other` describes.
    pub fn includes(&self, other: &Permission) -> bool {
        use Permission as P;
        match (self, other) {
            (P::GlobalVar { kind: k1, name: n1 }, P::GlobalVar { kind: k2, name: n2 }) => {
                k1 == k2 && (n1 == "*" || n1 == n2)
            }
            (P::Filesystem { kind: k1, entity: e1 }, P::Filesystem { kind: k2, entity: e2 }) => {
                k1 == k2 && fs_includes(e1, e2)
            }
            (P::Http { kind: k1, entity: e1 }, P::Http { kind: k2, entity: e2 }) => {
                k1 == k2 && http_includes(e1, e2)
            }
            (
                P::Command {
                    name: n1,
                    subcommands: s1,
                },
                P::Command {
                    name: n2,
                    subcommands: s2,
                },
            ) => n1 == n2 && s2.starts_with(s1),
            (P::Contextless { .. }, P::Contextless { .. }) => self == other,
            (P::Stack { max_height: h1 }, P::Stack { max_height: h2 }) => h2 <= h1,
            (P::Routine, P::Routine) => true,
            _ => false,
        }
    }
}

fn fs_includes(granted: &FsEntity, required: &FsEntity) -> bool {
    match (granted, required) {
        (FsEntity::Path(a), FsEntity::Path(b)) => a == b,
        (FsEntity::Pattern(p), FsEntity::Path(b)) => p.test(b),
        (FsEntity::Pattern(p), FsEntity::Pattern(q)) => p.includes(q),
        (FsEntity::Path(_), FsEntity::Pattern(_)) => false,
    }
}

fn http_includes(granted: &HttpEntity, required: &HttpEntity) -> bool {
    use HttpEntity as E;
    match (granted, required) {
        (E::Url(a), E::Url(b)) => a == b,
        (E::Host(h), E::Host(h2)) => h == h2,
        (E::Host(h), E::Url(u)) => &u.host() == h,
        (E::Host(h), E::UrlPattern(p)) => &p.host() == h,
        (E::UrlPattern(p), E::Url(u)) => p.test(u),
        (E::UrlPattern(p), E::UrlPattern(q)) => p.includes(q),
        (E::HostPattern(p), E::Host(h)) => p.test(h),
        (E::HostPattern(p), E::Url(u)) => p.test_url(u),
        (E::HostPattern(p), E::UrlPattern(q)) => p.test(&q.host()),
        (E::HostPattern(p), E::HostPattern(q)) => p == q,
        _ => false,
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalVar { kind, name } => write!(f, "{kind} global {name}"),
            Self::Filesystem { kind, entity } => write!(f, "{kind} {entity}"),
            Self::Http { kind, entity } => write!(f, "{kind} {entity}"),
            Self::Command { name, subcommands } => {
                write!(f, "use command {name}")?;
                for sub in subcommands {
                    write!(f, " {sub}")?;
                }
                Ok(())
            }
            Self::Contextless {
                receiver: Some(receiver),
                name,
            } => write!(f, "use contextless {receiver}.{name}"),
            Self::Contextless {
                receiver: None,
                name,
            } => write!(f, "use contextless {name}"),
            Self::Stack { max_height } => write!(f, "use stack height {max_height}"),
            Self::Routine => write!(f, "create routine"),
        }
    }
}
