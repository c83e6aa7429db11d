//! Warden security model.
//!
//! Permissions are plain values ordered by [`Permission::includes`]. A
//! [`Context`] holds the grants, forbids and rate limiters of one routine and
//! is never mutated once built; child contexts are derived with
//! [`Context::new_with`] and [`Context::new_without`]. `require` and `allow`
//! object literals are converted statically by [`permissions_from_object`].

mod context;
mod entity;
mod error;
mod limiter;
mod permission;
mod requirements;

pub use context::Context;
pub use entity::{Host, HostPattern, Path, PathPattern, Url, UrlPattern};
pub use error::{EntityError, LimitError, NotAllowedError, RequirementsError, RequirementsErrorKind};
pub use limiter::{Limit, TokenBucket, TICK_INTERVAL};
pub use permission::{FsEntity, HttpEntity, Permission, PermissionKind, MAX_SUBCOMMANDS};
pub use requirements::{entity_permission, permissions_from_object, Requirements};
