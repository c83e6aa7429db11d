//! Immutable per-routine security state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::limiter::{Limit, TokenBucket};
use crate::{LimitError, NotAllowedError, Permission};

/// The rights of one routine: granted and forbidden permissions, shared rate
/// limiters and a stack-height ceiling.
///
/// A context never changes after construction. Deriving a context for a
/// child routine returns a new value whose rights are a subset of the
/// parent's; limiters are shared with the parent through `Arc`.
///
/// Each limit name maps to a chain of buckets, outermost first. A derived
/// context can append a stricter bucket with [`Context::narrow_limits`];
/// taking tokens debits the whole chain, so a child never outruns an
/// ancestor's budget.
#[derive(Debug, Clone, Default)]
pub struct Context {
    granted: Vec<Permission>,
    forbidden: Vec<Permission>,
    limiters: HashMap<String, Vec<Arc<TokenBucket>>>,
    max_stack_height: Option<usize>,
}

impl Context {
    /// A context with the given grants and forbids and no limiters.
    pub fn new(granted: Vec<Permission>, forbidden: Vec<Permission>) -> Self {
        let max_stack_height = stack_ceiling(&granted);
        Self {
            granted,
            forbidden,
            limiters: HashMap::new(),
            max_stack_height,
        }
    }

    /// Add a token bucket per limit, replacing any limiter of the same name.
    pub fn with_limits(mut self, limits: &[Limit]) -> Result<Self, LimitError> {
        for limit in limits {
            self.limiters
                .insert(limit.name.clone(), vec![TokenBucket::new(limit)?]);
        }
        Ok(self)
    }

    /// Add an already built bucket, shared with whoever else holds it.
    pub fn with_limiter(mut self, bucket: Arc<TokenBucket>) -> Self {
        self.limiters.insert(bucket.name().to_string(), vec![bucket]);
        self
    }

    /// Append a bucket per limit on top of the inherited ones. A limit
    /// looser than the innermost inherited bucket of the same name is
    /// rejected; an equal one is kept as is.
    pub fn narrow_limits(mut self, limits: &[Limit]) -> Result<Self, LimitError> {
        for limit in limits {
            let chain = self.limiters.entry(limit.name.clone()).or_default();
            match chain.last().map(|bucket| bucket.capacity()) {
                Some(inherited) if limit.rate > inherited => {
                    return Err(LimitError::Loosened {
                        name: limit.name.clone(),
                        rate: limit.rate,
                        inherited,
                    });
                }
                Some(inherited) if limit.rate == inherited => {}
                _ => {
                    debug!(limit = %limit.name, rate = limit.rate, "limit narrowed");
                    chain.push(TokenBucket::new(limit)?);
                }
            }
        }
        Ok(self)
    }

    pub fn granted(&self) -> &[Permission] {
        &self.granted
    }

    pub fn forbidden(&self) -> &[Permission] {
        &self.forbidden
    }

    /// The stack ceiling granted by a stack permission, if any.
    pub fn max_stack_height(&self) -> Option<usize> {
        self.max_stack_height
    }

    /// The strictest bucket for `name`.
    pub fn limiter(&self, name: &str) -> Option<&Arc<TokenBucket>> {
        self.limiters.get(name).and_then(|chain| chain.last())
    }

    /// Debit `count` tokens from every bucket of the named limiter, blocking
    /// while one is empty. Does nothing when the context has no such limiter.
    pub fn take(&self, limit: &str, count: u64) {
        for bucket in self.limiters.get(limit).into_iter().flatten() {
            bucket.take(count);
        }
    }

    /// Forbidden entries veto before any grant is looked at.
    pub fn has(&self, permission: &Permission) -> bool {
        if self.forbidden.iter().any(|f| f.includes(permission)) {
            return false;
        }
        self.granted.iter().any(|g| g.includes(permission))
    }

    pub fn check(&self, permission: &Permission) -> Result<(), NotAllowedError> {
        if self.has(permission) {
            Ok(())
        } else {
            warn!(%permission, "permission denied");
            Err(NotAllowedError::new(permission.clone()))
        }
    }

    /// A context granting exactly `permissions`, each of which this context
    /// must already hold. Forbids and limiters are inherited.
    pub fn new_with(&self, permissions: Vec<Permission>) -> Result<Context, NotAllowedError> {
        for permission in &permissions {
            self.check(permission)?;
        }
        let max_stack_height = stack_ceiling(&permissions).or(self.max_stack_height);
        Ok(Context {
            granted: permissions,
            forbidden: self.forbidden.clone(),
            limiters: self.limiters.clone(),
            max_stack_height,
        })
    }

    /// A context holding this context's grants minus every grant covered by
    /// one of `removed`. Forbids and limiters are inherited.
    pub fn new_without(&self, removed: &[Permission]) -> Context {
        let granted = self
            .granted
            .iter()
            .filter(|g| !removed.iter().any(|r| r.includes(g)))
            .cloned()
            .collect();
        Context {
            granted,
            forbidden: self.forbidden.clone(),
            limiters: self.limiters.clone(),
            max_stack_height: self.max_stack_height,
        }
    }

    /// Grant `permissions` again on a derived context, validating each one
    /// against `parent`.
    pub fn regrant(
        mut self,
        parent: &Context,
        permissions: Vec<Permission>,
    ) -> Result<Context, NotAllowedError> {
        for permission in permissions {
            parent.check(&permission)?;
            if !self.granted.contains(&permission) {
                self.granted.push(permission);
            }
        }
        Ok(self)
    }
}

fn stack_ceiling(permissions: &[Permission]) -> Option<usize> {
    permissions
        .iter()
        .filter_map(|p| match p {
            Permission::Stack { max_height } => Some(*max_height),
            _ => None,
        })
        .max()
}
