//! Named mutual-exclusion scopes over the host manager registry.
//!
//! Each logical registry mutation runs under its own scope, so a capability
//! update never interleaves with another capability update, and a
//! notification decision never interleaves with another notification
//! decision. Scopes are independent of each other.

use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryScope {
    CapabilityUpdate,
    Notification,
    ShardTagCache,
}

impl RegistryScope {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryScope::CapabilityUpdate => "capability-update",
            RegistryScope::Notification => "notification",
            RegistryScope::ShardTagCache => "shard-tag-cache",
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryLocks {
    capability_update: Mutex<()>,
    notification: Mutex<()>,
    shard_tag_cache: Mutex<()>,
}

impl RegistryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a scope; it is held until the guard drops.
    pub async fn enter(&self, scope: RegistryScope) -> MutexGuard<'_, ()> {
        let lock = match scope {
            RegistryScope::CapabilityUpdate => &self.capability_update,
            RegistryScope::Notification => &self.notification,
            RegistryScope::ShardTagCache => &self.shard_tag_cache,
        };
        let guard = lock.lock().await;
        trace!(scope = scope.name(), "registry scope entered");
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn same_scope_is_exclusive() {
        let locks = Arc::new(RegistryLocks::new());
        let guard = locks.enter(RegistryScope::Notification).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.enter(RegistryScope::Notification).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let locks = RegistryLocks::new();
        let _update = locks.enter(RegistryScope::CapabilityUpdate).await;
        let entered = tokio::time::timeout(
            Duration::from_millis(100),
            locks.enter(RegistryScope::Notification),
        )
        .await;
        assert!(entered.is_ok());
    }
}
