//! Tenant membership lookup.
//!
//! Tenancy itself lives outside this crate; the appender only needs one
//! question answered: does this user hold an active membership in this
//! tenant? Deployments plug their directory behind [`MembershipResolver`].

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

/// External membership directory interface.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// Whether `user_id` is an active member of `tenant_id`.
    async fn is_active_member(&self, user_id: Uuid, tenant_id: Uuid) -> Result<bool>;
}

/// Fixed membership set. Useful for tests and single-box deployments.
#[derive(Debug, Default)]
pub struct StaticMembership {
    members: HashSet<(Uuid, Uuid)>,
}

impl StaticMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, user_id: Uuid, tenant_id: Uuid) -> Self {
        self.members.insert((user_id, tenant_id));
        self
    }
}

#[async_trait]
impl MembershipResolver for StaticMembership {
    async fn is_active_member(&self, user_id: Uuid, tenant_id: Uuid) -> Result<bool> {
        Ok(self.members.contains(&(user_id, tenant_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_membership() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let resolver = StaticMembership::new().with_member(user, tenant);

        assert!(resolver.is_active_member(user, tenant).await.unwrap());
        assert!(!resolver
            .is_active_member(Uuid::new_v4(), tenant)
            .await
            .unwrap());
    }
}
