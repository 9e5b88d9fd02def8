use crate::application_port::*;

/// Denylist of revoked token ids, consulted on every credential check.
/// Entries carry a TTL matching the token's remaining lifetime.
#[async_trait::async_trait]
pub trait AuthSessionStore: Send + Sync {
    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError>;

    async fn revoke(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthError>;
}
