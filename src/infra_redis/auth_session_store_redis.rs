use crate::application_port::*;
use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Revoked-token denylist keyed by jti. An entry outlives the token it
/// blocks because its TTL is set to the token's remaining lifetime.
pub struct RedisAuthSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisAuthSessionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisAuthSessionStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, jti: &str) -> String {
        format!("{}:{}", self.prefix, jti)
    }
}

#[async_trait::async_trait]
impl AuthSessionStore for RedisAuthSessionStore {
    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let key = self.key(jti);
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(exists)
    }

    async fn revoke(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthError> {
        let key = self.key(jti);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, 1u8, ttl_secs)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }
}
