use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("session revoked")]
    SessionRevoked,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Verifies an already-issued bearer credential into a member identity.
/// Token issuance and refresh live in the identity service, not here.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<MemberId, AuthError>;
}

#[derive(Debug)]
pub struct TokenVerifyResult {
    pub member_id: MemberId,
    pub jti: Option<String>,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    /// Issuance is kept for tests and tooling; production tokens come from
    /// the identity service signed with the same key.
    async fn issue_access_token(
        &self,
        member: MemberId,
        jti: Option<String>,
    ) -> Result<(String, chrono::DateTime<chrono::Utc>), AuthError>;

    async fn verify_access_token(&self, token: &str) -> Result<TokenVerifyResult, AuthError>;
}
