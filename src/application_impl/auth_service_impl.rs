use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::AuthSessionStore;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // member id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

fn encode_access(
    member: MemberId,
    jti: String,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.access_ttl;
    let claims = AccessClaims {
        sub: member.0.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn decode_access(token: &str, cfg: &JwtConfig) -> Result<AccessClaims, AuthError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&cfg.signing_key), &v)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;
    Ok(data.claims)
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[inline]
    fn parse_member_id(sub: &str) -> Result<MemberId, AuthError> {
        sub.parse::<MemberId>().map_err(|_| AuthError::TokenInvalid)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        member: MemberId,
        jti: Option<String>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let jti = jti.unwrap_or_else(Self::gen_jti);
        encode_access(member, jti, &self.cfg)
    }

    async fn verify_access_token(&self, token: &str) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_access(token, &self.cfg)?;
        let member_id = Self::parse_member_id(&claims.sub)?;
        Ok(TokenVerifyResult {
            member_id,
            jti: Some(claims.jti),
        })
    }
}

/// Revocation backend for deployments without Redis: nothing is ever revoked.
pub struct NullSessionStore;

#[async_trait::async_trait]
impl AuthSessionStore for NullSessionStore {
    async fn is_revoked(&self, _jti: &str) -> Result<bool, AuthError> {
        Ok(false)
    }

    async fn revoke(&self, _jti: &str, _ttl_secs: u64) -> Result<(), AuthError> {
        Ok(())
    }
}

pub struct RealAuthService {
    token_codec: Arc<dyn TokenCodec>,
    session_store: Arc<dyn AuthSessionStore>,
    revocation_timeout: Duration,
}

impl RealAuthService {
    pub fn new(token_codec: Arc<dyn TokenCodec>, session_store: Arc<dyn AuthSessionStore>) -> Self {
        Self {
            token_codec,
            session_store,
            revocation_timeout: Duration::from_secs(2),
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn verify_token(&self, token: &str) -> Result<MemberId, AuthError> {
        let verified = self.token_codec.verify_access_token(token).await?;

        if let Some(jti) = &verified.jti {
            // Bounded: a slow denylist must fail the check, not hang the
            // connection.
            let check =
                tokio::time::timeout(self.revocation_timeout, self.session_store.is_revoked(jti))
                    .await;
            match check {
                Ok(Ok(false)) => {}
                Ok(Ok(true)) => return Err(AuthError::SessionRevoked),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(AuthError::Store("revocation check timed out".to_owned())),
            }
        }

        Ok(verified.member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> JwtConfig {
        JwtConfig {
            issuer: "tradepost.auth".to_string(),
            audience: "market-client".to_string(),
            access_ttl: Duration::from_secs(3600),
            signing_key: b"test-signing-key".to_vec(),
        }
    }

    #[tokio::test]
    async fn verify_roundtrip() {
        let codec = JwtHs256Codec::new(cfg());
        let (token, _exp) = codec
            .issue_access_token(MemberId(17), None)
            .await
            .expect("issue");

        let service = RealAuthService::new(Arc::new(codec), Arc::new(NullSessionStore));
        let member = service.verify_token(&token).await.expect("verify");
        assert_eq!(member, MemberId(17));
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let service = RealAuthService::new(
            Arc::new(JwtHs256Codec::new(cfg())),
            Arc::new(NullSessionStore),
        );
        let err = service.verify_token("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn wrong_key_is_invalid() {
        let issuer = JwtHs256Codec::new(JwtConfig {
            signing_key: b"some-other-key".to_vec(),
            ..cfg()
        });
        let (token, _) = issuer
            .issue_access_token(MemberId(1), None)
            .await
            .expect("issue");

        let service = RealAuthService::new(
            Arc::new(JwtHs256Codec::new(cfg())),
            Arc::new(NullSessionStore),
        );
        let err = service.verify_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    struct DenyAllStore;

    #[async_trait::async_trait]
    impl crate::domain_port::AuthSessionStore for DenyAllStore {
        async fn is_revoked(&self, _jti: &str) -> Result<bool, AuthError> {
            Ok(true)
        }

        async fn revoke(&self, _jti: &str, _ttl_secs: u64) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn revoked_jti_is_rejected() {
        let codec = JwtHs256Codec::new(cfg());
        let (token, _) = codec
            .issue_access_token(MemberId(5), Some("jti-5".to_string()))
            .await
            .expect("issue");

        let service = RealAuthService::new(Arc::new(codec), Arc::new(DenyAllStore));
        let err = service.verify_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked));
    }
}
