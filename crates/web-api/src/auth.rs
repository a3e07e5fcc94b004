//! JWT 认证
//!
//! 令牌只携带用户ID，每次请求都会回到身份服务读取最新的用户信息，
//! 因此邮箱验证状态的变化立即生效。登出时令牌的 `jti` 进入黑名单，
//! 直到令牌自然过期。

use std::sync::Arc;

use application::TokenBlacklist;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use config::AuthConfig;
use domain::{AuthUser, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    /// 令牌唯一标识，注销时按它拉黑
    pub jti: Uuid,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::from(self.user_id)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Clone)]
pub struct JwtService {
    expiration_hours: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl JwtService {
    pub fn new(config: &AuthConfig, blacklist: Arc<dyn TokenBlacklist>) -> Self {
        Self {
            expiration_hours: config.expiration_hours,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            blacklist,
        }
    }

    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = Utc::now() + chrono::Duration::hours(self.expiration_hours);
        let claims = Claims {
            user_id: user_id.into(),
            jti: Uuid::new_v4(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("token generation failed: {err}")))
    }

    /// 校验签名、有效期和黑名单
    pub async fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))?;

        if self.blacklist.is_revoked(&claims.jti.to_string()).await? {
            return Err(ApiError::unauthorized("token has been revoked"));
        }
        Ok(claims)
    }

    pub async fn extract_claims_from_headers(&self, headers: &HeaderMap) -> Result<Claims, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))?;

        self.verify_token(token).await
    }

    /// 令牌在剩余有效期内不再可用
    pub async fn revoke(&self, claims: &Claims) -> Result<(), ApiError> {
        self.blacklist
            .revoke(&claims.jti.to_string(), claims.expires_at())
            .await?;
        info!(user_id = %claims.user_id, "token revoked");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: AuthUser,
    pub token: String,
}
