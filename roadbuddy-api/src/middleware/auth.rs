use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::typed_header::TypedHeaderRejection;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use roadbuddy_core::identity::{CurrentUser, IdentityResolver};
use roadbuddy_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RiderClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn issue_token(secret: &str, expiration_seconds: u64, sub: &str, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = RiderClaims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::seconds(expiration_seconds as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Resolves HS256 bearer tokens signed with the service secret.
pub struct JwtIdentityResolver {
    key: DecodingKey,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, credential: &str) -> CoreResult<CurrentUser> {
        let token_data = decode::<RiderClaims>(credential, &self.key, &Validation::default())
            .map_err(|e| CoreError::IdentityError(e.to_string()))?;

        Ok(CurrentUser {
            id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }
}

/// Rejects requests without a valid bearer token and makes the caller
/// available to handlers as `Extension<CurrentUser>`.
pub async fn require_user(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user = state.identity.resolve(bearer.token()).await.map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
