use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use sha2::{Digest, Sha256};

use crate::api::errors::ApiError;
use crate::core::state::AppState;

/// Operator access to `/api/v1`. Open when no operator secret is configured.
pub(crate) struct OperatorAuth;

#[async_trait]
impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.settings().security().operator_secret.as_deref() else {
            return Ok(OperatorAuth);
        };

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid operator credentials"))?;

        if fingerprint(token.trim()) != fingerprint(secret) {
            return Err(ApiError::Unauthorized("Invalid operator credentials"));
        }

        Ok(OperatorAuth)
    }
}

fn fingerprint(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
