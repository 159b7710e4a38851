//! `POST /authorize`: exchanges a bearer token plus a cluster id for a
//! short-lived client JWT carrying the labels every metric family this
//! client later uploads will be stamped with.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::Form;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::middleware::extract_bearer;
use crate::state::{AppState, TOKEN_AUDIENCE, TOKEN_ISSUER};

#[derive(Debug, Deserialize)]
pub struct AuthorizeForm {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub version: u32,
    pub token: String,
    #[serde(rename = "expiresInSeconds")]
    pub expires_in_seconds: i64,
    pub labels: BTreeMap<String, String>,
}

pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<AuthorizeForm>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let token = extract_bearer(&headers)?;
    let subject = state.authorizer.authorize_cluster(token, &form.id).await?;

    let mut labels: BTreeMap<String, String> = state.config.fixed_labels().into_iter().collect();
    labels.insert(state.config.partition_label.clone(), form.id.clone());

    let issued = state
        .signer
        .issue(
            &subject,
            labels.clone(),
            TOKEN_ISSUER,
            TOKEN_AUDIENCE,
            state.config.token_expire_seconds,
        )
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse {
        version: 1,
        token: issued,
        expires_in_seconds: state.config.token_expire_seconds,
        labels,
    }))
}
