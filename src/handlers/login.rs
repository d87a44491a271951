//! Token issuing handler.
//!
//! `GET /login?username=..&password=..` accepts any non-empty pair; there is
//! no credential store. The warning logged at startup says as much.

use axum::Json;
use axum::extract::{Query, State};
use tracing::{info, instrument};

use crate::error::AppResult;
use crate::metrics;
use crate::models::{LoginParams, QueryPairs, TokenResponse};
use crate::state::AppState;
use crate::validation::validate_credentials;

/// Issue a signed bearer token.
///
/// # Response Body
///
/// ```json
/// { "token": "eyJhbGciOi...", "token_type": "Bearer", "expires_in": 3600 }
/// ```
#[instrument(skip(state, query))]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> AppResult<Json<TokenResponse>> {
    let params = LoginParams::from(query);
    let (username, _password) =
        validate_credentials(params.username.as_deref(), params.password.as_deref())?;

    let issued = state.tokens.issue(username)?;
    metrics::record_token_issued();
    info!(username = %username, "Token issued");

    Ok(Json(TokenResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_in: issued.expires_in.as_secs(),
    }))
}
