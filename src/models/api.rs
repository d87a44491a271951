use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query string pairs in request order, repeated keys included.
///
/// The typed params below take the first value of a repeated key.
pub type QueryPairs = Vec<(String, String)>;

fn first_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.clone())
}

/// Query string for the search endpoints.
#[derive(Debug, Default)]
pub struct SearchParams {
    /// Author to search for; missing and empty are both rejected
    pub author: Option<String>,
}

impl From<QueryPairs> for SearchParams {
    fn from(pairs: QueryPairs) -> Self {
        Self {
            author: first_value(&pairs, "author"),
        }
    }
}

/// Query string for `/login`.
#[derive(Debug, Default)]
pub struct LoginParams {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl From<QueryPairs> for LoginParams {
    fn from(pairs: QueryPairs) -> Self {
        Self {
            username: first_value(&pairs, "username"),
            password: first_value(&pairs, "password"),
        }
    }
}

/// Query string for the echo endpoint.
#[derive(Debug, Default)]
pub struct EchoParams {
    pub message: Option<String>,
}

impl From<QueryPairs> for EchoParams {
    fn from(pairs: QueryPairs) -> Self {
        Self {
            message: first_value(&pairs, "message"),
        }
    }
}

/// Response after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed bearer token
    pub token: String,
    /// Always `"Bearer"`
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests
    pub status: String,
    /// Application version
    pub version: String,
    /// Seconds since the application started
    pub uptime_seconds: u64,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}
