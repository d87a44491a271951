//! Author search handler.
//!
//! # Endpoints
//!
//! - `GET /api/search?author=..` - Bearer token required
//! - `GET /search?author=..` - Public, unless `PUBLIC_SEARCH=false`
//!
//! Both routes share [`search_books`] and pass through the rate limiter.

use axum::Json;
use axum::extract::{Extension, Query, State};
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::middleware::{AuthenticatedUser, RequestTimeout};
use crate::models::{QueryPairs, SearchParams, SearchResults};
use crate::state::AppState;
use crate::validation::validate_author;

/// Look up books by author in the upstream catalog.
///
/// # Response Body
///
/// ```json
/// { "docs": [ { "title": "The Hobbit" }, { "title": "The Silmarillion" } ] }
/// ```
///
/// An empty result list is a 404 naming the author as given. A repeated
/// `author` key uses its first value.
#[instrument(skip(state, query, user), fields(username))]
pub async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    RequestTimeout(timeout): RequestTimeout,
    user: Option<Extension<AuthenticatedUser>>,
) -> AppResult<Json<SearchResults>> {
    if let Some(Extension(user)) = &user {
        tracing::Span::current().record("username", user.username.as_str());
    }

    let params = SearchParams::from(query);
    let author = validate_author(params.author.as_deref())?;

    let results = state.catalog.search_by_author(author, timeout).await?;
    if results.is_empty() {
        return Err(AppError::NotFound(format!(
            "No books found for author {author}"
        )));
    }

    info!(author = %author, results = results.len(), "Search complete");
    Ok(Json(results))
}
