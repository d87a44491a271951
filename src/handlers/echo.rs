//! Message echo page, served at `/vulnerable` and `/echo`.

use axum::extract::Query;
use axum::response::Html;
use tracing::instrument;

use crate::models::{EchoParams, QueryPairs};
use crate::utils::escape_html;

/// Render the message inside a minimal HTML page, escaped.
#[instrument(skip(query))]
pub async fn echo_message(Query(query): Query<QueryPairs>) -> Html<String> {
    let params = EchoParams::from(query);
    let message = escape_html(params.message.as_deref().unwrap_or_default());
    Html(format!(
        "<html><body><h1>User Message:</h1><p>{message}</p></body></html>"
    ))
}
