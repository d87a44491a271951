mod api;
mod books;

pub use api::{
    EchoParams, HealthResponse, LoginParams, QueryPairs, SearchParams, TokenResponse,
};
pub use books::{Book, SearchResults};
