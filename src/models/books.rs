use serde::{Deserialize, Serialize};

/// A single catalog entry.
///
/// Only the title is kept; every other field the catalog returns is
/// ignored during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Title as reported by the catalog (empty when the catalog omits it)
    #[serde(default)]
    pub title: String,
}

/// Search results in catalog order.
///
/// This is both the decoding target for the upstream body and the success
/// response of the search endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub docs: Vec<Book>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Titles in catalog order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(|b| b.title.as_str())
    }
}
