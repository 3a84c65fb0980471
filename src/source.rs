//! # Source Module
//!
//! Defines the `PageSource` trait, the interface between the harvester and
//! whatever mechanism actually fetches catalog pages.
//!
//! ## Overview
//!
//! A `PageSource` turns an identifier into a document, extracts a (possibly
//! partial) attribute record from it, and reports the neighboring
//! identifiers advertised on the page. Each worker owns its source
//! exclusively, so implementations are free to hold non-`Sync` state such
//! as a browser session. The harvester never looks inside a document; it
//! only threads it between `fetch`, `parse` and `discover`.
//!
//! ## Implementation
//!
//! Implementors must define:
//! - `Document`: whatever `fetch` produces (raw markup, a DOM handle, ...)
//! - `fetch`: resolve an identifier to a document, failing with [`FetchError`]
//! - `parse`: extract attributes; absent fields are normal, not an error
//! - `discover`: neighbor identifiers; implementations swallow their own
//!   failures and return an empty set
//!
//! ## Example
//!
//! ```rust,ignore
//! use harvester_core::source::{AttributeRecord, PageSource};
//! use harvester_core::error::FetchError;
//! use std::collections::HashSet;
//!
//! struct StoreSession { /* browser handle */ }
//!
//! #[async_trait::async_trait]
//! impl PageSource for StoreSession {
//!     type Document = String;
//!
//!     async fn fetch(&mut self, identifier: &str) -> Result<String, FetchError> {
//!         todo!("navigate to the listing page for `identifier`")
//!     }
//!
//!     async fn parse(&mut self, document: &String) -> AttributeRecord {
//!         todo!("extract whatever attributes are present")
//!     }
//!
//!     async fn discover(&mut self, document: &String) -> HashSet<String> {
//!         todo!("collect identifiers from the similar-items strip")
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::FetchError;

/// Attributes extracted from a single catalog page, keyed by field name.
///
/// Partial extraction is expected and normal; no key is guaranteed present.
pub type AttributeRecord = HashMap<String, String>;

/// Listing categories the harvester accepts. Records whose category is
/// absent or not in this list are rejected without output or discovery.
pub const ACCEPTED_CATEGORIES: [&str; 17] = [
    "Action",
    "Adventure",
    "Arcade",
    "Board",
    "Card",
    "Casino",
    "Casual",
    "Educational",
    "Music",
    "Puzzle",
    "Racing",
    "Role_Playing",
    "Simulation",
    "Sports",
    "Strategy",
    "Trivia",
    "Word",
];

/// Canonical form of a category as it appears in [`ACCEPTED_CATEGORIES`]:
/// pages render multi-word categories with spaces, the allow-list and the
/// output schema use underscores.
pub fn normalize_category(raw: &str) -> String {
    raw.replace(' ', "_")
}

/// The default allow-list, [`ACCEPTED_CATEGORIES`] as an owned set.
pub fn default_categories() -> HashSet<String> {
    ACCEPTED_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Fetches and dissects catalog pages on behalf of a single worker.
#[async_trait]
pub trait PageSource: Send + 'static {
    /// Whatever `fetch` produces and `parse`/`discover` consume.
    type Document: Send;

    /// Resolves an identifier to its page document.
    async fn fetch(&mut self, identifier: &str) -> Result<Self::Document, FetchError>;

    /// Extracts the attributes present on the page. Missing fields are
    /// simply absent from the returned record.
    async fn parse(&mut self, document: &Self::Document) -> AttributeRecord;

    /// Collects the neighbor identifiers the page links to. May be empty;
    /// implementations swallow their own failures and return an empty set.
    async fn discover(&mut self, document: &Self::Document) -> HashSet<String>;

    /// Releases any underlying resource (a browser session, a connection).
    /// Called once when the owning worker exits.
    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_word_categories_normalize_to_allow_list_form() {
        assert_eq!(normalize_category("Role Playing"), "Role_Playing");
        assert!(default_categories().contains(&normalize_category("Role Playing")));
    }

    #[test]
    fn single_word_categories_pass_through() {
        assert_eq!(normalize_category("Puzzle"), "Puzzle");
    }
}
