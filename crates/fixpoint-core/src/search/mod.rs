//! Search module - query sanitization and vector lookup
//!
//! The keyword fallback goes through SQLite `LIKE`; queries are escaped
//! here so user-controlled text cannot smuggle wildcards into the store.

#[cfg(feature = "vector-search")]
mod vector;

#[cfg(feature = "vector-search")]
pub use vector::{VectorIndex, VectorSearchError};

/// Escape `LIKE` metacharacters so a query matches literally
///
/// Pairs with `ESCAPE '\'` in the SQL. Without this, a query containing
/// `%` or `_` would act as a wildcard against the store.
pub fn escape_like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        match ch {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}
