//! Domain keyword prefix applied before a query reaches any provider

/// Keywords that bias providers towards clinical sources
pub const QUERY_PREFIX: &str = "medical research healthcare";

/// Prefix the raw question with the domain keywords
pub fn enhance(raw: &str) -> String {
    format!("{} {}", QUERY_PREFIX, raw)
}
