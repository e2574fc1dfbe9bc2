//! Fuzzy name matching.
//!
//! Registry records and claimed identities rarely agree byte-for-byte:
//! registries shout in uppercase, clerks transpose first/last order, and
//! applicants abbreviate. `name_similarity` scores two free-text names in
//! [0.0, 1.0] with 1.0 meaning identical after normalization. Pure
//! functions, no state; safe to call concurrently.

/// Acceptance floor shared by callers that have no jurisdiction-specific
/// threshold of their own. Individual adapters override this; see their
/// docs.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Lowercase and collapse internal whitespace.
fn normalize(name: &str) -> String {
    name.split_whitespace()
        .map(|token| token.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The normalized form with tokens sorted, so "House Gregory" and
/// "Gregory House" compare equal.
fn token_sorted(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split(' ').collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Similarity of two names in [0.0, 1.0].
///
/// Jaro-Winkler over the normalized strings, taken as the max of the literal
/// and token-sorted forms; token order carries no identity information
/// (surname-first registry entries must not tank the score). An empty name
/// on either side scores 0.0: a blank field is absence of evidence, not a
/// match.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    let direct = strsim::jaro_winkler(&na, &nb);
    let sorted = strsim::jaro_winkler(&token_sorted(&na), &token_sorted(&nb));
    direct.max(sorted)
}

/// True if the names score at or above `min_confidence`.
pub fn is_match(a: &str, b: &str, min_confidence: f64) -> bool {
    name_similarity(a, b) >= min_confidence
}

/// True if the two names are identical after normalization, in either token
/// order.
///
/// The strictest bar an adapter can apply: auto-verification policies that
/// tolerate no spelling drift use this instead of a score threshold.
pub fn is_exact_match(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    !na.is_empty() && (na == nb || token_sorted(&na) == token_sorted(&nb))
}
