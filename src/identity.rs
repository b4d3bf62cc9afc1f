//! Identity canonicalization.
//!
//! Every player is keyed by an *identity*: the display name lowercased with
//! everything but ASCII letters and digits stripped. Bracket slots, ladder
//! rows, and head-to-head records all use identities as keys; the
//! original-case display string is stored separately wherever it is needed
//! for rendering.

/// Canonicalizes a display name into an identity.
///
/// ```
/// use arena_ladder::identity::to_id;
///
/// assert_eq!(to_id("Alice"), "alice");
/// assert_eq!(to_id(" A l i c e !"), "alice");
/// assert_eq!(to_id("Nido-Rán 4"), "nidorn4");
/// ```
pub fn to_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
