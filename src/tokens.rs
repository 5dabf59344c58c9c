//! Token estimation and text normalization shared by the batcher and the
//! throttle.

/// Rough cost of a text in translation tokens: one token per four characters,
/// rounded up, never less than one.
///
/// Counts Unicode scalar values rather than bytes so non-Latin scripts are not
/// overcharged.
pub fn approx_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4).max(1)
}

/// Normalize text for identity comparisons: trim, then collapse every
/// whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
