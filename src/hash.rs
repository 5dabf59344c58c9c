//! Content fingerprints and cache keys.
//!
//! Keys have the shape `{provider}:{source}-{target}:{hash8}` where `hash8` is
//! the 32-bit FNV-1a fingerprint of the normalized text, rendered as eight
//! lowercase hex digits. The hash always covers the whole string: long texts
//! that share a prefix must land on different keys.
//!
//! ```rust
//! use tolk::hash::generate_cache_key;
//!
//! let single = generate_cache_key(&["a|||b"], "en", "fi", "opus-mt");
//! let list = generate_cache_key(&["a", "b"], "en", "fi", "opus-mt");
//! assert_eq!(single, list);
//! ```

use crate::tokens::normalize;

/// Separator placed between texts when a key covers several of them.
pub const KEY_DELIMITER: &str = "|||";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-8 bytes of `text`.
pub fn fnv1a32(text: &str) -> u32 {
    text.bytes().fold(FNV_OFFSET_BASIS, |acc, byte| {
        (acc ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Eight-hex-digit fingerprint of `text`.
pub fn hash(text: &str) -> String {
    format!("{:08x}", fnv1a32(text))
}

/// Build the cache/dedup key for one or more texts.
///
/// Each text is normalized, the list is joined with [`KEY_DELIMITER`], and the
/// joined string is hashed in full.
pub fn generate_cache_key<S: AsRef<str>>(
    texts: &[S],
    source: &str,
    target: &str,
    provider: &str,
) -> String {
    let joined = texts
        .iter()
        .map(|t| normalize(t.as_ref()))
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER);
    format!("{provider}:{source}-{target}:{}", hash(&joined))
}
