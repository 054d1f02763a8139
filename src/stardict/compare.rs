//! The headword ordering every index in the format is sorted by.

use std::cmp::Ordering;

/// Compare two headwords the way StarDict index files are sorted:
/// case-insensitively over ASCII letters first, with a byte-wise comparison
/// as the tiebreak. Bytes ≥ 0x80 compare as unsigned, so multi-byte UTF-8
/// sorts after ASCII.
///
/// Every binary search in the crate depends on this exact order; locale
/// collation must never be substituted for it.
pub fn stardict_strcmp(a: &str, b: &str) -> Ordering {
    stardict_strcmp_bytes(a.as_bytes(), b.as_bytes())
}

/// Byte-slice form of [`stardict_strcmp`]; index files compare their keys
/// without assuming valid UTF-8.
pub fn stardict_strcmp_bytes(a: &[u8], b: &[u8]) -> Ordering {
    match ascii_strcasecmp(a, b) {
        Ordering::Equal => a.cmp(b),
        ord => ord,
    }
}

/// The comparator's primary level alone: byte-wise comparison after folding
/// ASCII `A-Z` to lowercase.
///
/// Index order refines this (primary first, byte-wise tiebreak), so entries
/// equal under it sit contiguously. Lookups navigate and match with the
/// primary level — a query differing from a stored headword only in ASCII
/// case still finds it, and the duplicate walk collects every case variant.
pub(crate) fn ascii_strcasecmp(a: &[u8], b: &[u8]) -> Ordering {
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x.to_ascii_lowercase(), y.to_ascii_lowercase());
        match x.cmp(&y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// True when every byte of the word is ASCII. The English morphology rules
/// only apply to such words.
pub fn is_pure_english(word: &str) -> bool {
    word.bytes().all(|b| b.is_ascii())
}

/// Vowel test used by the doubled-consonant morphology rules.
pub fn is_vowel(ch: u8) -> bool {
    matches!(ch.to_ascii_uppercase(), b'A' | b'E' | b'I' | b'O' | b'U')
}
