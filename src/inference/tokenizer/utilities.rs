use std::collections::BTreeMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// The regex pattern used for initial text splitting, shared by the GPT-2
/// and RoBERTa byte-level BPE vocabularies
pub static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)('s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+").unwrap()
});

/// Mapping from bytes to unicode characters, avoiding whitespace/control
/// characters so every byte has a printable stand-in in the vocabulary
pub static BYTES_TO_UNICODE: Lazy<BTreeMap<u8, char>> = Lazy::new(|| {
    let mut bs: Vec<u8> = Vec::new();
    // Range 33-126 is printable ASCII
    bs.extend(33..=126);
    // Range 161-172 + 174-255 is printable Latin-1 Supplement
    bs.extend(161..=172);
    bs.extend(174..=255);

    // Printable bytes map to themselves
    let mut cs: Vec<u32> = bs.iter().map(|&b| b as u32).collect();

    // Remaining bytes map to code points starting at 256
    let mut n = 0u32;
    for b in 0..=255u8 {
        if !bs.contains(&b) {
            bs.push(b);
            cs.push(256 + n);
            n += 1;
        }
    }

    // Create the mapping
    bs.into_iter()
        .zip(cs.into_iter().map(|c| char::from_u32(c).unwrap()))
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_unicode_covers_all_bytes() {
        assert_eq!(BYTES_TO_UNICODE.len(), 256);
    }

    #[test]
    fn test_bytes_to_unicode_printable_ascii_maps_to_itself() {
        assert_eq!(BYTES_TO_UNICODE[&b'a'], 'a');
        assert_eq!(BYTES_TO_UNICODE[&b'Z'], 'Z');
        assert_eq!(BYTES_TO_UNICODE[&b'!'], '!');
    }

    #[test]
    fn test_bytes_to_unicode_space_is_remapped() {
        // Space maps to the conventional byte-level BPE stand-in U+0120
        assert_eq!(BYTES_TO_UNICODE[&b' '], '\u{0120}');
    }

    #[test]
    fn test_pattern_splits_words_and_punctuation() {
        let pieces: Vec<&str> = PATTERN.find_iter("Hello, world!").map(|m| m.as_str()).collect();
        assert_eq!(pieces, vec!["Hello", ",", " world", "!"]);
    }
}
