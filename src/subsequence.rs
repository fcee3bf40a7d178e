//! Byte-pattern search used for boundary detection.

/// Binary pattern search - find the first index of `needle` in `haystack`.
///
/// An empty needle matches at index 0; a needle longer than the haystack never
/// matches. No text encoding is assumed.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }

    let first = needle[0];
    (0..=(haystack.len() - needle.len()))
        .find(|&i| haystack[i] == first && haystack[i..i + needle.len()] == *needle)
}

/// Length of the longest suffix of `haystack` that is a proper prefix of `needle`.
///
/// Those bytes may be the start of a match that continues in data not read yet.
pub fn partial_suffix_len(haystack: &[u8], needle: &[u8]) -> usize {
    let max = needle.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&len| haystack[haystack.len() - len..] == needle[..len])
        .unwrap_or(0)
}
