//! Fuzzy string scoring for name lookups
//!
//! Scores are 0-100, case-insensitive, built on normalized Levenshtein
//! similarity. Token-sort variants make word order irrelevant ("James
//! LeBron" vs "LeBron James"); the partial variant matches a short query
//! against the best-aligned window of a longer candidate.

use strsim::normalized_levenshtein;

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Plain similarity ratio.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    normalized_levenshtein(&a, &b) * 100.0
}

/// Similarity after sorting each side's tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_tokens(&normalize(a)), &sort_tokens(&normalize(b)))
}

/// Best alignment of the shorter string against same-length windows of the
/// longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let short_len = short.chars().count();
    if short_len == 0 {
        return 0.0;
    }
    let long_chars: Vec<char> = long.chars().collect();
    if long_chars.len() == short_len {
        return normalized_levenshtein(&short, &long) * 100.0;
    }

    let mut best = 0.0f64;
    for window in long_chars.windows(short_len) {
        let candidate: String = window.iter().collect();
        let score = normalized_levenshtein(&short, &candidate) * 100.0;
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Partial ratio over token-sorted strings, the score used for team-name
/// lookup.
pub fn partial_token_sort_ratio(a: &str, b: &str) -> f64 {
    partial_ratio(&sort_tokens(&normalize(a)), &sort_tokens(&normalize(b)))
}
