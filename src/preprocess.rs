// src/preprocess.rs
//! Headline preprocessing for classification: strip non-alphabetic characters,
//! lowercase, tokenize, drop stopwords, lemmatize, rejoin.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    include_str!("stopwords.txt")
        .lines()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect()
});

static RE_NON_ALPHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("non-alpha regex"));

/// Normalize a headline into the token stream the classifier was trained on.
pub fn preprocess(text: &str) -> String {
    let stripped = RE_NON_ALPHA.replace_all(text, "");
    let lowered = stripped.to_lowercase();

    let tokens: Vec<String> = lowered
        .split_whitespace()
        .filter(|tok| !STOPWORDS.contains(*tok))
        .map(lemmatize)
        .collect();

    tokens.join(" ")
}

/// Suffix-family lemmatizer. Covers the plural and participle forms that occur in
/// the embedded model's vocabulary; anything else passes through untouched.
fn lemmatize(token: &str) -> String {
    let n = token.len();

    if n > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..n - 3]);
    }
    if n > 4 && (token.ends_with("sses") || token.ends_with("shes") || token.ends_with("ches")) {
        return token[..n - 2].to_string();
    }
    if n > 3 && token.ends_with('s') && !token.ends_with("ss") && !token.ends_with("us") {
        return token[..n - 1].to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_digits() {
        assert_eq!(preprocess("Magnitude 7.4 quake!"), "magnitude quake");
    }

    #[test]
    fn removes_stopwords_and_lowercases() {
        assert_eq!(
            preprocess("The fire and the floods"),
            "fire flood" // "the"/"and" dropped, plural lemmatized
        );
    }

    #[test]
    fn lemmatizes_plurals() {
        assert_eq!(lemmatize("casualties"), "casualty");
        assert_eq!(lemmatize("ashes"), "ash");
        assert_eq!(lemmatize("quakes"), "quake");
        assert_eq!(lemmatize("virus"), "virus");
        assert_eq!(lemmatize("class"), "class");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(preprocess("1234 !!"), "");
    }
}
