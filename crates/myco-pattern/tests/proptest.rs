//! Property-based tests for the pattern tokenizer.

use myco_pattern::{escape_like, like_matches, like_pattern, tokenize, BooleanExpr};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn text_with_specials() -> impl Strategy<Value = String> {
    "[a-zA-Z %_\\\\]{0,8}"
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Free text never makes the tokenizer panic.
    #[test]
    fn tokenize_never_panics(input in any::<String>()) {
        let _ = tokenize(&input);
    }

    /// Whitespace-only input matches everything.
    #[test]
    fn blank_is_everything(input in "[ \t\n]{0,10}") {
        prop_assert_eq!(tokenize(&input), BooleanExpr::Everything);
        prop_assert!(tokenize(&input).matches("anything at all"));
    }

    /// Lowercase words are ANDed one-for-one.
    #[test]
    fn words_are_anded(words in prop::collection::vec(word(), 2..6)) {
        let expr = tokenize(&words.join(" "));
        match expr {
            BooleanExpr::And(parts) => prop_assert_eq!(parts.len(), words.len()),
            other => prop_assert!(false, "expected And, got {:?}", other),
        }
    }

    /// A haystack containing every word matches the ANDed pattern.
    #[test]
    fn all_words_present_matches(words in prop::collection::vec(word(), 1..5)) {
        let haystack = words.join("-");
        prop_assert!(tokenize(&words.join(" ")).matches(&haystack));
    }

    /// Negating a word present in the haystack rejects it.
    #[test]
    fn negated_present_word_rejects(w in word(), padding in word()) {
        let haystack = format!("{padding} {w} {padding}");
        let expr = tokenize(&format!("-{w}"));
        prop_assert!(!expr.matches(&haystack));
    }

    /// An OR-group matches when only one side is present.
    #[test]
    fn or_matches_either_side(a in word(), b in word()) {
        let expr = tokenize(&format!("{a} OR {b}"));
        prop_assert!(expr.matches(&a));
        prop_assert!(expr.matches(&b));
    }

    /// `like_pattern` of any substring matches the enclosing text.
    #[test]
    fn like_pattern_finds_substring(
        prefix in text_with_specials(),
        middle in text_with_specials(),
        suffix in text_with_specials(),
    ) {
        let text = format!("{prefix}{middle}{suffix}");
        prop_assert!(like_matches(&text, &like_pattern(&middle)));
    }

    /// An escaped string matches itself and only itself (up to case).
    #[test]
    fn escaped_text_matches_exactly(text in text_with_specials(), extra in "[a-z]{1,3}") {
        let pattern = escape_like(&text);
        prop_assert!(like_matches(&text, &pattern));
        let longer = format!("{text}{extra}");
        prop_assert!(!like_matches(&longer, &pattern));
    }
}
