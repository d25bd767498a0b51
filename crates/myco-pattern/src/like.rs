//! SQL `LIKE` patterns: building them from search terms and matching them.
//!
//! Patterns use `%` for any run of characters, `_` for exactly one
//! character and `\` to escape the next character. Matching is
//! case-insensitive, like the default collation of the stores this engine
//! targets.

/// Escapes `%`, `_` and `\` so `text` matches only itself.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Converts a user search term into a substring pattern `%term%`.
///
/// `*` is the user-facing wildcard and becomes `%`; every other LIKE
/// metacharacter is escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('%');
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece {
    Many,
    One,
    Lit(char),
}

fn compile(pattern: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                if pieces.last() != Some(&Piece::Many) {
                    pieces.push(Piece::Many);
                }
            }
            '_' => pieces.push(Piece::One),
            // A trailing backslash stands for itself.
            '\\' => pieces.extend(chars.next().or(Some('\\')).map(fold_char)),
            _ => pieces.push(fold_char(c)),
        }
    }
    pieces
}

fn fold_char(c: char) -> Piece {
    Piece::Lit(c.to_lowercase().next().unwrap_or(c))
}

/// Returns `true` if `text` matches the LIKE `pattern`.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let pieces = compile(pattern);
    let text: Vec<char> = text
        .chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect();

    // Greedy wildcard matching with single-point backtracking.
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pieces.get(p) {
            Some(Piece::Many) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(Piece::One) => {
                t += 1;
                p += 1;
                continue;
            }
            Some(Piece::Lit(c)) if *c == text[t] => {
                t += 1;
                p += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, mark)) => {
                p = star + 1;
                t = mark + 1;
                backtrack = Some((star, mark + 1));
            }
            None => return false,
        }
    }

    pieces[p..].iter().all(|piece| *piece == Piece::Many)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_wraps_and_maps_wildcard() {
        assert_eq!(like_pattern("ama*ita"), "%ama%ita%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn escape_leaves_plain_text() {
        assert_eq!(escape_like("California, USA"), "California, USA");
        assert_eq!(escape_like("a_b"), "a\\_b");
    }

    #[test]
    fn matches_substring_case_insensitively() {
        assert!(like_matches("Amanita Muscaria", "%muscaria%"));
        assert!(like_matches("AMANITA", "amanita"));
        assert!(!like_matches("Amanita", "%boletus%"));
    }

    #[test]
    fn matches_anchors() {
        assert!(like_matches("Albion, California, USA", "%, USA"));
        assert!(!like_matches("USA, Albion", "%, USA"));
        assert!(like_matches("Amanita muscaria", "Amanita %"));
        assert!(!like_matches("Amanitaceae", "Amanita %"));
    }

    #[test]
    fn matches_single_char_and_escapes() {
        assert!(like_matches("cat", "c_t"));
        assert!(!like_matches("ct", "c_t"));
        assert!(like_matches("50% off", "%50\\% %"));
        assert!(!like_matches("500 off", "%50\\% %"));
    }

    #[test]
    fn empty_cases() {
        assert!(like_matches("", "%"));
        assert!(like_matches("", ""));
        assert!(!like_matches("", "_"));
        assert!(!like_matches("a", ""));
    }

    #[test]
    fn backtracking() {
        assert!(like_matches("aaab", "%aab"));
        assert!(like_matches("abcabd", "%abd"));
        assert!(like_matches("mississippi", "%iss%ppi"));
    }
}
