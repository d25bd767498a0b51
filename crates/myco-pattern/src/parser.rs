//! Builds a [`BooleanExpr`] from lexer tokens.

use crate::expr::BooleanExpr;
use crate::lexer::{Lexer, Token};

/// Parses a free-text search string.
///
/// Grammar, loosely:
///
/// ```text
/// pattern := group*                      (groups are ANDed)
/// group   := term ("OR" term)*           (OR binds tighter than AND)
/// term    := word | "phrase" | -word | -"phrase"
/// ```
///
/// A leading `-` on the first member of an OR-group negates the whole
/// group. `OR` tokens that do not sit between two terms are plain words.
/// Blank input yields [`BooleanExpr::Everything`].
pub fn tokenize(raw: &str) -> BooleanExpr {
    let tokens: Vec<Token<'_>> = Lexer::new(raw).collect();
    let mut groups = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let mut members = vec![term(&tokens[i])];
        i += 1;

        while i + 1 < tokens.len() && tokens[i] == Token::Or && tokens[i + 1] != Token::Or {
            members.push(term(&tokens[i + 1]));
            i += 2;
        }

        groups.push(group(members));
    }

    match groups.len() {
        0 => BooleanExpr::Everything,
        1 => groups.remove(0),
        _ => BooleanExpr::And(groups),
    }
}

fn term(token: &Token<'_>) -> BooleanExpr {
    match token {
        Token::Word(w) => BooleanExpr::Word((*w).to_string()),
        Token::Phrase(p) => BooleanExpr::Phrase((*p).to_string()),
        Token::NegWord(w) => negate(BooleanExpr::Word((*w).to_string())),
        Token::NegPhrase(p) => negate(BooleanExpr::Phrase((*p).to_string())),
        Token::Or => BooleanExpr::Word("OR".to_string()),
    }
}

fn negate(expr: BooleanExpr) -> BooleanExpr {
    BooleanExpr::Negated(Box::new(expr))
}

fn group(mut members: Vec<BooleanExpr>) -> BooleanExpr {
    if members.len() == 1 {
        return members.remove(0);
    }
    if let BooleanExpr::Negated(first) = &members[0] {
        let first = (**first).clone();
        members[0] = first;
        return negate(BooleanExpr::Or(members));
    }
    BooleanExpr::Or(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> BooleanExpr {
        BooleanExpr::Word(s.to_string())
    }

    fn phrase(s: &str) -> BooleanExpr {
        BooleanExpr::Phrase(s.to_string())
    }

    // ==================== Grammar Tests ====================

    #[test]
    fn blank_is_everything() {
        assert_eq!(tokenize(""), BooleanExpr::Everything);
        assert_eq!(tokenize("   \t "), BooleanExpr::Everything);
        assert_eq!(tokenize("\"\""), BooleanExpr::Everything);
    }

    #[test]
    fn single_word_is_not_wrapped() {
        assert_eq!(tokenize("dobbs"), word("dobbs"));
    }

    #[test]
    fn words_are_anded() {
        assert_eq!(
            tokenize("amanita muscaria"),
            BooleanExpr::And(vec![word("amanita"), word("muscaria")])
        );
    }

    #[test]
    fn or_binds_tighter_than_and() {
        assert_eq!(
            tokenize("a b OR c d"),
            BooleanExpr::And(vec![
                word("a"),
                BooleanExpr::Or(vec![word("b"), word("c")]),
                word("d"),
            ])
        );
    }

    #[test]
    fn or_chains() {
        assert_eq!(
            tokenize("a OR \"b c\" OR d"),
            BooleanExpr::Or(vec![word("a"), phrase("b c"), word("d")])
        );
    }

    #[test]
    fn negated_terms() {
        assert_eq!(
            tokenize("dobbs -notes -\"no way\""),
            BooleanExpr::And(vec![
                word("dobbs"),
                negate(word("notes")),
                negate(phrase("no way")),
            ])
        );
    }

    #[test]
    fn leading_dash_negates_or_group() {
        assert_eq!(
            tokenize("-a OR b"),
            negate(BooleanExpr::Or(vec![word("a"), word("b")]))
        );
    }

    #[test]
    fn inner_negation_stays_inside_group() {
        assert_eq!(
            tokenize("a OR -b"),
            BooleanExpr::Or(vec![word("a"), negate(word("b"))])
        );
    }

    // ==================== Malformed Input Tests ====================

    #[test]
    fn dangling_or_is_literal() {
        assert_eq!(tokenize("OR"), word("OR"));
        assert_eq!(
            tokenize("a OR"),
            BooleanExpr::And(vec![word("a"), word("OR")])
        );
        assert_eq!(
            tokenize("OR a"),
            BooleanExpr::And(vec![word("OR"), word("a")])
        );
    }

    #[test]
    fn doubled_or() {
        assert_eq!(
            tokenize("a OR OR b"),
            BooleanExpr::And(vec![
                word("a"),
                BooleanExpr::Or(vec![word("OR"), word("b")]),
            ])
        );
    }

    #[test]
    fn unmatched_quote_is_literal() {
        assert_eq!(
            tokenize("\"abc def"),
            BooleanExpr::And(vec![word("\"abc"), word("def")])
        );
    }

    #[test]
    fn lone_dash() {
        assert_eq!(tokenize("-"), word("-"));
    }

    #[test]
    fn display_reparses_to_same_tree() {
        for input in ["a b OR c -d", "-a OR b", "\"x y\" OR z", "a OR -b c"] {
            let expr = tokenize(input);
            assert_eq!(tokenize(&expr.to_string()), expr, "input: {input}");
        }
    }
}
