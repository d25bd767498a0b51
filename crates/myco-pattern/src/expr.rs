//! The boolean expression tree produced by [`tokenize`](crate::tokenize).

use std::fmt;

use crate::like::{like_matches, like_pattern};

/// A parsed search pattern.
///
/// ```text
/// dobbs "hard to find" -notes a OR b
///   => And[Word(dobbs), Phrase(hard to find), Negated(Word(notes)), Or[Word(a), Word(b)]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BooleanExpr {
    /// Matches everything. Produced by blank input.
    Everything,
    /// All children must match.
    And(Vec<BooleanExpr>),
    /// At least one child must match.
    Or(Vec<BooleanExpr>),
    /// A bare word.
    Word(String),
    /// A quoted phrase, matched as one term.
    Phrase(String),
    /// The child must not match.
    Negated(Box<BooleanExpr>),
}

/// Target of [`BooleanExpr::lower`].
///
/// Lowering walks the tree bottom-up. Leaves (words and phrases) are handed
/// to [`term`](Lower::term) as their LIKE pattern (`%text%`, with `*` mapped
/// to `%` and LIKE metacharacters escaped).
pub trait Lower {
    /// The lowered representation.
    type Output;

    /// The universal expression.
    fn everything(&mut self) -> Self::Output;

    /// A single search term, already converted to a LIKE pattern.
    fn term(&mut self, like: &str) -> Self::Output;

    /// Conjunction.
    fn all(&mut self, parts: Vec<Self::Output>) -> Self::Output;

    /// Disjunction.
    fn any(&mut self, parts: Vec<Self::Output>) -> Self::Output;

    /// Negation.
    fn not(&mut self, part: Self::Output) -> Self::Output;
}

impl BooleanExpr {
    /// Returns `true` if this expression matches everything.
    pub fn is_everything(&self) -> bool {
        match self {
            BooleanExpr::Everything => true,
            BooleanExpr::And(parts) => parts.iter().all(BooleanExpr::is_everything),
            _ => false,
        }
    }

    /// Returns the text of every positive and negated term, in order.
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            BooleanExpr::Everything => {}
            BooleanExpr::And(parts) | BooleanExpr::Or(parts) => {
                for part in parts {
                    part.collect_terms(out);
                }
            }
            BooleanExpr::Word(text) | BooleanExpr::Phrase(text) => out.push(text),
            BooleanExpr::Negated(inner) => inner.collect_terms(out),
        }
    }

    /// Lowers the expression into another representation.
    pub fn lower<L: Lower>(&self, target: &mut L) -> L::Output {
        match self {
            BooleanExpr::Everything => target.everything(),
            BooleanExpr::And(parts) => {
                let lowered: Vec<L::Output> = parts.iter().map(|p| p.lower(target)).collect();
                target.all(lowered)
            }
            BooleanExpr::Or(parts) => {
                let lowered: Vec<L::Output> = parts.iter().map(|p| p.lower(target)).collect();
                target.any(lowered)
            }
            BooleanExpr::Word(text) | BooleanExpr::Phrase(text) => {
                target.term(&like_pattern(text))
            }
            BooleanExpr::Negated(inner) => {
                let lowered = inner.lower(target);
                target.not(lowered)
            }
        }
    }

    /// Evaluates the expression against a single haystack.
    ///
    /// Terms match case-insensitively as substrings; `*` inside a term
    /// matches any run of characters.
    pub fn matches(&self, haystack: &str) -> bool {
        self.matches_any(&[haystack])
    }

    /// Evaluates the expression against several searched columns.
    ///
    /// A positive term matches if any column contains it. A negated term
    /// matches only if no column contains it.
    pub fn matches_any(&self, columns: &[&str]) -> bool {
        struct Eval<'c> {
            columns: &'c [&'c str],
        }

        impl Lower for Eval<'_> {
            type Output = bool;

            fn everything(&mut self) -> bool {
                true
            }

            fn term(&mut self, like: &str) -> bool {
                self.columns.iter().any(|col| like_matches(col, like))
            }

            fn all(&mut self, parts: Vec<bool>) -> bool {
                parts.into_iter().all(|b| b)
            }

            fn any(&mut self, parts: Vec<bool>) -> bool {
                parts.into_iter().any(|b| b)
            }

            fn not(&mut self, part: bool) -> bool {
                !part
            }
        }

        self.lower(&mut Eval { columns })
    }
}

impl fmt::Display for BooleanExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanExpr::Everything => Ok(()),
            BooleanExpr::And(parts) => write_joined(f, parts, " "),
            BooleanExpr::Or(parts) => write_joined(f, parts, " OR "),
            BooleanExpr::Word(text) => write!(f, "{}", text),
            BooleanExpr::Phrase(text) => write!(f, "\"{}\"", text),
            BooleanExpr::Negated(inner) => write!(f, "-{}", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[BooleanExpr], sep: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", part)?;
    }
    Ok(())
}
