//! Free-text search pattern tokenizer.
//!
//! Turns what a user types into a search box into a small boolean
//! expression tree, and provides the `LIKE` pattern helpers used to lower
//! that tree against searched columns.
//!
//! # Example
//!
//! ```rust
//! use myco_pattern::{tokenize, BooleanExpr};
//!
//! let expr = tokenize("dobbs -notes");
//! assert!(expr.matches("Dobbs Ferry"));
//! assert!(!expr.matches("Dobbs Ferry, see notes"));
//!
//! let expr = tokenize("a OR b");
//! assert!(matches!(expr, BooleanExpr::Or(_)));
//! ```
//!
//! # Syntax
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `a b` | both `a` and `b` |
//! | `"a b"` | the phrase `a b` |
//! | `a OR b` | either; `OR` binds tighter than the implicit AND |
//! | `-a`, `-"a b"` | must not contain |
//! | `-a OR b` | contains neither |
//! | `ama*ita` | `*` matches any run of characters |
//!
//! Parsing never fails. Unmatched quotes, stray dashes and dangling `OR`s
//! are read as literal text, and blank input matches everything.

mod expr;
mod lexer;
mod like;
mod parser;

pub use expr::{BooleanExpr, Lower};
pub use like::{escape_like, like_matches, like_pattern};
pub use parser::tokenize;
