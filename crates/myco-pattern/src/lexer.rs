//! Lexer for free-text search patterns.
//!
//! Splits a search string into words, quoted phrases, their negated forms
//! and the `OR` keyword. Malformed input never fails: an unmatched quote is
//! an ordinary character of the surrounding word.

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Bare word: `dobbs`
    Word(&'a str),
    /// Quoted phrase, without the quotes: `"hard to find"`
    Phrase(&'a str),
    /// Negated bare word: `-notes`
    NegWord(&'a str),
    /// Negated quoted phrase: `-"no notes"`
    NegPhrase(&'a str),
    /// The `OR` keyword.
    Or,
}

/// Lexer over a borrowed search string.
pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let remaining = &self.input[self.pos..];
        let trimmed = remaining.trim_start();
        self.pos += remaining.len() - trimmed.len();
    }

    /// Consumes a bare word up to the next whitespace.
    fn bare_word(&mut self) -> &'a str {
        let remaining = &self.input[self.pos..];
        let end = remaining
            .find(char::is_whitespace)
            .unwrap_or(remaining.len());
        self.pos += end;
        &remaining[..end]
    }

    /// Consumes a quoted phrase starting at the current `"`.
    ///
    /// Returns `None` (consuming nothing) when there is no closing quote.
    fn quoted(&mut self) -> Option<&'a str> {
        let remaining = &self.input[self.pos..];
        let body = &remaining[1..];
        let close = body.find('"')?;
        self.pos += close + 2;
        Some(&body[..close])
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                return None;
            }

            let remaining = &self.input[self.pos..];

            if remaining.starts_with('"') {
                match self.quoted() {
                    // `""` contributes nothing
                    Some("") => continue,
                    Some(phrase) => return Some(Token::Phrase(phrase)),
                    None => return Some(Token::Word(self.bare_word())),
                }
            }

            if let Some(rest) = remaining.strip_prefix('-') {
                if rest.starts_with('"') {
                    self.pos += 1;
                    match self.quoted() {
                        Some("") => continue,
                        Some(phrase) => return Some(Token::NegPhrase(phrase)),
                        None => return Some(Token::NegWord(self.bare_word())),
                    }
                }
                if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                    // A lone dash is just a dash.
                    return Some(Token::Word(self.bare_word()));
                }
                self.pos += 1;
                return Some(Token::NegWord(self.bare_word()));
            }

            let word = self.bare_word();
            if word == "OR" {
                return Some(Token::Or);
            }
            return Some(Token::Word(word));
        }
    }
}
