//! Split raw query text into signed tag tokens.
//!
//! `-jaws "i wrote you a song" 'b movie` becomes `-jaws`, `i_wrote_you_a_song`,
//! `b_movie`. Quoted phrases are joined with `_`, a leading `-` negates the item
//! it starts, and an unterminated quote is closed at end of input.

/// One item of a query, quotes stripped, not yet normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub negated: bool,
}

impl Token {
    fn new(text: impl Into<String>, negated: bool) -> Self {
        Self {
            text: text.into(),
            negated,
        }
    }
}

fn quote_char(word: &str) -> Option<char> {
    word.chars().next().filter(|c| *c == '"' || *c == '\'')
}

struct Tokens {
    out: Vec<Token>,
}

impl Tokens {
    /// Push unless empty or already present; the sign never makes two tokens distinct.
    fn push(&mut self, text: &str, negated: bool) {
        if text.is_empty() || self.out.iter().any(|t| t.text == text) {
            return;
        }
        self.out.push(Token::new(text, negated));
    }
}

pub fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Tokens { out: Vec::new() };
    let mut open_quote: Option<char> = None;
    let mut phrase = String::new();
    let mut negate = false;

    for word in raw.split_whitespace() {
        if let Some(quote) = open_quote {
            if !phrase.is_empty() {
                phrase.push('_');
            }
            match word.strip_suffix(quote) {
                Some(last) => {
                    phrase.push_str(last);
                    tokens.push(&phrase, negate);
                    phrase.clear();
                    open_quote = None;
                    negate = false;
                }
                None => phrase.push_str(word),
            }
            continue;
        }

        let mut word = word;
        if let Some(rest) = word.strip_prefix('-') {
            negate = true;
            word = rest;
        } else if let Some(rest) = word.strip_prefix('+') {
            word = rest;
        }

        match quote_char(word) {
            Some(quote) if word.len() > 1 && word.ends_with(quote) => {
                tokens.push(&word[1..word.len() - 1], negate);
                negate = false;
            }
            Some(quote) => {
                open_quote = Some(quote);
                phrase.push_str(&word[1..]);
            }
            None => {
                tokens.push(word, negate);
                negate = false;
            }
        }
    }

    if open_quote.is_some() {
        tracing::debug!(phrase = %phrase, "unterminated quote in query, closing at end of input");
        tokens.push(&phrase, negate);
    }

    tokens.out
}
