//! Tokenizer for GLSL sources. It knows just enough of the language to find declarations:
//! comments are dropped, preprocessor lines become a single [`Token::Directive`].

use std::{iter::Peekable, str::CharIndices};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Identifier(&'a str),
    Number(&'a str),
    /// A preprocessor line without the leading `#`.
    Directive(&'a str),
    Punctuation(char),
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    /// Consumes characters while `predicate` holds and returns the end offset.
    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) -> usize {
        while let Some(&(index, c)) = self.chars.peek() {
            if !predicate(c) {
                return index;
            }
            self.chars.next();
        }
        self.source.len()
    }

    fn skip_line_comment(&mut self) {
        self.eat_while(|c| c != '\n');
    }

    fn skip_block_comment(&mut self) {
        let mut previous = '\0';
        for (_, c) in self.chars.by_ref() {
            if previous == '*' && c == '/' {
                return;
            }
            previous = c;
        }
    }

    /// Returns the character after the next one without consuming anything.
    fn peek_second(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next().map(|(_, c)| c)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &(start, c) = self.chars.peek()?;
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' if self.peek_second() == Some('/') => self.skip_line_comment(),
                '/' if self.peek_second() == Some('*') => {
                    self.chars.next();
                    self.chars.next();
                    self.skip_block_comment();
                }
                '#' => {
                    self.chars.next();
                    let end = self.eat_while(|c| c != '\n');
                    return Some(Token::Directive(self.source[start + 1..end].trim()));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let end = self.eat_while(|c| c.is_alphanumeric() || c == '_');
                    return Some(Token::Identifier(&self.source[start..end]));
                }
                c if c.is_ascii_digit() => {
                    let end = self.eat_while(|c| c.is_alphanumeric() || c == '.' || c == '_');
                    return Some(Token::Number(&self.source[start..end]));
                }
                c => {
                    self.chars.next();
                    return Some(Token::Punctuation(c));
                }
            }
        }
    }
}
