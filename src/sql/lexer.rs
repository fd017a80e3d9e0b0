//! SQL lexer (tokenizer)
//!
//! Converts SQL text into a stream of position-tagged tokens. String
//! literals are scanned character by character with explicit tracking of
//! the closing quote and `''` escapes, so embedded commas and operator
//! characters survive intact. A single-quoted string that forms a valid
//! `YYYY-MM-DD` calendar date is produced as a date literal.

use time::macros::format_description;

use super::token::{SpannedToken, Token};
use crate::error::{Error, Result};

/// SQL lexer
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    /// Last meaningful token produced, used to decide whether a `-` starts
    /// a negative numeric literal or is the binary minus operator.
    last_token: Option<Token>,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            last_token: None,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            self.last_token = Some(spanned.token.clone());
            tokens.push(spanned);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<SpannedToken> {
        self.skip_trivia();

        let pos = self.position;
        if self.is_at_end() {
            return Ok(SpannedToken {
                token: Token::Eof,
                pos,
            });
        }

        let ch = self.current_char();
        let token = match ch {
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '.' => {
                self.advance();
                Token::Dot
            }
            '+' => {
                self.advance();
                Token::Plus
            }
            '-' => {
                self.advance();
                // A `-` directly before a digit is a negative literal unless
                // the previous token could end an operand.
                if !self.is_at_end()
                    && self.current_char().is_ascii_digit()
                    && !self.prev_is_operand()
                {
                    return Ok(SpannedToken {
                        token: self.read_number(pos, true)?,
                        pos,
                    });
                }
                Token::Minus
            }
            '*' => {
                self.advance();
                Token::Asterisk
            }
            '/' => {
                self.advance();
                Token::Slash
            }
            '=' => {
                self.advance();
                Token::Eq
            }
            '<' => {
                self.advance();
                match self.current_char_opt() {
                    Some('=') => {
                        self.advance();
                        Token::Lte
                    }
                    Some('>') => {
                        self.advance();
                        Token::Neq
                    }
                    _ => Token::Lt,
                }
            }
            '>' => {
                self.advance();
                if self.current_char_opt() == Some('=') {
                    self.advance();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '!' => {
                self.advance();
                if self.current_char_opt() == Some('=') {
                    self.advance();
                    Token::Neq
                } else {
                    return Err(Error::Syntax {
                        pos,
                        msg: "unexpected character '!'".to_string(),
                    });
                }
            }
            '\'' => self.read_string(pos)?,
            c if c.is_ascii_digit() => self.read_number(pos, false)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(),
            c => {
                return Err(Error::Syntax {
                    pos,
                    msg: format!("unexpected character '{}'", c),
                });
            }
        };

        Ok(SpannedToken { token, pos })
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn current_char_opt(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn prev_is_operand(&self) -> bool {
        matches!(
            self.last_token,
            Some(Token::Identifier(_))
                | Some(Token::IntegerLiteral(_))
                | Some(Token::FloatLiteral(_))
                | Some(Token::StringLiteral(_))
                | Some(Token::DateLiteral(_))
                | Some(Token::RParen)
        )
    }

    /// Skip whitespace and `--` line comments
    fn skip_trivia(&mut self) {
        loop {
            while !self.is_at_end() && self.current_char().is_whitespace() {
                self.advance();
            }
            if !self.is_at_end() && self.current_char() == '-' && self.peek_char() == Some('-') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    /// Read a single-quoted string literal, honouring `''` escapes. If the
    /// text is a valid `YYYY-MM-DD` date it becomes a date literal.
    fn read_string(&mut self, start_pos: usize) -> Result<Token> {
        self.advance(); // opening quote

        let mut value = String::new();
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch == '\'' {
                if self.peek_char() == Some('\'') {
                    value.push('\'');
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // closing quote
                    if let Some(date) = parse_date_literal(&value) {
                        return Ok(Token::DateLiteral(date));
                    }
                    return Ok(Token::StringLiteral(value));
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(Error::Syntax {
            pos: start_pos,
            msg: "unterminated string literal".to_string(),
        })
    }

    /// Read an integer or float literal
    fn read_number(&mut self, start_pos: usize, negative: bool) -> Result<Token> {
        let mut text = String::new();
        if negative {
            text.push('-');
        }
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                match self.peek_char() {
                    Some(next) if next.is_ascii_digit() => {
                        is_float = true;
                        text.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else if (ch == 'e' || ch == 'E') && !text.is_empty() {
                // Scientific notation
                is_float = true;
                text.push(ch);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current_char_opt() {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::FloatLiteral)
                .map_err(|_| Error::Syntax {
                    pos: start_pos,
                    msg: format!("invalid number '{}'", text),
                })
        } else {
            text.parse::<i64>()
                .map(Token::IntegerLiteral)
                .map_err(|_| Error::Syntax {
                    pos: start_pos,
                    msg: format!("invalid number '{}'", text),
                })
        }
    }

    /// Read an identifier or keyword
    fn read_word(&mut self) -> Token {
        let mut value = String::new();
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match Token::from_keyword(&value) {
            Some(keyword) => keyword,
            None => Token::Identifier(value),
        }
    }
}

fn parse_date_literal(text: &str) -> Option<time::Date> {
    if text.len() != 10 {
        return None;
    }
    let bytes = text.as_bytes();
    let shaped = bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    let format = format_description!("[year]-[month]-[day]");
    time::Date::parse(text, &format).ok()
}
