//! Lexer for rule and pipeline sources
//!
//! Words are returned as [`Token::Identifier`]; keyword recognition is left to
//! the parser so that keywords match case-insensitively and field names such
//! as `$message.end` stay legal.

use crate::ast::Span;
use crate::error::SyntaxError;
use std::fmt;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),

    // Words, keywords included
    Identifier(String),

    /// `$message`
    MessageRef,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Not,
    Assign,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Identifier(name) => write!(f, "'{name}'"),
            Token::MessageRef => write!(f, "$message"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Equal => write!(f, "'=='"),
            Token::NotEqual => write!(f, "'!='"),
            Token::LessThan => write!(f, "'<'"),
            Token::LessThanEqual => write!(f, "'<='"),
            Token::GreaterThan => write!(f, "'>'"),
            Token::GreaterThanEqual => write!(f, "'>='"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Not => write!(f, "'!'"),
            Token::Assign => write!(f, "'='"),
            Token::LeftParen => write!(f, "'('"),
            Token::RightParen => write!(f, "')'"),
            Token::LeftBracket => write!(f, "'['"),
            Token::RightBracket => write!(f, "']'"),
            Token::LeftBrace => write!(f, "'{{'"),
            Token::RightBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Dot => write!(f, "'.'"),
            Token::Colon => write!(f, "':'"),
            Token::Semicolon => write!(f, "';'"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its position and byte range in the source
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
    pub start: usize,
    pub end: usize,
}

/// Lexer over a source document
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    offset: usize,
    line: u32,
    column: u32,
    current_char: Option<char>,
    /// The last token produced was `-`
    after_minus: bool,
}

type LexResult<T> = Result<T, SyntaxError>;

impl Lexer {
    #[must_use]
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self { input: chars, position: 0, offset: 0, line: 1, column: 1, current_char, after_minus: false }
    }

    /// Tokenize the whole input, ending with [`Token::Eof`]
    ///
    /// # Errors
    ///
    /// Returns the first lexical error.
    pub fn tokenize(mut self) -> LexResult<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::at(self.span(), message)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char {
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace_and_comments(&mut self) -> LexResult<()> {
        loop {
            match (self.current_char, self.peek()) {
                (Some(ch), _) if ch.is_whitespace() => self.advance(),
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.current_char {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current_char, self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => {
                                return Err(SyntaxError::at(start, "unterminated block comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let start = self.span();
        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_some_and(|c: char| c.is_ascii_digit()) {
                is_float = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self.peek().is_some_and(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
            {
                is_float = true;
                number.push(ch);
                self.advance();
                if let Some(sign @ ('-' | '+')) = self.current_char {
                    number.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|e| SyntaxError::at(start, format!("invalid number '{number}': {e}")))
        } else {
            match number.parse::<i64>() {
                Ok(n) => Ok(Token::Integer(n)),
                // the magnitude of i64::MIN lexes as i64::MIN, but only directly after a minus sign
                Err(_) if self.after_minus && number.parse::<u64>() == Ok(i64::MIN.unsigned_abs()) => {
                    Ok(Token::Integer(i64::MIN))
                }
                Err(_) => Err(SyntaxError::at(start, format!("integer literal '{number}' is out of range"))),
            }
        }
    }

    fn read_string(&mut self, quote: char) -> LexResult<Token> {
        let start = self.span();
        let mut string = String::new();
        self.advance();

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance();
                return Ok(Token::String(string));
            } else if ch == '\\' {
                self.advance();
                match self.current_char {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some('r') => string.push('\r'),
                    Some('\\') => string.push('\\'),
                    Some('"') => string.push('"'),
                    Some('\'') => string.push('\''),
                    Some(other) => {
                        string.push('\\');
                        string.push(other);
                    }
                    None => break,
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(SyntaxError::at(start, "unterminated string literal"))
    }

    fn read_identifier(&mut self) -> String {
        let mut identifier = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        identifier
    }

    fn single(&mut self, token: Token) -> LexResult<Token> {
        self.advance();
        Ok(token)
    }

    fn double_or(&mut self, second: char, double: Token, single: Token) -> LexResult<Token> {
        if self.peek() == Some(second) {
            self.advance();
            self.advance();
            Ok(double)
        } else {
            self.single(single)
        }
    }

    /// Next token in the input
    ///
    /// # Errors
    ///
    /// Unexpected characters, unterminated strings or comments and
    /// out-of-range integer literals.
    pub fn next_token(&mut self) -> LexResult<SpannedToken> {
        self.skip_whitespace_and_comments()?;
        let span = self.span();
        let start = self.offset;

        let token = match self.current_char {
            None => Token::Eof,
            Some(ch) => match ch {
                '0'..='9' => self.read_number()?,
                '"' | '\'' => self.read_string(ch)?,
                c if c.is_alphabetic() || c == '_' => Token::Identifier(self.read_identifier()),
                '$' => {
                    self.advance();
                    let word = self.read_identifier();
                    if word != "message" {
                        return Err(SyntaxError::at(span, format!("unknown reference '${word}', expected '$message'")));
                    }
                    Token::MessageRef
                }
                '+' => self.single(Token::Plus)?,
                '-' => self.single(Token::Minus)?,
                '*' => self.single(Token::Star)?,
                '/' => self.single(Token::Slash)?,
                '%' => self.single(Token::Percent)?,
                '=' => self.double_or('=', Token::Equal, Token::Assign)?,
                '!' => self.double_or('=', Token::NotEqual, Token::Not)?,
                '<' => self.double_or('=', Token::LessThanEqual, Token::LessThan)?,
                '>' => self.double_or('=', Token::GreaterThanEqual, Token::GreaterThan)?,
                '&' => {
                    if self.peek() == Some('&') {
                        self.advance();
                        self.advance();
                        Token::And
                    } else {
                        return Err(self.error("unexpected character '&', did you mean '&&'?"));
                    }
                }
                '|' => {
                    if self.peek() == Some('|') {
                        self.advance();
                        self.advance();
                        Token::Or
                    } else {
                        return Err(self.error("unexpected character '|', did you mean '||'?"));
                    }
                }
                '(' => self.single(Token::LeftParen)?,
                ')' => self.single(Token::RightParen)?,
                '[' => self.single(Token::LeftBracket)?,
                ']' => self.single(Token::RightBracket)?,
                '{' => self.single(Token::LeftBrace)?,
                '}' => self.single(Token::RightBrace)?,
                ',' => self.single(Token::Comma)?,
                '.' => self.single(Token::Dot)?,
                ':' => self.single(Token::Colon)?,
                ';' => self.single(Token::Semicolon)?,
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            },
        };

        self.after_minus = token == Token::Minus;
        Ok(SpannedToken { token, span, start, end: self.offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            tokens("a >= 1.5 && !b != 'x'"),
            vec![
                Token::Identifier("a".into()),
                Token::GreaterThanEqual,
                Token::Float(1.5),
                Token::And,
                Token::Not,
                Token::Identifier("b".into()),
                Token::NotEqual,
                Token::String("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let toks = Lexer::new("// header\n  /* block\n */ $message.level").tokenize().unwrap();
        assert_eq!(toks[0].token, Token::MessageRef);
        assert_eq!(toks[0].span, Span::new(3, 5));
        assert_eq!(toks[2].token, Token::Identifier("level".into()));
    }

    #[test]
    fn test_min_magnitude_only_after_minus() {
        assert_eq!(tokens("-9223372036854775808"), vec![Token::Minus, Token::Integer(i64::MIN), Token::Eof]);
        let err = Lexer::new("9223372036854775808").tokenize().unwrap_err();
        assert!(err.message.contains("out of range"));
        assert!(Lexer::new("-9223372036854775809").tokenize().is_err());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(tokens(r#""a\"b\n""#)[0], Token::String("a\"b\n".into()));
    }

    #[test]
    fn test_errors_carry_positions() {
        let err = Lexer::new("x = \n  \"open").tokenize().unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));

        let err = Lexer::new("a # b").tokenize().unwrap_err();
        assert_eq!((err.line, err.column), (1, 3));

        assert!(Lexer::new("99999999999999999999").tokenize().is_err());
        assert!(Lexer::new("$msg.x").tokenize().is_err());
    }
}
