use crate::frontend::token::{ArithOp, Token};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Character offset from the start of the source.
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Input at `offset` matched none of the statement shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

const RELATIONS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            offset: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn rewind(&mut self, to: Span) {
        self.pos = to.offset;
        self.line = to.line;
        self.col = to.col;
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        self.pos > start
    }

    fn eat(&mut self, text: &str) -> bool {
        let start = self.span();
        for expected in text.chars() {
            if self.current() != Some(expected) {
                self.rewind(start);
                return false;
            }
            self.advance();
        }
        true
    }

    /// Keyword followed by mandatory whitespace, so `letter` is not `let ter`.
    fn keyword(&mut self, kw: &str) -> Option<()> {
        let start = self.span();
        if self.eat(kw) && self.skip_whitespace() {
            Some(())
        } else {
            self.rewind(start);
            None
        }
    }

    fn read_word(&mut self) -> Option<String> {
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        (!word.is_empty()).then_some(word)
    }

    fn read_integer(&mut self) -> Option<String> {
        let start = self.span();
        let mut digits = String::new();
        if self.current() == Some('-') {
            digits.push('-');
            self.advance();
        }
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if digits.trim_start_matches('-').is_empty() {
            self.rewind(start);
            return None;
        }
        Some(digits)
    }

    /// A name or a (possibly negative) integer literal.
    fn read_value(&mut self) -> Option<String> {
        if self.current() == Some('-') {
            self.read_integer()
        } else {
            self.read_word()
        }
    }

    fn read_relation(&mut self) -> Option<String> {
        RELATIONS
            .iter()
            .find(|rel| self.eat(rel))
            .map(|rel| rel.to_string())
    }

    fn read_let(&mut self) -> Option<Token> {
        self.keyword("let")?;
        let name = self.read_word()?;
        self.skip_whitespace();
        self.eat("=").then_some(())?;
        self.skip_whitespace();
        let value = self.read_integer()?;
        Some(Token::Let { name, value })
    }

    fn read_return(&mut self) -> Option<Token> {
        self.keyword("return")?;
        let name = self.read_word()?;
        Some(Token::Return { name })
    }

    fn read_condition(&mut self, kw: &str) -> Option<(String, String, String)> {
        self.keyword(kw)?;
        let lhs = self.read_value()?;
        self.skip_whitespace();
        let rel = self.read_relation()?;
        self.skip_whitespace();
        let rhs = self.read_value()?;
        Some((lhs, rel, rhs))
    }

    fn read_if(&mut self) -> Option<Token> {
        let (lhs, rel, rhs) = self.read_condition("if")?;
        Some(Token::If { lhs, rel, rhs })
    }

    fn read_while(&mut self) -> Option<Token> {
        let (lhs, rel, rhs) = self.read_condition("while")?;
        Some(Token::While { lhs, rel, rhs })
    }

    fn read_assign(&mut self) -> Option<Token> {
        let target = self.read_word()?;
        self.skip_whitespace();
        self.eat("=").then_some(())?;
        self.skip_whitespace();
        let lhs = self.read_value()?;
        self.skip_whitespace();
        let op = self.current().and_then(ArithOp::from_char)?;
        self.advance();
        self.skip_whitespace();
        let rhs = self.read_value()?;
        Some(Token::Assign {
            target,
            lhs,
            op,
            rhs,
        })
    }

    fn read_block(&mut self) -> Option<Token> {
        let token = match self.current()? {
            '{' => Token::BlockOpen,
            '}' => Token::BlockClose,
            _ => return None,
        };
        self.advance();
        Some(token)
    }

    /// Tries every statement shape in priority order; the first match wins.
    fn read_token(&mut self) -> Option<Token> {
        let start = self.span();
        let shapes: [fn(&mut Self) -> Option<Token>; 6] = [
            Self::read_let,
            Self::read_return,
            Self::read_if,
            Self::read_while,
            Self::read_assign,
            Self::read_block,
        ];
        for shape in shapes {
            if let Some(token) = shape(self) {
                return Some(token);
            }
            self.rewind(start);
        }
        None
    }

    fn unrecognized(&self) -> LexerError {
        let snippet: String = self.source[self.pos..]
            .iter()
            .take_while(|ch| **ch != '\n')
            .take(16)
            .collect();
        LexerError {
            message: format!("unrecognized input: '{}'", snippet),
            offset: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.current().is_none() {
                break;
            }

            let span = self.span();
            match self.read_token() {
                Some(token) => tokens.push(Spanned { token, span }),
                None => return Err(self.unrecognized()),
            }
        }

        Ok(tokens)
    }
}

/// Lexes `source` into its statement tokens.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LexerError> {
    Lexer::new(source).tokenize()
}
