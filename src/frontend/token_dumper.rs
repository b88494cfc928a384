use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        for s in tokens {
            println!("{}", self.render(s));
        }
    }

    pub fn render(&self, s: &Spanned) -> String {
        let kind = Self::kind(&s.token);
        let (colr, reset) = if self.color {
            (Self::color(&s.token), Self::RESET)
        } else {
            ("", "")
        };

        format!(
            "[{:02}:{:02}] {}{:<8} {}{}",
            s.span.line, s.span.col, colr, kind, s.token, reset
        )
    }

    fn kind(t: &Token) -> &'static str {
        match t {
            Token::Let { .. } => "LET",
            Token::Assign { .. } => "ASSIGN",
            Token::If { .. } => "IF",
            Token::While { .. } => "WHILE",
            Token::Return { .. } => "RETURN",
            Token::BlockOpen | Token::BlockClose => "BLOCK",
        }
    }

    fn color(t: &Token) -> &'static str {
        match t {
            Token::Let { .. } | Token::Assign { .. } => Self::YEL,
            Token::If { .. } | Token::While { .. } => Self::MAG,
            Token::Return { .. } => Self::CYN,
            Token::BlockOpen | Token::BlockClose => Self::DIM,
        }
    }
}
