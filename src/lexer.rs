use std::{iter::Peekable, num::ParseIntError};

use crate::token::{Span, Spanned, Token, TokenKind, KEYWORDS};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// A convenience function that lexes the entire input eagerly. The returned
/// buffer always ends with an [`TokenKind::Eof`] token.
pub fn lex_in_new(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    let mut lexer = Lexer::new(src);
    loop {
        let token = lexer.next()?;
        let is_eof = token.is_eof();
        tokens.push(token);
        if is_eof {
            return Ok(tokens);
        }
    }
}

/// The IDL lexer.
///
/// Tokens are scanned lazily, one at a time. The lexer holds at most one
/// token of lookahead, which is shared by [`Lexer::peek`] and
/// [`Lexer::unget`].
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    lookahead: Option<Token>,
}

impl<'src> Lexer<'src> {
    /// Constructs a new lexer with the default state.
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            lookahead: None,
        }
    }

    pub fn src(&self) -> &'src str {
        self.src
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.scan()?,
        };
        Ok(self.lookahead.insert(token))
    }

    pub fn peek_kind(&mut self) -> Result<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Result<Token> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.scan(),
        }
    }

    /// Pushes a token back, so that it is returned by the next call to
    /// [`Lexer::peek`] or [`Lexer::next`].
    ///
    /// # Panics
    ///
    /// Panics if the lookahead slot is already occupied (there is only room
    /// for one token).
    pub fn unget(&mut self, token: Token) {
        assert!(
            self.lookahead.is_none(),
            "attempt to unget a token when there is already one in the buffer"
        );
        self.lookahead = Some(token);
    }

    /// Consumes the next token, which must be of one of the provided kinds.
    pub fn expect(&mut self, context: &'static str, kinds: &[TokenKind]) -> Result<Token> {
        let token = self.next()?;
        if kinds.contains(&token.kind) {
            Ok(token)
        } else {
            Err(unexpected(token, context))
        }
    }

    /// Returns the next token without consuming it. It must be of one of the
    /// provided kinds.
    pub fn peek_expect(&mut self, context: &'static str, kinds: &[TokenKind]) -> Result<&Token> {
        let token = self.peek()?;
        if kinds.contains(&token.kind) {
            Ok(token)
        } else {
            let token = token.clone();
            Err(unexpected(token, context))
        }
    }

    /// Consumes the next token only if it is of one of the provided kinds.
    pub fn next_one_of(&mut self, kinds: &[TokenKind]) -> Result<Option<Token>> {
        if kinds.contains(&self.peek_kind()?) {
            self.next().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Returns an iterator over the remaining tokens. The iterator never ends
    /// by itself: once the input is exhausted it keeps yielding
    /// [`TokenKind::Eof`].
    pub fn tokens(mut self) -> impl Iterator<Item = Result<Token>> + 'src {
        std::iter::from_fn(move || Some(self.next()))
    }
}

fn unexpected(token: Token, context: &'static str) -> Spanned<Error> {
    token.span().wrap(Error::Unexpected { token, context })
}

impl Lexer<'_> {
    /// Scans the next token, skipping any whitespace and comments.
    fn scan(&mut self) -> Result<Token> {
        use TokenKind::*;
        loop {
            let kind = match self.mark_advance() {
                '\0' => Eof,
                '{' => LBrace,
                '}' => RBrace,
                '(' => LParen,
                ')' => RParen,
                '[' => LBracket,
                ']' => RBracket,
                '<' => Less,
                '>' => Greater,
                ',' => Comma,
                ';' => Semicolon,
                ':' => Colon,
                '*' => Star,
                '=' => Eq,
                '#' => Hash,
                '/' => match self.peek_char() {
                    '/' => {
                        self.line_comment();
                        continue;
                    }
                    '*' => {
                        self.block_comment()?;
                        continue;
                    }
                    _ => return Err(self.error(Error::UnexpectedChar('/'))),
                },
                '"' => return self.string(),
                '\'' => return self.char(),
                '-' if self.peek_char().is_ascii_digit() => {
                    let first = self.advance();
                    self.number(first)?
                }
                c if c.is_ascii_digit() => self.number(c)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
                c if c.is_whitespace() => continue,
                c => return Err(self.error(Error::UnexpectedChar(c))),
            };
            return Ok(self.produce(kind));
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek_char()) {
            self.advance();
        }
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    /// Scans the remainder of a numeric literal, whose first digit has
    /// already been consumed.
    fn number(&mut self, first: char) -> Result<TokenKind> {
        if first == '0' && matches!(self.peek_char(), 'x' | 'X') {
            self.advance();
            if !self.peek_char().is_ascii_hexdigit() {
                return Err(self.error(Error::MalformedNumber));
            }
            while self.peek_char().is_ascii_hexdigit() {
                self.advance();
            }
            return self.number_end(TokenKind::Integer);
        }

        self.digits();
        let mut kind = TokenKind::Integer;
        if self.peek_char() == '.' {
            self.advance();
            self.digits();
            kind = TokenKind::Float;
        }
        if matches!(self.peek_char(), 'e' | 'E') {
            self.advance();
            if matches!(self.peek_char(), '+' | '-') {
                self.advance();
            }
            if !self.peek_char().is_ascii_digit() {
                return Err(self.error(Error::MalformedNumber));
            }
            self.digits();
            kind = TokenKind::Float;
        }

        // Octal literals (leading zero) can't contain 8 or 9.
        let magnitude = self.substr().trim_start_matches('-');
        if kind == TokenKind::Integer
            && magnitude.starts_with('0')
            && magnitude.contains(['8', '9'])
        {
            return Err(self.error(Error::MalformedNumber));
        }
        self.number_end(kind)
    }

    /// Rejects literals immediately followed by identifier characters, such
    /// as `12ab`.
    fn number_end(&mut self, kind: TokenKind) -> Result<TokenKind> {
        let c = self.peek_char();
        if c.is_ascii_alphanumeric() || c == '_' {
            while self.peek_char().is_ascii_alphanumeric() || self.peek_char() == '_' {
                self.advance();
            }
            return Err(self.error(Error::MalformedNumber));
        }
        Ok(kind)
    }

    fn digits(&mut self) {
        while self.peek_char().is_ascii_digit() {
            self.advance();
        }
    }

    /// Lexes a string literal, performing escape processing along the way.
    fn string(&mut self) -> Result<Token> {
        let mut buf = String::new();
        loop {
            let (current, current_span) = self.advance_with_span();
            match current {
                // A NUL char marks the unclosed string error, since the input
                // has been exhausted.
                '\0' => return Err(self.error(Error::UnclosedString)),
                '"' => return Ok(Token::new(TokenKind::String, buf, self.span())),
                '\n' => return Err(current_span.wrap(Error::UnescapedLineBreak)),
                '\\' => buf.push(self.escape(current_span.lo)?),
                c => buf.push(c),
            }
        }
    }

    fn char(&mut self) -> Result<Token> {
        let (current, current_span) = self.advance_with_span();
        let c = match current {
            '\0' | '\n' => return Err(self.error(Error::UnclosedChar)),
            '\'' => return Err(self.error(Error::EmptyChar)),
            '\\' => self.escape(current_span.lo)?,
            c => c,
        };
        if self.advance() != '\'' {
            return Err(self.error(Error::UnclosedChar));
        }
        Ok(Token::new(TokenKind::Char, c.to_string(), self.span()))
    }

    /// Processes an escape sequence whose backslash (at `lo`) has already been
    /// consumed.
    fn escape(&mut self, lo: usize) -> Result<char> {
        let c = match self.advance() {
            '\0' => return Err(self.error(Error::UnclosedString)),
            'a' => '\x07', // alert
            'b' => '\x08', // backspace
            'f' => '\x0c', // form feed
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b', // vertical tab
            '0' => '\0',
            c @ ('\\' | '\'' | '"') => c,
            'x' => {
                let hi = self.advance();
                let lo_digit = self.advance();
                // Literals are UTF-8 text, so only ASCII bytes can be spelled out.
                match (hi.to_digit(16), lo_digit.to_digit(16)) {
                    (Some(hi @ 0..=7), Some(lo)) => {
                        char::from(u8::try_from(hi * 16 + lo).unwrap_or(0))
                    }
                    _ => return Err(self.escape_error(lo)),
                }
            }
            'u' => {
                if self.advance() != '{' {
                    return Err(self.escape_error(lo));
                }
                let mut code = 0u32;
                let mut digits = 0;
                loop {
                    match self.advance() {
                        '}' if digits > 0 => break,
                        c => match c.to_digit(16) {
                            Some(d) if digits < 6 => {
                                code = code * 16 + d;
                                digits += 1;
                            }
                            _ => return Err(self.escape_error(lo)),
                        },
                    }
                }
                match char::from_u32(code) {
                    Some(c) => c,
                    None => return Err(self.escape_error(lo)),
                }
            }
            _ => return Err(self.escape_error(lo)),
        };
        Ok(c)
    }

    fn escape_error(&self, lo: usize) -> Spanned<Error> {
        Span::new_of_bounds(lo..self.cursor).wrap(Error::InvalidEscape)
    }

    fn line_comment(&mut self) {
        while !matches!(self.peek_char(), '\n' | '\0') {
            self.advance();
        }
    }

    fn block_comment(&mut self) -> Result<()> {
        assert_eq!(self.advance(), '*');
        loop {
            match self.advance() {
                '*' => (), // start closing comment
                '\0' => return Err(self.error(Error::UnclosedComment)),
                _ => continue, // keep scanning comment...
            }
            match self.peek_char() {
                '/' => {
                    self.advance();
                    return Ok(());
                }
                '\0' => return Err(self.error(Error::UnclosedComment)),
                _ => continue,
            }
        }
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next char and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Returns the next char (with its span) and advances the iterator.
    fn advance_with_span(&mut self) -> (char, Span) {
        let lo = self.cursor;
        let char = self.advance();
        let hi = self.cursor;
        (char, Span::new_of_bounds(lo..hi))
    }

    /// Returns the next char without advancing the iterator.
    fn peek_char(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    fn error(&self, error: Error) -> Spanned<Error> {
        self.span().wrap(error)
    }

    /// Produces a token using the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token {
        let text = match kind {
            TokenKind::Identifier | TokenKind::Integer | TokenKind::Float => self.substr(),
            _ => "",
        };
        Token::new(kind, text, self.span())
    }
}

pub mod extract {
    use std::num::ParseFloatError;

    use super::*;

    /// A decoded integer literal: its sign and magnitude.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Integer {
        pub negative: bool,
        pub magnitude: u64,
    }

    pub fn integer(token: &Token) -> Result<Integer, ParseIntError> {
        debug_assert_eq!(token.kind, TokenKind::Integer);
        let (negative, digits) = match token.text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, &*token.text),
        };
        let magnitude = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)?
        } else if digits.len() > 1 && digits.starts_with('0') {
            u64::from_str_radix(&digits[1..], 8)?
        } else {
            digits.parse()?
        };
        Ok(Integer {
            negative,
            magnitude,
        })
    }

    pub fn float(token: &Token) -> Result<f64, ParseFloatError> {
        debug_assert_eq!(token.kind, TokenKind::Float);
        token.text.parse()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    UnexpectedChar(char),
    UnclosedString,
    UnescapedLineBreak,
    UnclosedChar,
    EmptyChar,
    InvalidEscape,
    UnclosedComment,
    MalformedNumber,
    /// A well-formed token which the grammar doesn't allow at this point.
    Unexpected {
        token: Token,
        context: &'static str,
    },
}

impl Error {
    /// Whether this is a scan failure (as opposed to a grammar violation).
    pub fn is_lexical(&self) -> bool {
        !matches!(self, Error::Unexpected { .. })
    }
}
