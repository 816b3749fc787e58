use std::{fmt, ops::Range};

#[derive(Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The processed token text: identifier names, numeric literals as
    /// written, and string/char literals after escape processing.
    pub text: Box<str>,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<Box<str>>, span: Span) -> Token {
        Token {
            kind,
            text: text.into(),
            len: span.len,
            lo: span.lo,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "Token({:?}, {})", self.kind, self.span())
        } else {
            write!(f, "Token({:?} {:?}, {})", self.kind, self.text, self.span())
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier => write!(f, "identifier `{}`", self.text),
            TokenKind::Integer => write!(f, "integer `{}`", self.text),
            TokenKind::Float => write!(f, "float `{}`", self.text),
            TokenKind::Char => write!(f, "char {:?}", self.text),
            TokenKind::String => write!(f, "string {:?}", self.text),
            kind => write!(f, "{kind}"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap_or(u32::MAX))
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns a span that covers both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new_of_bounds(self.lo.min(other.lo)..self.hi().max(other.hi()))
    }

    pub fn substr(self, src: &str) -> &str {
        &src[self.lo..self.hi()]
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }

    /// Computes the one-based line and column of the start of this span.
    /// Columns count characters, not bytes.
    pub fn position(self, src: &str) -> Position {
        let lo = self.lo.min(src.len());
        let before = &src[..lo];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Position { line, column }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> Spanned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        self.span.wrap(f(self.inner))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Bool,
    Case,
    Const,
    Default,
    Double,
    Enum,
    FloatKw,
    Hyper,
    Int,
    Opaque,
    StringKw,
    Struct,
    Switch,
    Typedef,
    Union,
    Unsigned,
    Void,

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Less,
    Greater,
    Comma,
    Semicolon,
    Colon,
    Star,
    Eq,
    Hash,

    Identifier,
    /// Possibly negative; the sign is part of the token text.
    Integer,
    Float,
    Char,
    String,

    Eof,
}

impl TokenKind {
    /// The source text of keywords and punctuation.
    pub const fn as_str(self) -> Option<&'static str> {
        use TokenKind::*;
        let s = match self {
            Bool => "bool",
            Case => "case",
            Const => "const",
            Default => "default",
            Double => "double",
            Enum => "enum",
            FloatKw => "float",
            Hyper => "hyper",
            Int => "int",
            Opaque => "opaque",
            StringKw => "string",
            Struct => "struct",
            Switch => "switch",
            Typedef => "typedef",
            Union => "union",
            Unsigned => "unsigned",
            Void => "void",
            LBrace => "{",
            RBrace => "}",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            Less => "<",
            Greater => ">",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Star => "*",
            Eq => "=",
            Hash => "#",
            Identifier | Integer | Float | Char | String | Eof => return None,
        };
        Some(s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.as_str() {
            return write!(f, "`{s}`");
        }
        match self {
            TokenKind::Identifier => f.write_str("identifier"),
            TokenKind::Integer => f.write_str("integer"),
            TokenKind::Float => f.write_str("float"),
            TokenKind::Char => f.write_str("char"),
            TokenKind::String => f.write_str("string"),
            TokenKind::Eof => f.write_str("end of file"),
            _ => unreachable!("keyword or punctuation"),
        }
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "bool" => TokenKind::Bool,
    "case" => TokenKind::Case,
    "const" => TokenKind::Const,
    "default" => TokenKind::Default,
    "double" => TokenKind::Double,
    "enum" => TokenKind::Enum,
    "float" => TokenKind::FloatKw,
    "hyper" => TokenKind::Hyper,
    "int" => TokenKind::Int,
    "opaque" => TokenKind::Opaque,
    "string" => TokenKind::StringKw,
    "struct" => TokenKind::Struct,
    "switch" => TokenKind::Switch,
    "typedef" => TokenKind::Typedef,
    "union" => TokenKind::Union,
    "unsigned" => TokenKind::Unsigned,
    "void" => TokenKind::Void,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip_through_as_str() {
        for (text, kind) in KEYWORDS.entries() {
            assert_eq!(kind.as_str(), Some(*text));
        }
    }

    #[test]
    fn position_counts_lines_and_chars() {
        let src = "ab\ncdé\nfg";
        assert_eq!(
            Span::new_of_length(0, 1).position(src),
            Position { line: 1, column: 1 }
        );
        assert_eq!(
            Span::new_of_length(4, 1).position(src),
            Position { line: 2, column: 2 }
        );
        // `é` is two bytes wide.
        assert_eq!(
            Span::new_of_length(8, 1).position(src),
            Position { line: 3, column: 1 }
        );
    }

    #[test]
    fn span_to_covers_both() {
        let a = Span::new_of_bounds(2..4);
        let b = Span::new_of_bounds(7..9);
        assert_eq!(a.to(b), Span::new_of_bounds(2..9));
        assert_eq!(b.to(a), Span::new_of_bounds(2..9));
    }
}
