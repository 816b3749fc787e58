use crate::{
    lexer, parser,
    token::{Span, Spanned},
    util::fmt::{Context, Show},
};

/// Writes the `file:line:column: ` prefix of the alternate form.
fn write_position(
    f: &mut std::fmt::Formatter<'_>,
    ctx: &Context<'_>,
    span: Span,
) -> std::fmt::Result {
    if f.alternate() {
        let position = span.position(ctx.src);
        write!(f, "{}:{position}: ", ctx.filename)?;
    }
    Ok(())
}

impl Show for Spanned<lexer::Error> {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result {
        write_position(f, ctx, self.span)?;
        show_lexer_error(f, &self.inner)
    }
}

fn show_lexer_error(f: &mut std::fmt::Formatter<'_>, error: &lexer::Error) -> std::fmt::Result {
    use lexer::Error::*;
    match error {
        UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
        UnclosedString => write!(f, "unclosed string literal"),
        UnescapedLineBreak => write!(f, "unescaped line break in string literal"),
        UnclosedChar => write!(f, "unclosed character literal"),
        EmptyChar => write!(f, "empty character literal"),
        InvalidEscape => write!(f, "invalid escape sequence"),
        UnclosedComment => write!(f, "unclosed block comment"),
        MalformedNumber => write!(f, "malformed number literal"),
        Unexpected { token, context } => write!(f, "unexpected {token} while parsing {context}"),
    }
}

impl Show for Spanned<parser::Error> {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result {
        write_position(f, ctx, self.span)?;

        use parser::Error::*;
        match &self.inner {
            Lexer(error) => show_lexer_error(f, error),
            Registry(error) => write!(f, "{error}"),
            IntegerOutOfRange => write!(f, "integer literal out of range"),
            MalformedFloat => write!(f, "malformed float literal"),
            NotU32(constant) => {
                write!(f, "{constant} is not usable as an unsigned 32-bit integer")
            }
            MissingBound(kind) => write!(f, "{kind} declaration requires a size bound"),
            UnboundedString => write!(f, "string requires a maximum size"),
            FixedString => write!(f, "string cannot have a fixed size"),
            EmptyEnum => write!(f, "enum must declare at least one option"),
            DuplicateEnumOption(name) => write!(f, "enum option `{name}` already defined"),
            DuplicateMember(name) => write!(f, "member `{name}` already defined"),
            DuplicateCase(value) => write!(f, "case value {value} already used"),
            DiscriminantCollision(name) => {
                write!(f, "arm `{name}` conflicts with the union discriminant")
            }
            MemberMismatch(name) => write!(f, "arm `{name}` redeclared with a different type"),
        }
    }
}
