use tracing::debug;

use crate::{
    ast::{
        Attributes, Constant, Declaration, Definition, DefinitionId, EnumOption, EnumSpec,
        Modifier, Specification, StructSpec, Type, UnionSpec,
    },
    lexer::{self, extract, Lexer},
    registry,
    token::{Span, Spanned, Token, TokenKind},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Parses a whole source unit. The first error aborts parsing.
pub fn parse_specification(src: &str) -> Result<Specification> {
    let mut p = Parser::new(src);
    p.parse_specification()?;
    debug!(definitions = p.spec.definitions.len(), "parsed specification");
    Ok(p.spec)
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    spec: Specification,
}

impl Parser<'_> {
    fn parse_specification(&mut self) -> Result<()> {
        if self.lexer.next_one_of(&[TokenKind::Hash])?.is_some() {
            self.lexer
                .peek_expect("specification attributes", &[TokenKind::LBracket])?;
            self.spec.attributes = self.parse_attributes()?;
        }
        while self.lexer.peek_kind()? != TokenKind::Eof {
            self.parse_definition()?;
        }
        Ok(())
    }

    fn parse_definition(&mut self) -> Result<DefinitionId> {
        use TokenKind::*;

        let attributes = self.parse_attributes()?;
        let token = self.lexer.next()?;
        let (span, definition) = match token.kind {
            Const => {
                let name = self.lexer.expect("constant", &[Identifier])?;
                self.lexer.expect("constant", &[Eq])?;
                let value = self.parse_value()?.inner;
                self.lexer.expect("constant", &[Semicolon])?;
                (name.span(), Definition::new_constant(name.text, value))
            }
            Typedef => {
                let Spanned { span, inner: decl } = self.parse_declaration("typedef", false)?;
                self.lexer.expect("typedef", &[Semicolon])?;
                let name = decl.name.clone();
                (span, Definition::new_type(name, Type::Typedef(Box::new(decl))))
            }
            Enum | Struct | Union => {
                let context = token.kind.as_str().unwrap_or("definition");
                let name = self.lexer.expect(context, &[Identifier])?;
                // Reserve the slot first, so the body may refer to it.
                self.spec
                    .type_ref(&name.text)
                    .map_err(|e| registry_error(name.span(), e))?;
                let ty = match token.kind {
                    Enum => Type::Enum(self.parse_enum_body()?),
                    Struct => Type::Struct(self.parse_struct_body()?),
                    _ => Type::Union(self.parse_union_body()?),
                };
                self.lexer.expect(context, &[Semicolon])?;
                (name.span(), Definition::new_type(name.text, ty))
            }
            _ => return Err(unexpected(token, "definition")),
        };
        self.put(span, definition.with_attributes(attributes))
    }

    /// Parses an optional `[name, name(value), ...]` list.
    fn parse_attributes(&mut self) -> Result<Attributes> {
        use TokenKind::{Comma, Identifier, LBracket, LParen, RBracket, RParen};

        let mut attributes = Attributes::default();
        if self.lexer.next_one_of(&[LBracket])?.is_none() {
            return Ok(attributes);
        }
        if self.lexer.next_one_of(&[RBracket])?.is_some() {
            return Ok(attributes);
        }
        loop {
            let name = self.lexer.expect("attributes", &[Identifier])?;
            let value = if self.lexer.next_one_of(&[LParen])?.is_some() {
                let value = self.parse_attribute_value()?;
                self.lexer.expect("attribute", &[RParen])?;
                value
            } else {
                Constant::Bool(true)
            };
            attributes.insert(name.text, value);
            if self.lexer.expect("attributes", &[Comma, RBracket])?.kind == RBracket {
                return Ok(attributes);
            }
        }
    }

    /// Like [`Parser::parse_value`], but a bare identifier which doesn't name
    /// a constant is taken as a string.
    fn parse_attribute_value(&mut self) -> Result<Constant> {
        let token = self.lexer.peek()?;
        if token.kind == TokenKind::Identifier && self.spec.get_constant(&token.text).is_err() {
            let token = self.lexer.next()?;
            return Ok(Constant::String(token.text));
        }
        Ok(self.parse_value()?.inner)
    }

    fn parse_value(&mut self) -> Result<Spanned<Constant>> {
        use TokenKind::*;

        let token = self
            .lexer
            .expect("value", &[Identifier, Integer, Float, String, Char])?;
        let span = token.span();
        let constant = match token.kind {
            Identifier => self
                .spec
                .get_constant(&token.text)
                .cloned()
                .map_err(|e| registry_error(span, e))?,
            Integer => {
                let int = extract::integer(&token)
                    .map_err(|_| span.wrap(Error::IntegerOutOfRange))?;
                if int.negative {
                    Constant::NegInt(int.magnitude)
                } else {
                    Constant::PosInt(int.magnitude)
                }
            }
            Float => {
                let float =
                    extract::float(&token).map_err(|_| span.wrap(Error::MalformedFloat))?;
                Constant::Float(float)
            }
            _ => Constant::String(token.text),
        };
        Ok(span.wrap(constant))
    }

    /// Parses a value which is used as a size or as a discriminant.
    fn parse_u32(&mut self) -> Result<u32> {
        let Spanned { span, inner } = self.parse_value()?;
        inner
            .as_u32()
            .ok_or_else(|| span.wrap(Error::NotU32(inner)))
    }

    /// The returned span covers the type specifier and the name.
    fn parse_declaration(
        &mut self,
        context: &'static str,
        allow_void: bool,
    ) -> Result<Spanned<Declaration>> {
        use TokenKind::*;

        let attributes = self.parse_attributes()?;
        let token = self.lexer.next()?;
        let ty = match token.kind {
            Void if allow_void => {
                let decl = Declaration {
                    attributes,
                    ..Declaration::void()
                };
                return Ok(token.span().wrap(decl));
            }
            Unsigned => match self.lexer.expect("unsigned type", &[Int, Hyper])?.kind {
                Int => Type::UnsignedInt,
                _ => Type::UnsignedHyper,
            },
            Int => Type::Int,
            Hyper => Type::Hyper,
            FloatKw => Type::Float,
            Double => Type::Double,
            Bool => Type::Bool,
            StringKw => Type::String,
            Opaque => Type::Opaque,
            Enum => Type::Enum(self.parse_enum_body()?),
            Struct => Type::Struct(self.parse_struct_body()?),
            Union => Type::Union(self.parse_union_body()?),
            Identifier => self
                .spec
                .type_ref(&token.text)
                .map_err(|e| registry_error(token.span(), e))?,
            _ => return Err(unexpected(token, context)),
        };

        let star = self.lexer.next_one_of(&[Star])?;
        let name = self.lexer.expect(context, &[Identifier])?;
        let span = token.span().to(name.span());

        let modifier = match star {
            Some(_) if matches!(ty, Type::String | Type::Opaque) => {
                return Err(name.span().wrap(Error::MissingBound(ty.kind_name())));
            }
            Some(_) => Modifier::Optional,
            None => self.parse_bound(&ty, &name)?,
        };

        Ok(span.wrap(Declaration {
            name: name.text,
            ty,
            modifier,
            attributes,
        }))
    }

    fn parse_bound(&mut self, ty: &Type, name: &Token) -> Result<Modifier> {
        use TokenKind::*;

        let Some(open) = self.lexer.next_one_of(&[Less, LBracket])? else {
            if matches!(ty, Type::String | Type::Opaque) {
                return Err(name.span().wrap(Error::MissingBound(ty.kind_name())));
            }
            return Ok(Modifier::None);
        };

        if open.kind == LBracket {
            if *ty == Type::String {
                return Err(open.span().wrap(Error::FixedString));
            }
            let size = self.parse_u32()?;
            self.lexer.expect("fixed-size bound", &[RBracket])?;
            return Ok(Modifier::Fixed(size));
        }

        if let Some(close) = self.lexer.next_one_of(&[Greater])? {
            if *ty == Type::String {
                return Err(open.span().to(close.span()).wrap(Error::UnboundedString));
            }
            return Ok(Modifier::Unbounded);
        }
        let size = self.parse_u32()?;
        self.lexer.expect("variable-size bound", &[Greater])?;
        Ok(Modifier::Flexible(size))
    }

    fn parse_enum_body(&mut self) -> Result<EnumSpec> {
        use TokenKind::{Comma, Eq, Identifier, LBrace, RBrace};

        let open = self.lexer.expect("enum body", &[LBrace])?;
        let mut spec = EnumSpec::default();
        loop {
            if let Some(close) = self.lexer.next_one_of(&[RBrace])? {
                if spec.options.is_empty() {
                    return Err(open.span().to(close.span()).wrap(Error::EmptyEnum));
                }
                break;
            }

            let attributes = self.parse_attributes()?;
            let name = self.lexer.expect("enum body", &[Identifier])?;
            self.lexer.expect("enum body", &[Eq])?;
            let value = self.parse_u32()?;
            if spec.has_option(&name.text) {
                return Err(name.span().wrap(Error::DuplicateEnumOption(name.text)));
            }

            // Options are also constants, usable by later values.
            let constant = Definition::new_constant(name.text.clone(), Constant::Enum(value))
                .with_attributes(attributes.clone());
            self.put(name.span(), constant)?;
            spec.options.push(EnumOption {
                name: name.text,
                value,
                attributes,
            });

            if self.lexer.expect("enum body", &[Comma, RBrace])?.kind == RBrace {
                break;
            }
        }
        Ok(spec)
    }

    fn parse_struct_body(&mut self) -> Result<StructSpec> {
        use TokenKind::{LBrace, RBrace, Semicolon};

        self.lexer.expect("struct body", &[LBrace])?;
        let mut spec = StructSpec::default();
        while self.lexer.next_one_of(&[RBrace])?.is_none() {
            let Spanned { span, inner: decl } = self.parse_declaration("struct body", true)?;
            if !decl.is_void() && spec.has_member(&decl.name) {
                return Err(span.wrap(Error::DuplicateMember(decl.name)));
            }
            self.lexer.expect("struct body", &[Semicolon])?;
            spec.members.push(decl);
        }
        Ok(spec)
    }

    fn parse_union_body(&mut self) -> Result<UnionSpec> {
        use TokenKind::*;

        self.lexer.expect("union", &[Switch])?;
        self.lexer.expect("union", &[LParen])?;
        let discriminant = self.parse_declaration("union discriminant", false)?.inner;
        self.lexer.expect("union", &[RParen])?;
        self.lexer.expect("union", &[LBrace])?;

        let mut spec = UnionSpec::new(discriminant);
        while self.lexer.peek_kind()? == Case {
            // `case A: case B: decl;` selects the same arm for both values.
            let mut values = Vec::with_capacity(1);
            while let Some(case) = self.lexer.next_one_of(&[Case])? {
                let lo = self.lexer.peek()?.span();
                let value = self.parse_u32()?;
                if spec.has_option(value) || values.contains(&value) {
                    return Err(case.span().to(lo).wrap(Error::DuplicateCase(value)));
                }
                values.push(value);
                self.lexer.expect("union case", &[Colon])?;
            }
            let member = self.parse_arm(&mut spec, "union case")?;
            for value in values {
                spec.options.insert(value, member);
            }
        }

        if self.lexer.next_one_of(&[Default])?.is_some() {
            self.lexer.expect("union default", &[Colon])?;
            spec.default_member = Some(self.parse_arm(&mut spec, "union default")?);
        }
        self.lexer.expect("union", &[RBrace])?;
        Ok(spec)
    }

    /// Parses an arm declaration, returning its member index. Arms of the
    /// same name share a member, as long as they are declared alike.
    fn parse_arm(&mut self, spec: &mut UnionSpec, context: &'static str) -> Result<usize> {
        let Spanned { span, inner: decl } = self.parse_declaration(context, true)?;
        self.lexer.expect(context, &[TokenKind::Semicolon])?;

        if !decl.is_void() && decl.name == spec.discriminant.name {
            return Err(span.wrap(Error::DiscriminantCollision(decl.name)));
        }
        match spec.member(&decl.name) {
            Some((i, existing)) if existing.equivalent(&decl) => Ok(i),
            Some(_) => Err(span.wrap(Error::MemberMismatch(decl.name))),
            None => {
                spec.members.push(decl);
                Ok(spec.members.len() - 1)
            }
        }
    }
}

impl Parser<'_> {
    fn new(src: &str) -> Parser<'_> {
        Parser {
            lexer: Lexer::new(src),
            spec: Specification::new(),
        }
    }

    fn put(&mut self, span: Span, definition: Definition) -> Result<DefinitionId> {
        self.spec
            .put_definition(definition)
            .map_err(|e| registry_error(span, e))
    }
}

fn registry_error(span: Span, error: registry::Error) -> Spanned<Error> {
    span.wrap(Error::Registry(error))
}

fn unexpected(token: Token, context: &'static str) -> Spanned<Error> {
    token
        .span()
        .wrap(Error::Lexer(lexer::Error::Unexpected { token, context }))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Lexer(lexer::Error),
    Registry(registry::Error),
    IntegerOutOfRange,
    MalformedFloat,
    /// A size or discriminant which can't be narrowed to `u32`.
    NotU32(Constant),
    /// `string` and `opaque` must always be bounded.
    MissingBound(&'static str),
    UnboundedString,
    FixedString,
    EmptyEnum,
    DuplicateEnumOption(Box<str>),
    DuplicateMember(Box<str>),
    DuplicateCase(u32),
    DiscriminantCollision(Box<str>),
    MemberMismatch(Box<str>),
}

impl From<Spanned<lexer::Error>> for Spanned<Error> {
    fn from(error: Spanned<lexer::Error>) -> Self {
        error.map(Error::Lexer)
    }
}
