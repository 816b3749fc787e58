//! Maps the validated AST onto Rust declarations.
//!
//! [`declaration::render`] turns a single [`Declaration`](crate::ast::Declaration)
//! into a Rust type expression plus the wire metadata ([`Tag`]s) a paired
//! encoder needs. [`rust::Generator`] composes those into a whole module.

use std::fmt;

use crate::{ast::Modifier, registry};

pub mod declaration;
pub mod rust;

/// The position a declaration is rendered in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode<'a> {
    /// A plain struct member.
    Field,
    /// The right-hand side of a typedef. No field decoration is produced.
    Typedef,
    /// The discriminant of a union.
    UnionSwitch,
    /// A union arm selected by the given (sorted) discriminant values.
    UnionCase(&'a [u32]),
    /// The default arm of a union.
    UnionDefault,
}

/// Wire-encoding metadata attached to a rendered declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    Opt,
    Len(u32),
    MaxLen(u32),
    Opaque,
    UnionSwitch,
    UnionCase(Vec<u32>),
    UnionDefault,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Opt => f.write_str("opt"),
            Tag::Len(n) => write!(f, "len:{n}"),
            Tag::MaxLen(n) => write!(f, "maxlen:{n}"),
            Tag::Opaque => f.write_str("opaque"),
            Tag::UnionSwitch => f.write_str("union:switch"),
            Tag::UnionCase(values) => {
                f.write_str("union:")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Tag::UnionDefault => f.write_str("union:default"),
        }
    }
}

/// The result of rendering a declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    /// The Rust type expression, such as `Option<Box<Node>>`.
    pub ty: String,
    pub tags: Vec<Tag>,
    /// Whether an encoder may leave the field out of self-describing
    /// formats when it is empty.
    pub omittable: bool,
    /// The complete, unindented field item: doc comments, the `#[xdr(..)]`
    /// attribute and `pub name: Type,`. Empty in [`Mode::Typedef`] and for
    /// `void` declarations.
    pub field: String,
}

#[derive(Debug)]
pub enum Error {
    Registry(registry::Error),
    /// Anonymous aggregates (and typedef bodies) have no Rust name.
    Unnameable {
        field: Box<str>,
        kind: &'static str,
    },
    MissingBound {
        field: Box<str>,
        kind: &'static str,
    },
    UnboundedString {
        field: Box<str>,
    },
    MapNotStruct {
        field: Box<str>,
        kind: &'static str,
    },
    MapMemberCount {
        field: Box<str>,
        count: usize,
    },
    MapModifier {
        field: Box<str>,
        modifier: Modifier,
    },
    MapKey {
        field: Box<str>,
        key: String,
    },
    /// A constant value with no Rust literal of a supported type.
    ConstantOutOfRange(Box<str>),
    /// Two IDL names which map to the same Rust name in one scope.
    NameCollision {
        first: Box<str>,
        second: Box<str>,
        name: String,
    },
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registry(error) => write!(f, "{error}"),
            Error::Unnameable { field, kind } => {
                write!(f, "`{field}` has an anonymous {kind} type, which has no Rust name")
            }
            Error::MissingBound { field, kind } => {
                write!(f, "`{field}`: {kind} requires a size bound")
            }
            Error::UnboundedString { field } => {
                write!(f, "`{field}`: string requires a maximum size")
            }
            Error::MapNotStruct { field, kind } => write!(
                f,
                "can't generate `{field}` as map: type must be a struct, is {kind}"
            ),
            Error::MapMemberCount { field, count } => write!(
                f,
                "can't generate `{field}` as map: struct has {count} members, must be 2"
            ),
            Error::MapModifier { field, modifier } => write!(
                f,
                "can't generate `{field}` as map: {modifier} modifier unsupported"
            ),
            Error::MapKey { field, key } => write!(f, "can't use `{key}` as map key of `{field}`"),
            Error::ConstantOutOfRange(name) => {
                write!(f, "constant `{name}` has no Rust representation")
            }
            Error::NameCollision {
                first,
                second,
                name,
            } => write!(f, "`{first}` and `{second}` both map to the Rust name `{name}`"),
            Error::Io(error) => write!(f, "failed to write output: {error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Registry(error) => Some(error),
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<registry::Error> for Error {
    fn from(error: registry::Error) -> Self {
        Error::Registry(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}
