// specification ::= ['#' attributes] definition*
// definition ::= [attributes] type-def | [attributes] constant-def
// constant-def ::= 'const' ID '=' value ';'
// type-def ::= 'typedef' declaration ';'
//            | 'enum' ID enum-body ';'
//            | 'struct' ID struct-body ';'
//            | 'union' ID union-body ';'
// declaration ::= [attributes] type-specifier ['*'] ID [bound]
//               | [attributes] 'void'
// bound ::= '<' [value] '>' | '[' value ']'
// type-specifier ::= ['unsigned'] 'int' | ['unsigned'] 'hyper'
//                  | 'float' | 'double' | 'bool' | 'string' | 'opaque'
//                  | 'enum' enum-body | 'struct' struct-body | 'union' union-body
//                  | ID
// enum-body ::= '{' ([attributes] ID '=' value (',' ...)*) '}'
// struct-body ::= '{' (declaration ';')* '}'
// union-body ::= 'switch' '(' declaration ')' '{'
//                  ('case' value ':' ('case' value ':')* declaration ';')*
//                  ['default' ':' declaration ';']
//                '}'
// attributes ::= '[' [ID ['(' value ')'] (',' ID ['(' value ')'])*] ']'
// value ::= ID | integer | float | string

use std::collections::BTreeMap;

/// A parsed (and validated) IDL source unit.
///
/// Definitions are stored in source order (the order in which their names
/// were first seen) and are addressed by [`DefinitionId`], which is stable
/// once handed out.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Specification {
    pub definitions: Vec<Definition>,
    pub attributes: Attributes,
}

/// An index into [`Specification::definitions`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionId(pub u32);

impl DefinitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Definition {
    pub name: Box<str>,
    pub body: Body,
    pub attributes: Attributes,
}

impl Definition {
    pub fn new_type(name: impl Into<Box<str>>, ty: Type) -> Definition {
        Definition {
            name: name.into(),
            body: Body::Type(Some(ty)),
            attributes: Attributes::default(),
        }
    }

    pub fn new_constant(name: impl Into<Box<str>>, constant: Constant) -> Definition {
        Definition {
            name: name.into(),
            body: Body::Constant(Some(constant)),
            attributes: Attributes::default(),
        }
    }

    /// An empty type definition, reserved ahead of its body.
    pub fn placeholder(name: impl Into<Box<str>>) -> Definition {
        Definition {
            name: name.into(),
            body: Body::Type(None),
            attributes: Attributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Definition {
        self.attributes = attributes;
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.body.is_empty()
    }
}

/// The payload of a definition. `None` marks a slot which was reserved
/// (through a forward reference) but not yet filled.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Type(Option<Type>),
    Constant(Option<Constant>),
}

impl Body {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Body::Type(_) => DefinitionKind::Type,
            Body::Constant(_) => DefinitionKind::Constant,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Type(None) | Body::Constant(None))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefinitionKind {
    Type,
    Constant,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionKind::Type => f.write_str("type"),
            DefinitionKind::Constant => f.write_str("constant"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Int,
    UnsignedInt,
    Hyper,
    UnsignedHyper,
    Float,
    Double,
    String,
    Opaque,
    Enum(EnumSpec),
    Struct(StructSpec),
    Union(UnionSpec),
    /// The right-hand side of a `typedef`. Never unwrapped while parsing.
    Typedef(Box<Declaration>),
    Ref(DefinitionId),
}

impl Type {
    /// A short name of this type's variant, for use in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Bool => "bool",
            Type::Int => "int",
            Type::UnsignedInt => "unsigned int",
            Type::Hyper => "hyper",
            Type::UnsignedHyper => "unsigned hyper",
            Type::Float => "float",
            Type::Double => "double",
            Type::String => "string",
            Type::Opaque => "opaque",
            Type::Enum(_) => "enum",
            Type::Struct(_) => "struct",
            Type::Union(_) => "union",
            Type::Typedef(_) => "typedef",
            Type::Ref(_) => "reference",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    /// Empty for `void` declarations.
    pub name: Box<str>,
    pub ty: Type,
    pub modifier: Modifier,
    pub attributes: Attributes,
}

impl Declaration {
    pub fn new(name: impl Into<Box<str>>, ty: Type, modifier: Modifier) -> Declaration {
        Declaration {
            name: name.into(),
            ty,
            modifier,
            attributes: Attributes::default(),
        }
    }

    pub fn void() -> Declaration {
        Declaration::new("", Type::Void, Modifier::None)
    }

    pub fn is_void(&self) -> bool {
        self.ty == Type::Void
    }

    /// Declarations are equivalent when their name, type and modifier match.
    /// Attributes are not considered.
    pub fn equivalent(&self, other: &Declaration) -> bool {
        self.ty == other.ty && self.modifier == other.modifier && self.name == other.name
    }
}

/// The array/optionality qualifier of a declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Modifier {
    #[default]
    None,
    /// `T *name`
    Optional,
    /// `T name[n]`
    Fixed(u32),
    /// `T name<n>`
    Flexible(u32),
    /// `T name<>`
    Unbounded,
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modifier::None => f.write_str("none"),
            Modifier::Optional => f.write_str("optional"),
            Modifier::Fixed(n) => write!(f, "fixed[{n}]"),
            Modifier::Flexible(n) => write!(f, "flexible<{n}>"),
            Modifier::Unbounded => f.write_str("unbounded<>"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct EnumSpec {
    pub options: Vec<EnumOption>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumOption {
    pub name: Box<str>,
    pub value: u32,
    pub attributes: Attributes,
}

impl EnumSpec {
    pub fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|o| &*o.name == name)
    }

    /// Returns the canonical (first declared) name for the given value.
    pub fn canonical_name(&self, value: u32) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| &*o.name)
    }

    /// Whether the option is the first one declared with its value.
    pub fn is_canonical(&self, option: &EnumOption) -> bool {
        self.canonical_name(option.value) == Some(&*option.name)
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct StructSpec {
    pub members: Vec<Declaration>,
}

impl StructSpec {
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| &*m.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnionSpec {
    pub discriminant: Box<Declaration>,
    /// Arm declarations, deduplicated by name, in order of first use.
    pub members: Vec<Declaration>,
    /// Maps each case value to an index into `members`.
    pub options: BTreeMap<u32, usize>,
    pub default_member: Option<usize>,
}

/// A union member together with the case values selecting it.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionVariant<'a> {
    pub member: &'a Declaration,
    /// Sorted ascending.
    pub values: Vec<u32>,
    pub is_default: bool,
}

impl UnionSpec {
    pub fn new(discriminant: Declaration) -> UnionSpec {
        UnionSpec {
            discriminant: Box::new(discriminant),
            members: Vec::new(),
            options: BTreeMap::new(),
            default_member: None,
        }
    }

    pub fn has_option(&self, value: u32) -> bool {
        self.options.contains_key(&value)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    /// Returns the member with the given name along with its index.
    pub fn member(&self, name: &str) -> Option<(usize, &Declaration)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| &*m.name == name)
    }

    /// Lists every member along with the case values which select it.
    pub fn variants(&self) -> Vec<UnionVariant<'_>> {
        self.members
            .iter()
            .enumerate()
            .map(|(i, member)| UnionVariant {
                member,
                values: self
                    .options
                    .iter()
                    .filter(|&(_, &m)| m == i)
                    .map(|(&v, _)| v)
                    .collect(),
                is_default: self.default_member == Some(i),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Void,
    Bool(bool),
    PosInt(u64),
    /// Holds the magnitude.
    NegInt(u64),
    Float(f64),
    String(Box<str>),
    Enum(u32),
}

impl Constant {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Void => "void",
            Constant::Bool(_) => "bool",
            Constant::PosInt(_) => "positive integer",
            Constant::NegInt(_) => "negative integer",
            Constant::Float(_) => "float",
            Constant::String(_) => "string",
            Constant::Enum(_) => "enum",
        }
    }

    /// Narrows the constant to an unsigned 32-bit value, as used for sizes and
    /// discriminants. Negative values wrap to their two's complement.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Constant::PosInt(v) => u32::try_from(v).ok(),
            Constant::NegInt(v) if v <= 1 << 31 => {
                let v = u32::try_from(v).ok()?;
                Some(v.wrapping_neg())
            }
            Constant::Enum(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Void => f.write_str("void"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::PosInt(v) => write!(f, "{v}"),
            Constant::NegInt(v) => write!(f, "-{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
            Constant::String(v) => write!(f, "{v:?}"),
            Constant::Enum(v) => write!(f, "enum {v}"),
        }
    }
}

/// Free-form key/value annotations, such as generation hints (`mode(map)`)
/// and documentation (`doc("...")`).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Attributes(pub BTreeMap<Box<str>, Constant>);

impl Attributes {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Constant> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<Box<str>>, value: Constant) {
        self.0.insert(key.into(), value);
    }

    /// Returns the string value of the given key, or `default` if it is
    /// missing or not a string.
    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(Constant::String(s)) => s,
            _ => default,
        }
    }

    pub fn get_string(&self, key: &str) -> &str {
        self.get_string_or(key, "")
    }
}

impl<K: Into<Box<str>>> FromIterator<(K, Constant)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, Constant)>>(iter: I) -> Self {
        Attributes(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_to_u32() {
        assert_eq!(Constant::PosInt(7).as_u32(), Some(7));
        assert_eq!(Constant::PosInt(u64::from(u32::MAX)).as_u32(), Some(u32::MAX));
        assert_eq!(Constant::PosInt(1 << 32).as_u32(), None);
        assert_eq!(Constant::NegInt(1).as_u32(), Some(u32::MAX));
        assert_eq!(Constant::NegInt(1 << 31).as_u32(), Some(1 << 31));
        assert_eq!(Constant::NegInt((1 << 31) + 1).as_u32(), None);
        assert_eq!(Constant::Enum(3).as_u32(), Some(3));
        assert_eq!(Constant::Float(1.0).as_u32(), None);
        assert_eq!(Constant::String("1".into()).as_u32(), None);
        assert_eq!(Constant::Bool(true).as_u32(), None);
        assert_eq!(Constant::Void.as_u32(), None);
    }

    #[test]
    fn declaration_equivalence_ignores_attributes() {
        let a = Declaration::new("x", Type::Int, Modifier::Fixed(2));
        let mut b = a.clone();
        b.attributes.insert("doc", Constant::String("hi".into()));
        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&Declaration::new("x", Type::Int, Modifier::Fixed(3))));
        assert!(!a.equivalent(&Declaration::new("y", Type::Int, Modifier::Fixed(2))));
        assert!(!a.equivalent(&Declaration::new("x", Type::Hyper, Modifier::Fixed(2))));
    }

    #[test]
    fn enum_canonical_names() {
        let option = |name: &str, value| EnumOption {
            name: name.into(),
            value,
            attributes: Attributes::default(),
        };
        let spec = EnumSpec {
            options: vec![option("A", 1), option("B", 2), option("ALIAS", 1)],
        };
        assert_eq!(spec.canonical_name(1), Some("A"));
        assert_eq!(spec.canonical_name(2), Some("B"));
        assert_eq!(spec.canonical_name(3), None);
        assert!(spec.is_canonical(&spec.options[0]));
        assert!(!spec.is_canonical(&spec.options[2]));
        assert!(spec.has_option("ALIAS"));
        assert!(!spec.has_option("C"));
    }

    #[test]
    fn union_variants_collect_sorted_values() {
        let mut spec = UnionSpec::new(Declaration::new("kind", Type::UnsignedInt, Modifier::None));
        spec.members.push(Declaration::new("a", Type::Int, Modifier::None));
        spec.members.push(Declaration::void());
        spec.options.insert(5, 0);
        spec.options.insert(1, 0);
        spec.options.insert(2, 1);
        spec.default_member = Some(1);

        let variants = spec.variants();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].values, [1, 5]);
        assert!(!variants[0].is_default);
        assert_eq!(variants[1].values, [2]);
        assert!(variants[1].is_default);
        assert_eq!(spec.member("a").map(|(i, _)| i), Some(0));
        assert!(spec.has_option(5));
        assert!(!spec.has_option(3));
    }

    #[test]
    fn attribute_strings_with_defaults() {
        let attrs: Attributes = [
            ("mode", Constant::String("map".into())),
            ("flag", Constant::Bool(true)),
        ]
        .into_iter()
        .collect();
        assert_eq!(attrs.get_string("mode"), "map");
        assert_eq!(attrs.get_string("flag"), "");
        assert_eq!(attrs.get_string_or("missing", "fallback"), "fallback");
    }
}
