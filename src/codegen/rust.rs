use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet},
    fmt::{self, Write},
    io,
};

use tracing::debug;

use crate::{
    ast::{
        Attributes, Body, Constant, Declaration, Definition, DefinitionKind, EnumSpec, Modifier,
        Specification, Type,
    },
    codegen::{declaration::render, Error, Mode},
    registry,
};

const DEFAULT_CODE_CAPACITY: usize = 16 * 1024;
const INDENT: &str = "    ";
const HEADER: &str = "// Code generated by xdrgen. DO NOT EDIT.\n";

/// Renders a whole [`Specification`] as a single Rust module.
pub struct Generator<'a> {
    spec: &'a Specification,
    code: String,
}

impl<'a> Generator<'a> {
    pub fn new(spec: &'a Specification) -> Generator<'a> {
        Generator {
            spec,
            code: String::with_capacity(DEFAULT_CODE_CAPACITY),
        }
    }

    pub fn generate(self, mut w: impl io::Write) -> Result<(), Error> {
        let code = self.generate_string()?;
        w.write_all(code.as_bytes())?;
        Ok(())
    }

    pub fn generate_string(mut self) -> Result<String, Error> {
        self.gen_specification()?;
        Ok(self.code)
    }

    fn gen_specification(&mut self) -> Result<(), Error> {
        self.code.push_str(HEADER);
        let docs = doc_comment(&self.spec.attributes, "//!");
        if !docs.is_empty() {
            self.code.push_str(&docs);
        }

        let spec = self.spec;
        // Options of named enums are emitted as variants instead.
        let enum_options: BTreeSet<&str> = spec
            .definitions
            .iter()
            .filter_map(|d| match &d.body {
                Body::Type(Some(Type::Enum(e))) => Some(e),
                _ => None,
            })
            .flat_map(|e| e.options.iter().map(|o| &*o.name))
            .collect();

        let definitions: Vec<&Definition> = spec
            .definitions
            .iter()
            .filter(|d| !enum_options.contains(&*d.name))
            .collect();

        // Types and constants live in separate Rust namespaces.
        let mut types = Names::default();
        let mut constants = Names::default();
        for definition in &definitions {
            let name = &definition.name;
            match definition.body.kind() {
                DefinitionKind::Type => types.claim(type_name(name), name)?,
                DefinitionKind::Constant => constants.claim(const_name(name), name)?,
            };
        }

        for definition in definitions {
            debug!(name = %definition.name, "rendering definition");
            self.code.push('\n');
            self.gen_definition(definition)?;
        }
        Ok(())
    }

    fn gen_definition(&mut self, definition: &Definition) -> Result<(), Error> {
        let name = &definition.name;
        match &definition.body {
            Body::Constant(Some(constant)) => self.gen_constant(definition, constant),
            Body::Type(Some(Type::Enum(spec))) => self.gen_enum(definition, spec),
            Body::Type(Some(Type::Struct(spec))) => {
                let fields: Vec<_> = spec
                    .members
                    .iter()
                    .filter(|member| !member.is_void())
                    .map(|member| (member, Mode::Field))
                    .collect();
                self.gen_struct(definition, &fields)
            }
            Body::Type(Some(Type::Union(spec))) => {
                let variants = spec.variants();
                let arms = variants
                    .iter()
                    .filter(|variant| !variant.member.is_void())
                    .map(|variant| {
                        let mode = if variant.is_default {
                            Mode::UnionDefault
                        } else {
                            Mode::UnionCase(&variant.values)
                        };
                        (variant.member, mode)
                    });
                let fields: Vec<_> = std::iter::once((&*spec.discriminant, Mode::UnionSwitch))
                    .chain(arms)
                    .collect();
                self.gen_struct(definition, &fields)
            }
            Body::Type(Some(Type::Typedef(decl))) => self.gen_typedef(definition, decl),
            Body::Type(Some(ty)) => {
                // Only produced by hand-built specifications.
                let decl = Declaration::new(name.clone(), ty.clone(), Modifier::None);
                self.gen_typedef(definition, &decl)
            }
            Body::Type(None) | Body::Constant(None) => {
                Err(registry::Error::UndefinedType(name.clone()).into())
            }
        }
    }

    fn gen_constant(&mut self, definition: &Definition, constant: &Constant) -> Result<(), Error> {
        let out_of_range = || Error::ConstantOutOfRange(definition.name.clone());
        let (ty, value) = match constant {
            Constant::Void => ("()", "()".to_owned()),
            Constant::Bool(v) => ("bool", v.to_string()),
            Constant::PosInt(v) if u32::try_from(*v).is_ok() => ("u32", int_literal(*v)),
            Constant::PosInt(v) => ("u64", int_literal(*v)),
            Constant::NegInt(v) if *v <= 1 << 63 => ("i64", format!("-{v}")),
            Constant::NegInt(_) => return Err(out_of_range()),
            Constant::Float(v) if v.is_finite() => ("f64", format!("{v:?}")),
            Constant::Float(_) => return Err(out_of_range()),
            Constant::String(v) => ("&str", format!("{v:?}")),
            Constant::Enum(v) => ("u32", v.to_string()),
        };
        self.emit_docs(&definition.attributes, "");
        let name = const_name(&definition.name);
        self.emit(format_args!("pub const {name}: {ty} = {value};\n"));
        Ok(())
    }

    fn gen_enum(&mut self, definition: &Definition, spec: &EnumSpec) -> Result<(), Error> {
        let name = type_name(&definition.name);
        let mut variant_names = Names::default();
        let mut alias_names = Names::default();
        for option in &spec.options {
            if spec.is_canonical(option) {
                variant_names.claim(type_name(&option.name), &option.name)?;
            } else {
                alias_names.claim(const_name(&option.name), &option.name)?;
            }
        }

        self.emit_docs(&definition.attributes, "");
        self.emit(format_args!(
            "#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]\n\
             #[repr(u32)]\n\
             pub enum {name} {{\n"
        ));
        let mut aliases = Vec::new();
        for option in &spec.options {
            if !spec.is_canonical(option) {
                aliases.push(option);
                continue;
            }
            self.emit_docs(&option.attributes, INDENT);
            let variant = type_name(&option.name);
            self.emit(format_args!("{INDENT}{variant} = {},\n", option.value));
        }
        self.emit(format_args!("}}\n"));

        if aliases.is_empty() {
            return Ok(());
        }
        self.emit(format_args!("\nimpl {name} {{\n"));
        for alias in aliases {
            let canonical = spec.canonical_name(alias.value).unwrap_or_default();
            self.emit_docs(&alias.attributes, INDENT);
            self.emit(format_args!(
                "{INDENT}pub const {}: {name} = {name}::{};\n",
                const_name(&alias.name),
                type_name(canonical),
            ));
        }
        self.emit(format_args!("}}\n"));
        Ok(())
    }

    /// Emits a struct with one field per member, each rendered in its mode.
    /// Unions are flattened the same way, tagged by their case values.
    fn gen_struct(
        &mut self,
        definition: &Definition,
        members: &[(&Declaration, Mode<'_>)],
    ) -> Result<(), Error> {
        let name = type_name(&definition.name);
        let mut field_names = Names::default();
        for (member, _) in members {
            field_names.claim(field_name(&member.name).0, &member.name)?;
        }
        let fields = members
            .iter()
            .map(|&(member, mode)| Ok(render(self.spec, member, mode)?.field))
            .collect::<Result<Vec<_>, Error>>()?;

        self.emit_docs(&definition.attributes, "");
        self.emit(format_args!("#[derive(Clone, Debug, PartialEq)]\n"));
        if fields.is_empty() {
            self.emit(format_args!("pub struct {name} {{}}\n"));
            return Ok(());
        }
        self.emit(format_args!("pub struct {name} {{\n"));
        for field in fields {
            for line in field.lines() {
                self.emit(format_args!("{INDENT}{line}\n"));
            }
        }
        self.emit(format_args!("}}\n"));
        Ok(())
    }

    /// Emits a plain alias, or a newtype when the alias needs its own wire
    /// metadata.
    fn gen_typedef(&mut self, definition: &Definition, decl: &Declaration) -> Result<(), Error> {
        let name = type_name(&definition.name);
        let rendered = render(self.spec, decl, Mode::Typedef)?;
        let ty = rendered.ty;

        let docs = if definition.attributes.get("doc").is_some() {
            &definition.attributes
        } else {
            &decl.attributes
        };
        self.emit_docs(docs, "");
        if rendered.tags.is_empty() {
            self.emit(format_args!("pub type {name} = {ty};\n"));
            return Ok(());
        }
        let tags = rendered
            .tags
            .iter()
            .map(|tag| format!("{:?}", tag.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(format_args!(
            "#[derive(Clone, Debug, PartialEq)]\n\
             pub struct {name}(#[xdr({tags})] pub {ty});\n"
        ));
        Ok(())
    }
}

// Utility functions.
impl Generator<'_> {
    fn emit(&mut self, f: fmt::Arguments<'_>) {
        self.code
            .write_fmt(f)
            .expect("code emit should be infallible");
    }

    fn emit_docs(&mut self, attributes: &Attributes, indent: &str) {
        for line in doc_comment(attributes, "///").lines() {
            self.emit(format_args!("{indent}{line}\n"));
        }
    }
}

/// The Rust names taken in one namespace, mapped to the IDL names they came
/// from.
#[derive(Default)]
struct Names<'a>(BTreeMap<String, &'a str>);

impl<'a> Names<'a> {
    fn claim(&mut self, rust: String, idl: &'a str) -> Result<(), Error> {
        match self.0.entry(rust) {
            Entry::Vacant(entry) => {
                entry.insert(idl);
                Ok(())
            }
            Entry::Occupied(entry) => Err(Error::NameCollision {
                first: (*entry.get()).into(),
                second: idl.into(),
                name: entry.key().clone(),
            }),
        }
    }
}

fn int_literal(v: u64) -> String {
    if v <= 0xFFFF {
        v.to_string()
    } else {
        format!("0x{v:X}")
    }
}

/// Renders the `doc` attribute as comment lines with the given marker
/// (`///` or `//!`), each ending in a newline.
pub fn doc_comment(attributes: &Attributes, marker: &str) -> String {
    let doc = attributes.get_string("doc");
    let mut out = String::new();
    for line in doc.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str(marker);
        } else {
            out.push_str(marker);
            out.push(' ');
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Splits an identifier into words, at underscores and at case changes
/// (`nextNode`, `HTTPServer`, `MAX_SIZE`).
fn words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|i| chars[i]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_uppercase()
            && match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Converts to `UpperCamelCase`, for types and enum variants.
pub fn type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in words(name) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    escape(if out.is_empty() { name.to_owned() } else { out })
}

/// Converts to `snake_case`, returning the escaped name along with whether
/// it differs from the IDL name.
pub fn field_name(name: &str) -> (String, bool) {
    let snake = words(name)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    let snake = if snake.is_empty() { name.to_owned() } else { snake };
    let renamed = snake != name;
    (escape(snake), renamed)
}

/// Converts to `SCREAMING_SNAKE_CASE`, for constants.
pub fn const_name(name: &str) -> String {
    let screaming = words(name)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_");
    escape(if screaming.is_empty() { name.to_owned() } else { screaming })
}

static KEYWORDS: phf::Set<&'static str> = phf::phf_set! {
    "abstract", "as", "async", "await", "become", "box", "break", "const",
    "continue", "crate", "do", "dyn", "else", "enum", "extern", "false",
    "final", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "macro",
    "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "try", "type", "typeof", "unsafe", "unsized", "use", "virtual", "where",
    "while", "yield",
};

/// Escapes keywords as raw identifiers. The few that can't be raw get a
/// trailing underscore instead.
fn escape(name: String) -> String {
    if !KEYWORDS.contains(name.as_str()) {
        return name;
    }
    match name.as_str() {
        "crate" | "self" | "Self" | "super" => name + "_",
        _ => format!("r#{name}"),
    }
}
