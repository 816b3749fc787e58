//! Prints a [`Specification`] back in an indented, IDL-like outline. Used by
//! tests to compare parse results.

use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

pub fn print_specification_string(spec: &Specification) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_specification(&mut buf, spec).expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("tree output is UTF-8")
}

pub fn print_specification(w: &mut impl Write, spec: &Specification) -> std::io::Result<()> {
    if !spec.attributes.is_empty() {
        write!(w, "#")?;
        print_attribute_list(w, &spec.attributes)?;
        writeln!(w)?;
    }
    for definition in &spec.definitions {
        print_definition(w, spec, definition)?;
    }
    Ok(())
}

fn print_definition(
    w: &mut impl Write,
    spec: &Specification,
    definition: &Definition,
) -> std::io::Result<()> {
    let name = &definition.name;
    let attributes = &definition.attributes;
    match &definition.body {
        Body::Constant(Some(constant)) => {
            write!(w, "const {name} = {constant}")?;
            print_attributes(w, attributes)?;
            writeln!(w)
        }
        Body::Constant(None) | Body::Type(None) => writeln!(w, "{name} (placeholder)"),
        Body::Type(Some(Type::Typedef(decl))) => {
            write!(w, "typedef ")?;
            print_declaration_head(w, spec, decl)?;
            print_attributes(w, &decl.attributes)?;
            print_attributes(w, attributes)?;
            writeln!(w)?;
            print_inline_body(w, spec, 1, &decl.ty)
        }
        Body::Type(Some(ty @ (Type::Enum(_) | Type::Struct(_) | Type::Union(_)))) => {
            write!(w, "{} {name}", ty.kind_name())?;
            print_attributes(w, attributes)?;
            writeln!(w)?;
            print_inline_body(w, spec, 1, ty)
        }
        Body::Type(Some(ty)) => {
            write!(w, "type {name} = ")?;
            print_type_name(w, spec, ty)?;
            print_attributes(w, attributes)?;
            writeln!(w)
        }
    }
}

/// Prints the children of aggregate types; other types have none.
fn print_inline_body(
    w: &mut impl Write,
    spec: &Specification,
    i: usize,
    ty: &Type,
) -> std::io::Result<()> {
    match ty {
        Type::Enum(e) => {
            for option in &e.options {
                sp(w, i)?;
                write!(w, "{} = {}", option.name, option.value)?;
                print_attributes(w, &option.attributes)?;
                writeln!(w)?;
            }
        }
        Type::Struct(s) => {
            for member in &s.members {
                sp(w, i)?;
                print_declaration(w, spec, i, member)?;
            }
        }
        Type::Union(u) => {
            sp(w, i)?;
            write!(w, "switch ")?;
            print_declaration(w, spec, i, &u.discriminant)?;
            for variant in u.variants() {
                if !variant.values.is_empty() {
                    sp(w, i)?;
                    write!(w, "case ")?;
                    for (idx, value) in variant.values.iter().enumerate() {
                        if idx > 0 {
                            write!(w, ", ")?;
                        }
                        write!(w, "{value}")?;
                    }
                    write!(w, ": ")?;
                    print_declaration(w, spec, i, variant.member)?;
                }
                if variant.is_default {
                    sp(w, i)?;
                    write!(w, "default: ")?;
                    print_declaration(w, spec, i, variant.member)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Prints a declaration line (without leading indentation), followed by the
/// body of an inline aggregate, if any.
fn print_declaration(
    w: &mut impl Write,
    spec: &Specification,
    i: usize,
    decl: &Declaration,
) -> std::io::Result<()> {
    print_declaration_head(w, spec, decl)?;
    print_attributes(w, &decl.attributes)?;
    writeln!(w)?;
    print_inline_body(w, spec, i + 1, &decl.ty)
}

fn print_declaration_head(
    w: &mut impl Write,
    spec: &Specification,
    decl: &Declaration,
) -> std::io::Result<()> {
    print_type_name(w, spec, &decl.ty)?;
    if decl.is_void() {
        return Ok(());
    }
    write!(w, " ")?;
    if decl.modifier == Modifier::Optional {
        write!(w, "*")?;
    }
    write!(w, "{}", decl.name)?;
    match decl.modifier {
        Modifier::Fixed(n) => write!(w, "[{n}]"),
        Modifier::Flexible(n) => write!(w, "<{n}>"),
        Modifier::Unbounded => write!(w, "<>"),
        Modifier::None | Modifier::Optional => Ok(()),
    }
}

fn print_type_name(w: &mut impl Write, spec: &Specification, ty: &Type) -> std::io::Result<()> {
    match ty {
        Type::Ref(id) => match spec.definitions.get(id.index()) {
            Some(definition) => write!(w, "{}", definition.name),
            None => write!(w, "#{}", id.0),
        },
        Type::Typedef(decl) => {
            write!(w, "typedef ")?;
            print_declaration_head(w, spec, decl)
        }
        ty => write!(w, "{}", ty.kind_name()),
    }
}

fn print_attributes(w: &mut impl Write, attributes: &Attributes) -> std::io::Result<()> {
    if attributes.is_empty() {
        return Ok(());
    }
    write!(w, " ")?;
    print_attribute_list(w, attributes)
}

fn print_attribute_list(w: &mut impl Write, attributes: &Attributes) -> std::io::Result<()> {
    write!(w, "[")?;
    for (idx, (key, value)) in attributes.0.iter().enumerate() {
        if idx > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{key}={value}")?;
    }
    write!(w, "]")
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:1$}", "", i * INDENT_WIDTH)
}
