use std::fmt::Write;

use crate::{
    ast::{Declaration, Modifier, Specification, Type},
    codegen::{
        rust::{doc_comment, field_name, type_name},
        Error, Mode, Rendered, Tag,
    },
};

/// A named Rust type, before any modifier is applied.
struct Base {
    name: String,
    /// Struct and union references are boxed, since they may be recursive.
    boxed: bool,
}

impl Base {
    /// The type as stored directly in a field.
    fn by_ref(&self) -> String {
        if self.boxed {
            format!("Box<{}>", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Renders a declaration in the given position.
///
/// This is pure: it only reads the specification, and rendering the same
/// declaration twice yields the same result.
pub fn render(spec: &Specification, decl: &Declaration, mode: Mode<'_>) -> Result<Rendered, Error> {
    let mut tags = Vec::with_capacity(3);
    match mode {
        Mode::Field | Mode::Typedef => {}
        Mode::UnionSwitch => tags.push(Tag::UnionSwitch),
        Mode::UnionCase(values) => tags.push(Tag::UnionCase(values.to_vec())),
        Mode::UnionDefault => tags.push(Tag::UnionDefault),
    }

    let ty = if decl.attributes.get_string("mode") == "map" {
        map_type(spec, decl)?
    } else {
        match decl.ty {
            Type::String => string_type(decl, &mut tags)?,
            Type::Opaque => opaque_type(decl, &mut tags)?,
            _ => modified_type(spec, decl, &mut tags)?,
        }
    };

    let omittable = (mode == Mode::UnionDefault) != (decl.modifier == Modifier::Optional);
    let field = if mode == Mode::Typedef || decl.is_void() {
        String::new()
    } else {
        render_field(decl, &ty, &tags, omittable)
    };

    Ok(Rendered {
        ty,
        tags,
        omittable,
        field,
    })
}

fn string_type(decl: &Declaration, tags: &mut Vec<Tag>) -> Result<String, Error> {
    match decl.modifier {
        Modifier::None | Modifier::Optional => {
            return Err(Error::MissingBound {
                field: decl.name.clone(),
                kind: "string",
            })
        }
        Modifier::Unbounded => {
            return Err(Error::UnboundedString {
                field: decl.name.clone(),
            })
        }
        Modifier::Fixed(n) => tags.push(Tag::Len(n)),
        Modifier::Flexible(n) => tags.push(Tag::MaxLen(n)),
    }
    Ok("String".to_owned())
}

fn opaque_type(decl: &Declaration, tags: &mut Vec<Tag>) -> Result<String, Error> {
    let ty = match decl.modifier {
        Modifier::None | Modifier::Optional => {
            return Err(Error::MissingBound {
                field: decl.name.clone(),
                kind: "opaque",
            })
        }
        Modifier::Fixed(n) => {
            tags.push(Tag::Len(n));
            format!("[u8; {n}]")
        }
        Modifier::Flexible(n) => {
            tags.push(Tag::MaxLen(n));
            "Vec<u8>".to_owned()
        }
        Modifier::Unbounded => "Vec<u8>".to_owned(),
    };
    tags.push(Tag::Opaque);
    Ok(ty)
}

fn modified_type(
    spec: &Specification,
    decl: &Declaration,
    tags: &mut Vec<Tag>,
) -> Result<String, Error> {
    let base = base_type(spec, decl)?;
    let ty = match decl.modifier {
        Modifier::None => base.by_ref(),
        Modifier::Optional => {
            tags.push(Tag::Opt);
            format!("Option<{}>", base.by_ref())
        }
        Modifier::Fixed(n) => {
            tags.push(Tag::Len(n));
            format!("[{}; {n}]", base.by_ref())
        }
        // The vector already provides the indirection.
        Modifier::Flexible(n) => {
            tags.push(Tag::MaxLen(n));
            format!("Vec<{}>", base.name)
        }
        Modifier::Unbounded => format!("Vec<{}>", base.name),
    };
    Ok(ty)
}

/// Maps the primitive types and follows a single level of references.
fn base_type(spec: &Specification, decl: &Declaration) -> Result<Base, Error> {
    let primitive = |name: &str| {
        Ok(Base {
            name: name.to_owned(),
            boxed: false,
        })
    };
    match &decl.ty {
        Type::Void => primitive("()"),
        Type::Bool => primitive("bool"),
        Type::Int => primitive("i32"),
        Type::UnsignedInt => primitive("u32"),
        Type::Hyper => primitive("i64"),
        Type::UnsignedHyper => primitive("u64"),
        Type::Float => primitive("f32"),
        Type::Double => primitive("f64"),
        Type::String => primitive("String"),
        ty @ Type::Ref(_) => {
            let (definition, target) = spec.follow_ref(ty)?;
            Ok(Base {
                name: type_name(&definition.name),
                boxed: matches!(target, Type::Struct(_) | Type::Union(_)),
            })
        }
        ty @ (Type::Opaque
        | Type::Enum(_)
        | Type::Struct(_)
        | Type::Union(_)
        | Type::Typedef(_)) => Err(Error::Unnameable {
            field: decl.name.clone(),
            kind: ty.kind_name(),
        }),
    }
}

/// Renders a `[mode(map)]` declaration: a variable-length array of
/// two-member structs becomes a map from the first member's type to the
/// second's.
fn map_type(spec: &Specification, decl: &Declaration) -> Result<String, Error> {
    let field = || decl.name.clone();
    let resolved = spec.resolve(&decl.ty)?;
    let Type::Struct(pair) = resolved else {
        return Err(Error::MapNotStruct {
            field: field(),
            kind: resolved.kind_name(),
        });
    };
    let [key, value] = pair.members.as_slice() else {
        return Err(Error::MapMemberCount {
            field: field(),
            count: pair.members.len(),
        });
    };
    if !matches!(decl.modifier, Modifier::Flexible(_) | Modifier::Unbounded) {
        return Err(Error::MapModifier {
            field: field(),
            modifier: decl.modifier,
        });
    }

    let key_ty = render(spec, key, Mode::Typedef)?.ty;
    if !has_total_order(spec, &key.ty, spec.definitions.len()) {
        return Err(Error::MapKey {
            field: field(),
            key: key_ty,
        });
    }
    let value_ty = render(spec, value, Mode::Typedef)?.ty;
    let value_ty = match value_ty.strip_prefix("Box<").and_then(|t| t.strip_suffix('>')) {
        Some(unboxed) => unboxed.to_owned(),
        None => value_ty,
    };
    Ok(format!("std::collections::BTreeMap<{key_ty}, {value_ty}>"))
}

fn render_field(decl: &Declaration, ty: &str, tags: &[Tag], omittable: bool) -> String {
    let mut out = doc_comment(&decl.attributes, "///");

    let (name, renamed) = field_name(&decl.name);
    let mut items: Vec<String> = tags.iter().map(|tag| format!("{:?}", tag.to_string())).collect();
    if omittable {
        items.push("omit_empty".to_owned());
    }
    if renamed {
        items.push(format!("rename = {:?}", &*decl.name));
    }
    if !items.is_empty() {
        writeln!(out, "#[xdr({})]", items.join(", ")).expect("code emit should be infallible");
    }
    write!(out, "pub {name}: {ty},").expect("code emit should be infallible");
    out
}

/// Whether the Rust type generated for `ty` implements `Ord`, as map keys
/// must. Generated structs, unions and tagged newtypes don't, nor do floats.
fn has_total_order(spec: &Specification, ty: &Type, depth: usize) -> bool {
    match ty {
        Type::Float | Type::Double => false,
        Type::Ref(_) if depth > 0 => match spec.follow_ref(ty) {
            Ok((_, Type::Enum(_))) => true,
            Ok((_, Type::Typedef(decl))) => {
                render(spec, decl, Mode::Typedef).is_ok_and(|r| r.tags.is_empty())
                    && has_total_order(spec, &decl.ty, depth - 1)
            }
            Ok((_, Type::Struct(_) | Type::Union(_))) | Err(_) => false,
            Ok((_, target)) => has_total_order(spec, target, depth - 1),
        },
        Type::Ref(_) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::{Attributes, Constant},
        parser::parse_specification,
    };

    fn field_of(spec: &Specification, ty: &str, member: usize) -> Declaration {
        let Ok(Type::Struct(s)) = spec.get_type(ty) else {
            panic!("{ty} must be a struct");
        };
        s.members[member].clone()
    }

    fn render_member(
        src: &str,
        ty: &str,
        member: usize,
        mode: Mode<'_>,
    ) -> Result<Rendered, Error> {
        let spec = parse_specification(src).unwrap();
        let decl = field_of(&spec, ty, member);
        render(&spec, &decl, mode)
    }

    fn ty_and_tags(src: &str, member: usize) -> (String, Vec<String>) {
        let rendered = render_member(src, "S", member, Mode::Field).unwrap();
        let tags = rendered.tags.iter().map(ToString::to_string).collect();
        (rendered.ty, tags)
    }

    #[test]
    fn base_types() {
        let src = "
            struct S {
                void;
                bool a; int b; unsigned int c; hyper d; unsigned hyper e;
                float f; double g; string h<10>;
            };
        ";
        let expected = ["()", "bool", "i32", "u32", "i64", "u64", "f32", "f64", "String"];
        for (i, expected) in expected.into_iter().enumerate() {
            assert_eq!(ty_and_tags(src, i).0, expected);
        }
    }

    #[test]
    fn modifiers_and_tags() {
        let src = "
            typedef int Alias;
            struct S {
                int a[3];
                int b<5>;
                int c<>;
                int *d;
                Alias e;
                string f<9>;
                opaque g[16];
                opaque h<32>;
                opaque i<>;
            };
        ";
        let expected: &[(&str, &[&str])] = &[
            ("[i32; 3]", &["len:3"]),
            ("Vec<i32>", &["maxlen:5"]),
            ("Vec<i32>", &[]),
            ("Option<i32>", &["opt"]),
            ("Alias", &[]),
            ("String", &["maxlen:9"]),
            ("[u8; 16]", &["len:16", "opaque"]),
            ("Vec<u8>", &["maxlen:32", "opaque"]),
            ("Vec<u8>", &["opaque"]),
        ];
        for (i, (ty, tags)) in expected.iter().enumerate() {
            let (actual_ty, actual_tags) = ty_and_tags(src, i);
            let actual_tags: Vec<&str> = actual_tags.iter().map(String::as_str).collect();
            assert_eq!((actual_ty.as_str(), actual_tags.as_slice()), (*ty, *tags));
        }
    }

    #[test]
    fn aggregates_are_boxed_except_in_vectors() {
        let src = "
            enum Color { RED = 0 };
            struct S {
                S *next;
                S children<>;
                S pair[2];
                Color color;
                Color *maybe;
            };
        ";
        let expected = [
            "Option<Box<S>>",
            "Vec<S>",
            "[Box<S>; 2]",
            "Color",
            "Option<Color>",
        ];
        for (i, expected) in expected.into_iter().enumerate() {
            assert_eq!(ty_and_tags(src, i).0, expected);
        }
    }

    #[test]
    fn ref_follows_one_level_only() {
        let src = "
            struct Inner { int x; };
            typedef Inner Alias;
            struct S { Alias a; };
        ";
        // `Alias` is a typedef, not a struct, so it isn't boxed.
        assert_eq!(ty_and_tags(src, 0).0, "Alias");
    }

    #[test]
    fn map_mode() {
        let src = "
            struct Pair { string key<64>; Pair *value; };
            struct Triple { int a; int b; int c; };
            struct Keyed { Pair key; int value; };
            struct S {
                [mode(map)] Pair entries<>;
                [mode(map)] Pair bounded<8>;
                [mode(map)] Triple triples<>;
                [mode(map)] Pair fixed[2];
                [mode(map)] Keyed keyed<>;
                [mode(map)] int numbers<>;
            };
        ";
        let ok = |i| render_member(src, "S", i, Mode::Field).map(|r| (r.ty, r.tags));
        let err = |i| render_member(src, "S", i, Mode::Field).unwrap_err().to_string();

        assert_eq!(
            ok(0).unwrap(),
            (
                "std::collections::BTreeMap<String, Option<Box<Pair>>>".to_owned(),
                vec![]
            )
        );
        assert_eq!(
            ok(1).unwrap().0,
            "std::collections::BTreeMap<String, Option<Box<Pair>>>"
        );
        assert_eq!(
            err(2),
            "can't generate `triples` as map: struct has 3 members, must be 2"
        );
        assert_eq!(
            err(3),
            "can't generate `fixed` as map: fixed[2] modifier unsupported"
        );
        assert_eq!(err(4), "can't use `Box<Pair>` as map key of `keyed`");
        assert_eq!(
            err(5),
            "can't generate `numbers` as map: type must be a struct, is int"
        );
    }

    #[test]
    fn map_keys_must_be_ordered() {
        let src = "
            enum Color { RED = 0, GREEN = 1 };
            typedef Color Shade;
            typedef double Weight;
            typedef string Label<16>;
            struct ByColor { Color key; int value; };
            struct ByShade { Shade key; int value; };
            struct ByFloat { float key; int value; };
            struct ByWeight { Weight key; int value; };
            struct ByLabel { Label key; int value; };
            struct ByUnsigned { unsigned hyper *key; int value; };
            struct S {
                [mode(map)] ByColor colors<>;
                [mode(map)] ByShade shades<>;
                [mode(map)] ByFloat floats<>;
                [mode(map)] ByWeight weights<>;
                [mode(map)] ByLabel labels<>;
                [mode(map)] ByUnsigned counts<>;
            };
        ";
        let ok = |i| render_member(src, "S", i, Mode::Field).unwrap().ty;
        let err = |i| render_member(src, "S", i, Mode::Field).unwrap_err().to_string();

        assert_eq!(ok(0), "std::collections::BTreeMap<Color, i32>");
        assert_eq!(ok(1), "std::collections::BTreeMap<Shade, i32>");
        assert_eq!(err(2), "can't use `f32` as map key of `floats`");
        assert_eq!(err(3), "can't use `Weight` as map key of `weights`");
        assert_eq!(err(4), "can't use `Label` as map key of `labels`");
        assert_eq!(ok(5), "std::collections::BTreeMap<Option<u64>, i32>");
    }

    #[test]
    fn map_values_are_unboxed() {
        let src = "
            struct Node { int id; Node *next; };
            struct Entry { int id; Node node; };
            struct S { [mode(map)] Entry nodes<>; };
        ";
        assert_eq!(
            ty_and_tags(src, 0).0,
            "std::collections::BTreeMap<i32, Node>"
        );
    }

    #[test]
    fn union_modes() {
        let src = "struct S { int a; int *b; };";
        let spec = parse_specification(src).unwrap();
        let a = field_of(&spec, "S", 0);
        let b = field_of(&spec, "S", 1);

        let switch = render(&spec, &a, Mode::UnionSwitch).unwrap();
        assert_eq!(switch.tags, [Tag::UnionSwitch]);
        assert!(!switch.omittable);

        let case = render(&spec, &b, Mode::UnionCase(&[1, 4])).unwrap();
        assert_eq!(case.tags, [Tag::UnionCase(vec![1, 4]), Tag::Opt]);
        assert!(case.omittable);

        let default = render(&spec, &a, Mode::UnionDefault).unwrap();
        assert_eq!(default.tags, [Tag::UnionDefault]);
        assert!(default.omittable);

        // Optional default arms already signal absence.
        let optional_default = render(&spec, &b, Mode::UnionDefault).unwrap();
        assert!(!optional_default.omittable);
    }

    #[test]
    fn field_text() {
        let src = "
            struct S {
                [doc(\"The next node.\\nMay be absent.\")] S *nextNode;
                int type;
                int plain;
            };
        ";
        let spec = parse_specification(src).unwrap();

        let next = render(&spec, &field_of(&spec, "S", 0), Mode::Field).unwrap();
        assert_eq!(
            next.field,
            "/// The next node.\n\
             /// May be absent.\n\
             #[xdr(\"opt\", omit_empty, rename = \"nextNode\")]\n\
             pub next_node: Option<Box<S>>,"
        );

        let keyword = render(&spec, &field_of(&spec, "S", 1), Mode::Field).unwrap();
        assert_eq!(keyword.field, "pub r#type: i32,");

        let plain = render(&spec, &field_of(&spec, "S", 2), Mode::Field).unwrap();
        assert_eq!(plain.field, "pub plain: i32,");
    }

    #[test]
    fn typedef_mode_has_tags_but_no_field() {
        let mut decl = Declaration::new("hash", Type::Opaque, Modifier::Fixed(32));
        decl.attributes = [("doc", Constant::String("Digest".into()))]
            .into_iter()
            .collect::<Attributes>();
        let rendered = render(&Specification::new(), &decl, Mode::Typedef).unwrap();
        assert_eq!(rendered.ty, "[u8; 32]");
        assert_eq!(rendered.tags, [Tag::Len(32), Tag::Opaque]);
        assert_eq!(rendered.field, "");
    }

    #[test]
    fn rendering_is_pure() {
        let src = "union U switch (int k) { case 1: U *next; }; struct S { U u; };";
        let spec = parse_specification(src).unwrap();
        let decl = field_of(&spec, "S", 0);
        let first = render(&spec, &decl, Mode::UnionCase(&[1])).unwrap();
        let second = render(&spec, &decl, Mode::UnionCase(&[1])).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ty, "Box<U>");
    }

    #[test]
    fn errors() {
        let spec = Specification::new();
        let render_alone =
            |decl: Declaration| render(&spec, &decl, Mode::Field).unwrap_err().to_string();

        assert_eq!(
            render_alone(Declaration::new("s", Type::String, Modifier::None)),
            "`s`: string requires a size bound"
        );
        assert_eq!(
            render_alone(Declaration::new("s", Type::String, Modifier::Unbounded)),
            "`s`: string requires a maximum size"
        );
        assert_eq!(
            render_alone(Declaration::new("o", Type::Opaque, Modifier::Optional)),
            "`o`: opaque requires a size bound"
        );
        assert_eq!(
            render_alone(Declaration::new(
                "inline",
                Type::Struct(crate::ast::StructSpec::default()),
                Modifier::None
            )),
            "`inline` has an anonymous struct type, which has no Rust name"
        );
        assert_eq!(
            render_alone(Declaration::new(
                "dangling",
                Type::Ref(crate::ast::DefinitionId(3)),
                Modifier::None
            )),
            "reference to missing definition #3"
        );
    }

    #[test]
    fn undefined_reference_is_reported_when_followed() {
        let src = "struct S { Missing m; };";
        let err = render_member(src, "S", 0, Mode::Field).unwrap_err();
        assert_eq!(err.to_string(), "type `Missing` is never defined");
    }
}
