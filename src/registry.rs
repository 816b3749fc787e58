use tracing::{debug, trace};

use crate::ast::{Body, Constant, Definition, DefinitionId, DefinitionKind, Specification, Type};

type Result<T, E = Error> = std::result::Result<T, E>;

impl Specification {
    pub fn new() -> Specification {
        Specification::default()
    }

    /// Looks up a definition by name.
    pub fn named_definition(&self, name: &str) -> Option<(DefinitionId, &Definition)> {
        self.definitions
            .iter()
            .enumerate()
            .find(|(_, d)| &*d.name == name)
            .map(|(i, d)| (id_of(i), d))
    }

    pub fn definition(&self, id: DefinitionId) -> Result<&Definition> {
        self.definitions
            .get(id.index())
            .ok_or(Error::DanglingRef(id))
    }

    /// Inserts a definition, or fills in the placeholder reserved under the
    /// same name. The returned id is stable.
    ///
    /// Fails if a populated definition with that name already exists, or if
    /// the existing one is of a different kind.
    pub fn put_definition(&mut self, definition: Definition) -> Result<DefinitionId> {
        let Some((id, existing)) = self.named_definition(&definition.name) else {
            let id = id_of(self.definitions.len());
            debug!(name = %definition.name, kind = %definition.body.kind(), ?id, "defined");
            self.definitions.push(definition);
            return Ok(id);
        };

        let name = definition.name.clone();
        match (&existing.body, &definition.body) {
            (Body::Type(_), Body::Constant(_)) | (Body::Constant(_), Body::Type(_)) => {
                return Err(Error::NotConsistent(name));
            }
            (Body::Type(Some(_)), _) => return Err(Error::RedefinitionOfType(name)),
            (Body::Constant(Some(_)), _) => return Err(Error::RedefinitionOfConstant(name)),
            _ => {}
        }

        debug!(%name, ?id, "filled placeholder");
        self.definitions[id.index()] = definition;
        Ok(id)
    }

    /// Returns a reference to the named type, reserving an empty placeholder
    /// for it if nothing with that name exists yet.
    pub fn type_ref(&mut self, name: &str) -> Result<Type> {
        if let Some((id, existing)) = self.named_definition(name) {
            if existing.body.kind() != DefinitionKind::Type {
                return Err(Error::NotType(name.into()));
            }
            return Ok(Type::Ref(id));
        }
        let id = id_of(self.definitions.len());
        trace!(name, ?id, "reserved placeholder");
        self.definitions.push(Definition::placeholder(name));
        Ok(Type::Ref(id))
    }

    pub fn get_type(&self, name: &str) -> Result<&Type> {
        let (_, definition) = self
            .named_definition(name)
            .ok_or_else(|| Error::NotFound(name.into()))?;
        match &definition.body {
            Body::Type(Some(ty)) => Ok(ty),
            Body::Type(None) => Err(Error::UndefinedType(name.into())),
            Body::Constant(_) => Err(Error::NotType(name.into())),
        }
    }

    pub fn get_constant(&self, name: &str) -> Result<&Constant> {
        let (_, definition) = self
            .named_definition(name)
            .ok_or_else(|| Error::NotFound(name.into()))?;
        match &definition.body {
            Body::Constant(Some(constant)) => Ok(constant),
            Body::Constant(None) => Err(Error::NotFound(name.into())),
            Body::Type(_) => Err(Error::NotConstant(name.into())),
        }
    }

    /// Follows a single level of [`Type::Ref`], returning the target
    /// definition and its type.
    pub fn follow_ref(&self, ty: &Type) -> Result<(&Definition, &Type)> {
        let &Type::Ref(id) = ty else {
            return Err(Error::NotRef);
        };
        let definition = self.definition(id)?;
        match &definition.body {
            Body::Type(Some(ty)) => Ok((definition, ty)),
            Body::Type(None) => Err(Error::UndefinedType(definition.name.clone())),
            Body::Constant(_) => Err(Error::NotType(definition.name.clone())),
        }
    }

    /// Follows references until a concrete type is reached. Typedefs are not
    /// unwrapped.
    pub fn resolve<'a>(&'a self, mut ty: &'a Type) -> Result<&'a Type> {
        // A chain longer than the number of definitions must revisit one.
        for _ in 0..=self.definitions.len() {
            if !matches!(ty, Type::Ref(_)) {
                return Ok(ty);
            }
            ty = self.follow_ref(ty)?.1;
        }
        match ty {
            Type::Ref(id) => Err(Error::CyclicReference(self.definition(*id)?.name.clone())),
            ty => Ok(ty),
        }
    }
}

fn id_of(index: usize) -> DefinitionId {
    DefinitionId(u32::try_from(index).unwrap_or(u32::MAX))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    NotFound(Box<str>),
    NotType(Box<str>),
    NotConstant(Box<str>),
    /// A definition was redeclared as a different kind (type vs constant).
    NotConsistent(Box<str>),
    RedefinitionOfType(Box<str>),
    RedefinitionOfConstant(Box<str>),
    NotRef,
    /// A referenced type was never given a body.
    UndefinedType(Box<str>),
    CyclicReference(Box<str>),
    DanglingRef(DefinitionId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(name) => write!(f, "definition `{name}` not found"),
            Error::NotType(name) => write!(f, "definition `{name}` is not a type"),
            Error::NotConstant(name) => write!(f, "definition `{name}` is not a constant"),
            Error::NotConsistent(name) => write!(
                f,
                "definition `{name}` is not consistent with preceding definition"
            ),
            Error::RedefinitionOfType(name) => write!(f, "redefinition of type `{name}`"),
            Error::RedefinitionOfConstant(name) => {
                write!(f, "redefinition of constant `{name}`")
            }
            Error::NotRef => f.write_str("type is not a reference"),
            Error::UndefinedType(name) => write!(f, "type `{name}` is never defined"),
            Error::CyclicReference(name) => {
                write!(f, "type `{name}` refers to itself without indirection")
            }
            Error::DanglingRef(id) => write!(f, "reference to missing definition #{}", id.0),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{Declaration, Modifier, StructSpec};

    fn typedef_of(ty: Type) -> Type {
        Type::Typedef(Box::new(Declaration::new("x", ty, Modifier::None)))
    }

    #[test]
    fn put_appends_in_order() {
        let spec = &mut Specification::new();
        let a = spec.put_definition(Definition::new_type("a", Type::Int)).unwrap();
        let b = spec.put_definition(Definition::new_constant("B", Constant::PosInt(1))).unwrap();
        assert_eq!(a, DefinitionId(0));
        assert_eq!(b, DefinitionId(1));
        assert_eq!(spec.get_type("a"), Ok(&Type::Int));
        assert_eq!(spec.get_constant("B"), Ok(&Constant::PosInt(1)));
    }

    #[test]
    fn placeholder_is_filled_in_place() {
        let spec = &mut Specification::new();
        spec.put_definition(Definition::new_type("first", Type::Int)).unwrap();
        let reserved = spec.type_ref("Node").unwrap();
        assert_eq!(reserved, Type::Ref(DefinitionId(1)));
        // Reservation is idempotent.
        assert_eq!(spec.type_ref("Node").unwrap(), reserved);
        assert_eq!(spec.get_type("Node"), Err(Error::UndefinedType("Node".into())));

        spec.put_definition(Definition::new_type("last", Type::Bool)).unwrap();
        let id = spec
            .put_definition(Definition::new_type("Node", Type::Struct(StructSpec::default())))
            .unwrap();
        assert_eq!(id, DefinitionId(1));
        assert_eq!(spec.definitions.len(), 3);
        assert_eq!(
            spec.resolve(&reserved),
            Ok(&Type::Struct(StructSpec::default()))
        );
    }

    #[test]
    fn redefinitions_fail() {
        let spec = &mut Specification::new();
        spec.put_definition(Definition::new_type("T", Type::Int)).unwrap();
        spec.put_definition(Definition::new_constant("C", Constant::Bool(true))).unwrap();

        assert_eq!(
            spec.put_definition(Definition::new_type("T", Type::Hyper)),
            Err(Error::RedefinitionOfType("T".into()))
        );
        assert_eq!(
            spec.put_definition(Definition::new_constant("C", Constant::Void)),
            Err(Error::RedefinitionOfConstant("C".into()))
        );
        assert_eq!(
            spec.put_definition(Definition::new_constant("T", Constant::Void)),
            Err(Error::NotConsistent("T".into()))
        );
        assert_eq!(
            spec.put_definition(Definition::placeholder("C")),
            Err(Error::NotConsistent("C".into()))
        );
        assert_eq!(spec.type_ref("C"), Err(Error::NotType("C".into())));
    }

    #[test]
    fn lookups_by_kind() {
        let spec = &mut Specification::new();
        spec.put_definition(Definition::new_type("T", Type::Int)).unwrap();
        spec.put_definition(Definition::new_constant("C", Constant::Enum(2))).unwrap();
        assert_eq!(spec.get_type("C"), Err(Error::NotType("C".into())));
        assert_eq!(spec.get_constant("T"), Err(Error::NotConstant("T".into())));
        assert_eq!(spec.get_constant("nope"), Err(Error::NotFound("nope".into())));
        assert_eq!(spec.get_type("nope"), Err(Error::NotFound("nope".into())));
        assert_eq!(spec.named_definition("C").map(|(id, _)| id), Some(DefinitionId(1)));
    }

    #[test]
    fn follow_ref_goes_one_level() {
        let spec = &mut Specification::new();
        let inner = spec.type_ref("Inner").unwrap();
        spec.put_definition(Definition::new_type("Outer", inner.clone())).unwrap();
        spec.put_definition(Definition::new_type("Inner", typedef_of(Type::Double))).unwrap();
        let outer = spec.type_ref("Outer").unwrap();

        let (definition, ty) = spec.follow_ref(&outer).unwrap();
        assert_eq!(&*definition.name, "Outer");
        assert_eq!(ty, &inner);
        assert_eq!(spec.resolve(&outer), Ok(&typedef_of(Type::Double)));
        assert_eq!(spec.follow_ref(&Type::Int), Err(Error::NotRef));
        assert_eq!(spec.resolve(&Type::Int), Ok(&Type::Int));
    }

    #[test]
    fn resolution_errors_are_lazy() {
        let spec = &mut Specification::new();
        spec.put_definition(Definition::new_constant("C", Constant::Void)).unwrap();
        let missing = spec.type_ref("Missing").unwrap();
        assert_eq!(
            spec.resolve(&missing),
            Err(Error::UndefinedType("Missing".into()))
        );
        assert_eq!(
            spec.resolve(&Type::Ref(DefinitionId(9))),
            Err(Error::DanglingRef(DefinitionId(9)))
        );
        assert_eq!(
            spec.resolve(&Type::Ref(DefinitionId(0))),
            Err(Error::NotType("C".into()))
        );
    }

    #[test]
    fn reference_cycles_are_detected() {
        let spec = &mut Specification::new();
        let a = spec.type_ref("A").unwrap();
        let b = spec.type_ref("B").unwrap();
        spec.put_definition(Definition::new_type("A", b)).unwrap();
        spec.put_definition(Definition::new_type("B", a.clone())).unwrap();
        assert!(matches!(spec.resolve(&a), Err(Error::CyclicReference(_))));
    }

    #[test]
    fn specification_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Specification>();
    }
}
