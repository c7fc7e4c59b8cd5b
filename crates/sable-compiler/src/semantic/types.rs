//! The type registry: interns every type and hands out dense, stable tags.

use thiserror::Error;

use crate::semantic::symbols::SymbolId;
use crate::semantic::value::Tag;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeDefError {
    #[error("type `{0}` is already defined with a different kind")]
    DuplicateType(String),
}

/// Index of a methodmap in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodmapId(pub u32);

/// Index of a methodmap method or property in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

/// Index of a pseudo-struct in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PstructId(pub u32);

/// Kind-specific payload of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    None,
    /// A tagged enumeration.
    Enum,
    /// A named record laid out as a flat array; payload is the root symbol
    /// carrying the field list and total size.
    EnumStruct(SymbolId),
    /// A declaration-only pseudo-struct used for named-field initializers.
    Struct(PstructId),
    Methodmap(MethodmapId),
    /// Opaque object-like tags (`object`, `null_t`).
    Object,
    /// Function typedefs, typesets, and synthesized closure tags.
    Function,
}

#[derive(Debug)]
pub struct Type {
    name: String,
    tag: Tag,
    kind: TypeKind,
    /// Kind observed on the previous pass, kept when payloads are reset.
    first_pass_kind: TypeKind,
    intrinsic: bool,
}

impl Type {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum)
    }

    pub fn is_enum_struct(&self) -> bool {
        matches!(self.kind, TypeKind::EnumStruct(_))
    }

    pub fn as_enum_struct(&self) -> Option<SymbolId> {
        match self.kind {
            TypeKind::EnumStruct(root) => Some(root),
            _ => None,
        }
    }

    pub fn is_methodmap(&self) -> bool {
        matches!(self.kind, TypeKind::Methodmap(_))
    }

    pub fn as_methodmap(&self) -> Option<MethodmapId> {
        match self.kind {
            TypeKind::Methodmap(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    pub fn as_struct(&self) -> Option<PstructId> {
        match self.kind {
            TypeKind::Struct(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, TypeKind::Function)
    }
}

/// A nominal type with inheritance, methods, properties, an optional
/// constructor and an optional destructor.
#[derive(Debug)]
pub struct Methodmap {
    pub name: String,
    pub tag: Tag,
    pub parent: Option<MethodmapId>,
    pub ctor: Option<MethodId>,
    pub dtor: Option<MethodId>,
    pub must_construct_with_new: bool,
    pub methods: Vec<MethodId>,
}

/// A method or property of a methodmap.
#[derive(Debug)]
pub struct MethodmapMethod {
    pub name: String,
    pub map: MethodmapId,
    /// The implementing function (for properties, unused).
    pub target: SymbolId,
    pub getter: Option<SymbolId>,
    pub setter: Option<SymbolId>,
    pub is_static: bool,
    pub is_ctor: bool,
    /// Value tag of the property, when this is a getter/setter pair.
    pub property_tag: Option<Tag>,
}

impl MethodmapMethod {
    pub fn is_property(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

/// A pseudo-struct: declaration-only, initialized by named fields.
#[derive(Debug)]
pub struct Pstruct {
    pub name: String,
    pub fields: Vec<PstructField>,
}

impl Pstruct {
    pub fn field(&self, name: &str) -> Option<(usize, &PstructField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }
}

#[derive(Debug)]
pub struct PstructField {
    pub name: String,
    /// `Variable` for scalar fields, `RefArray` for string fields.
    pub ident: crate::semantic::value::Ident,
    pub tag: Tag,
}

/// Interns every type; tags are dense from 0 and never move.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<Type>,
    methodmaps: Vec<Methodmap>,
    methods: Vec<MethodmapMethod>,
    pstructs: Vec<Pstruct>,
    tag_bool: Tag,
    tag_any: Tag,
    tag_function: Tag,
    tag_string: Tag,
    tag_float: Tag,
    tag_void: Tag,
    tag_object: Tag,
    tag_null: Tag,
    tag_nullfunc: Tag,
}

impl TypeRegistry {
    /// Create the registry with the reserved primitives at fixed tags:
    /// 0 = int, then bool, any, Function, String, Float, void, object,
    /// null_t, nullfunc_t, in that order.
    pub fn new() -> Self {
        let mut reg = Self::default();
        let int = reg.find_or_add("_");
        debug_assert_eq!(int, Tag::INT);
        reg.tag_bool = reg.find_or_add("bool");
        reg.tag_any = reg.find_or_add("any");
        reg.tag_function = reg.find_or_add("Function");
        reg.tag_string = reg.find_or_add("String");
        reg.tag_float = reg.find_or_add("Float");
        reg.tag_void = reg.find_or_add("void");
        reg.tag_object = reg.find_or_add("object");
        reg.tag_null = reg.find_or_add("null_t");
        reg.tag_nullfunc = reg.find_or_add("nullfunc_t");
        reg.types[reg.tag_function.0 as usize].kind = TypeKind::Function;
        reg.types[reg.tag_object.0 as usize].kind = TypeKind::Object;
        reg.types[reg.tag_null.0 as usize].kind = TypeKind::Object;
        reg.types[reg.tag_nullfunc.0 as usize].kind = TypeKind::Object;
        for ty in &mut reg.types {
            ty.intrinsic = true;
        }
        reg
    }

    pub fn tag_bool(&self) -> Tag {
        self.tag_bool
    }
    pub fn tag_any(&self) -> Tag {
        self.tag_any
    }
    pub fn tag_function(&self) -> Tag {
        self.tag_function
    }
    pub fn tag_string(&self) -> Tag {
        self.tag_string
    }
    pub fn tag_float(&self) -> Tag {
        self.tag_float
    }
    pub fn tag_void(&self) -> Tag {
        self.tag_void
    }
    pub fn tag_object(&self) -> Tag {
        self.tag_object
    }
    pub fn tag_null(&self) -> Tag {
        self.tag_null
    }
    pub fn tag_nullfunc(&self) -> Tag {
        self.tag_nullfunc
    }

    pub fn get(&self, tag: Tag) -> &Type {
        &self.types[tag.0 as usize]
    }

    pub fn find(&self, name: &str) -> Option<Tag> {
        self.types.iter().find(|t| t.name == name).map(|t| t.tag)
    }

    /// Intern a name, returning its unique tag.
    pub fn find_or_add(&mut self, name: &str) -> Tag {
        if let Some(tag) = self.find(name) {
            return tag;
        }
        let tag = Tag(self.types.len() as u32);
        self.types.push(Type {
            name: name.to_string(),
            tag,
            kind: TypeKind::None,
            first_pass_kind: TypeKind::None,
            intrinsic: false,
        });
        tag
    }

    /// Human-readable name for diagnostics; tag 0 prints as `int`.
    pub fn pretty_name(&self, tag: Tag) -> &str {
        if tag == Tag::INT {
            return "int";
        }
        let ty = self.get(tag);
        if ty.is_function() {
            return "function";
        }
        ty.name()
    }

    fn attach_kind(&mut self, name: &str, kind: TypeKind) -> Result<Tag, TypeDefError> {
        let tag = self.find_or_add(name);
        let ty = &mut self.types[tag.0 as usize];
        if ty.kind != TypeKind::None && std::mem::discriminant(&ty.kind) != std::mem::discriminant(&kind) {
            return Err(TypeDefError::DuplicateType(name.to_string()));
        }
        ty.kind = kind;
        Ok(tag)
    }

    pub fn define_enum_tag(&mut self, name: &str) -> Result<Tag, TypeDefError> {
        self.attach_kind(name, TypeKind::Enum)
    }

    pub fn define_enum_struct(&mut self, name: &str, root: SymbolId) -> Result<Tag, TypeDefError> {
        self.attach_kind(name, TypeKind::EnumStruct(root))
    }

    pub fn define_pstruct(&mut self, name: &str, ps: Pstruct) -> Result<Tag, TypeDefError> {
        let id = PstructId(self.pstructs.len() as u32);
        let tag = self.attach_kind(name, TypeKind::Struct(id))?;
        self.pstructs.push(ps);
        Ok(tag)
    }

    /// Define a methodmap. The map's `tag` field is filled in here.
    pub fn define_methodmap(&mut self, mut map: Methodmap) -> Result<(MethodmapId, Tag), TypeDefError> {
        let id = MethodmapId(self.methodmaps.len() as u32);
        let name = map.name.clone();
        let tag = self.attach_kind(&name, TypeKind::Methodmap(id))?;
        map.tag = tag;
        self.methodmaps.push(map);
        Ok((id, tag))
    }

    /// Register a method or property under its methodmap.
    pub fn add_method(&mut self, method: MethodmapMethod) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        let map = method.map;
        self.methods.push(method);
        self.methodmaps[map.0 as usize].methods.push(id);
        id
    }

    /// The synthesized function tag backing a closure reference to a
    /// named function.
    pub fn function_type_for(&mut self, func_name: &str) -> Tag {
        let name = format!("::{func_name}");
        let tag = self.find_or_add(&name);
        self.types[tag.0 as usize].kind = TypeKind::Function;
        tag
    }

    pub fn methodmap(&self, id: MethodmapId) -> &Methodmap {
        &self.methodmaps[id.0 as usize]
    }

    pub fn methodmap_mut(&mut self, id: MethodmapId) -> &mut Methodmap {
        &mut self.methodmaps[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodmapMethod {
        &self.methods[id.0 as usize]
    }

    pub fn pstruct(&self, id: PstructId) -> &Pstruct {
        &self.pstructs[id.0 as usize]
    }

    /// Find a method by name, walking the inheritance chain.
    pub fn find_method(&self, map: MethodmapId, name: &str) -> Option<MethodId> {
        let mut iter = Some(map);
        while let Some(id) = iter {
            let map = self.methodmap(id);
            for &mid in &map.methods {
                if self.method(mid).name == name {
                    return Some(mid);
                }
            }
            iter = map.parent;
        }
        None
    }

    /// Whether `child`'s inheritance chain reaches `ancestor`.
    pub fn methodmap_derives_from(&self, child: MethodmapId, ancestor: MethodmapId) -> bool {
        let mut iter = Some(child);
        while let Some(id) = iter {
            if id == ancestor {
                return true;
            }
            iter = self.methodmap(id).parent;
        }
        false
    }

    /// The nearest methodmap in the chain with a destructor.
    pub fn find_dtor_map(&self, map: MethodmapId) -> Option<MethodmapId> {
        let mut iter = Some(map);
        while let Some(id) = iter {
            if self.methodmap(id).dtor.is_some() {
                return Some(id);
            }
            iter = self.methodmap(id).parent;
        }
        None
    }

    /// A tag is "label-only" when it carries no structure and is not one of
    /// the arithmetic primitives.
    pub fn is_label_tag(&self, tag: Tag) -> bool {
        if tag == Tag::INT || tag == self.tag_bool || tag == self.tag_float {
            return false;
        }
        matches!(self.get(tag).kind, TypeKind::None)
    }

    /// Clear non-intrinsic kind payloads between passes, preserving tags.
    pub fn reset_extended(&mut self) {
        for ty in &mut self.types {
            if ty.intrinsic {
                continue;
            }
            if ty.kind != TypeKind::None {
                ty.first_pass_kind = ty.kind;
            }
            ty.kind = TypeKind::None;
        }
        self.methodmaps.clear();
        self.methods.clear();
        self.pstructs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_tags_are_fixed() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.find("_"), Some(Tag(0)));
        assert_eq!(reg.tag_bool(), Tag(1));
        assert_eq!(reg.tag_any(), Tag(2));
        assert_eq!(reg.tag_function(), Tag(3));
        assert_eq!(reg.tag_string(), Tag(4));
        assert_eq!(reg.tag_float(), Tag(5));
        assert_eq!(reg.tag_void(), Tag(6));
        assert_eq!(reg.tag_object(), Tag(7));
        assert_eq!(reg.tag_null(), Tag(8));
        assert_eq!(reg.tag_nullfunc(), Tag(9));
    }

    #[test]
    fn interning_is_stable() {
        let mut reg = TypeRegistry::new();
        let a = reg.find_or_add("Handle");
        let b = reg.find_or_add("Handle");
        assert_eq!(a, b);
        assert_eq!(reg.get(a).name(), "Handle");
    }

    #[test]
    fn duplicate_kind_rejected() {
        let mut reg = TypeRegistry::new();
        reg.define_enum_tag("Thing").unwrap();
        let err = reg.define_pstruct(
            "Thing",
            Pstruct {
                name: "Thing".into(),
                fields: vec![],
            },
        );
        assert_eq!(err.unwrap_err(), TypeDefError::DuplicateType("Thing".into()));
    }

    #[test]
    fn label_tags() {
        let mut reg = TypeRegistry::new();
        let plain = reg.find_or_add("Speed");
        assert!(reg.is_label_tag(plain));
        assert!(!reg.is_label_tag(Tag::INT));
        assert!(!reg.is_label_tag(reg.tag_bool()));
        assert!(!reg.is_label_tag(reg.tag_float()));
        let e = reg.define_enum_tag("Color").unwrap();
        assert!(!reg.is_label_tag(e));
    }

    #[test]
    fn reset_preserves_tags_and_intrinsics() {
        let mut reg = TypeRegistry::new();
        let e = reg.define_enum_tag("Color").unwrap();
        reg.reset_extended();
        assert_eq!(reg.find("Color"), Some(e));
        assert_eq!(reg.get(e).kind(), TypeKind::None);
        // Intrinsics keep their payloads.
        assert!(reg.get(reg.tag_function()).is_function());
        assert!(reg.get(reg.tag_object()).is_object());
    }

    #[test]
    fn methodmap_chain_lookup() {
        let mut reg = TypeRegistry::new();
        let (base, _) = reg
            .define_methodmap(Methodmap {
                name: "Entity".into(),
                tag: Tag::INT,
                parent: None,
                ctor: None,
                dtor: None,
                must_construct_with_new: false,
                methods: vec![],
            })
            .unwrap();
        let m = reg.add_method(MethodmapMethod {
            name: "Kill".into(),
            map: base,
            target: crate::semantic::symbols::SymbolId(0),
            getter: None,
            setter: None,
            is_static: false,
            is_ctor: false,
            property_tag: None,
        });
        let (derived, _) = reg
            .define_methodmap(Methodmap {
                name: "Player".into(),
                tag: Tag::INT,
                parent: Some(base),
                ctor: None,
                dtor: None,
                must_construct_with_new: false,
                methods: vec![],
            })
            .unwrap();
        assert_eq!(reg.find_method(derived, "Kill"), Some(m));
        assert!(reg.methodmap_derives_from(derived, base));
        assert!(!reg.methodmap_derives_from(base, derived));
    }
}
