//! Runtime type descriptors.
//!
//! A [`Type`] is the runtime identity every [`Value`](crate::Value) carries.
//! Unnamed types compare structurally (`[]int` equals any other `[]int`);
//! named types compare by declaration, so two `Type::named("Celsius", ..)`
//! calls produce two distinct types even with identical underlying shapes.
//! Keep one handle per declared type and clone it.

use std::fmt;
use std::sync::Arc;

/// Structural category of a type, driving which copy strategy applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Boolean
    Bool,
    /// Signed integer (64-bit storage)
    Int,
    /// Unsigned integer (64-bit storage)
    Uint,
    /// Floating point (64-bit storage)
    Float,
    /// Immutable text
    String,
    /// Callable value, shared by identity
    Func,
    /// Host handle with no decomposable structure, shared by identity
    Opaque,
    /// Pointer to a storage cell
    Ptr,
    /// Growable sequence over a shared backing store
    Slice,
    /// Fixed-size sequence with value semantics
    Array,
    /// Key/value mapping
    Map,
    /// Record with named fields
    Struct,
    /// Polymorphic container holding any value
    Interface,
    /// Buffered communication channel
    Chan,
}

impl Kind {
    /// Lowercase kind name
    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Func => "func",
            Kind::Opaque => "opaque",
            Kind::Ptr => "ptr",
            Kind::Slice => "slice",
            Kind::Array => "array",
            Kind::Map => "map",
            Kind::Struct => "struct",
            Kind::Interface => "interface",
            Kind::Chan => "chan",
        }
    }

    /// Whether values of this kind have a nil form
    pub fn is_nilable(self) -> bool {
        matches!(
            self,
            Kind::Func | Kind::Opaque | Kind::Ptr | Kind::Slice | Kind::Map | Kind::Interface | Kind::Chan
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime type. Cheap to clone.
#[derive(Clone)]
pub struct Type(Arc<TypeInner>);

struct TypeInner {
    name: Option<String>,
    repr: Repr,
}

#[derive(Clone, PartialEq)]
enum Repr {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Func,
    Opaque,
    Ptr(Type),
    Slice(Type),
    Array(Type, usize),
    Map(Type, Type),
    Struct(Arc<[Field]>),
    Interface,
    Chan(Type),
}

impl Type {
    fn unnamed(repr: Repr) -> Self {
        Self(Arc::new(TypeInner { name: None, repr }))
    }

    /// `bool`
    pub fn bool() -> Self {
        Self::unnamed(Repr::Bool)
    }

    /// `int`
    pub fn int() -> Self {
        Self::unnamed(Repr::Int)
    }

    /// `uint`
    pub fn uint() -> Self {
        Self::unnamed(Repr::Uint)
    }

    /// `float`
    pub fn float() -> Self {
        Self::unnamed(Repr::Float)
    }

    /// `string`
    pub fn string() -> Self {
        Self::unnamed(Repr::String)
    }

    /// `func`
    pub fn func() -> Self {
        Self::unnamed(Repr::Func)
    }

    /// `opaque`
    pub fn opaque() -> Self {
        Self::unnamed(Repr::Opaque)
    }

    /// The empty interface, able to hold a value of any type
    pub fn any() -> Self {
        Self::unnamed(Repr::Interface)
    }

    /// `*elem`
    pub fn pointer_to(elem: Type) -> Self {
        Self::unnamed(Repr::Ptr(elem))
    }

    /// `[]elem`
    pub fn slice_of(elem: Type) -> Self {
        Self::unnamed(Repr::Slice(elem))
    }

    /// `[len]elem`
    pub fn array_of(elem: Type, len: usize) -> Self {
        Self::unnamed(Repr::Array(elem, len))
    }

    /// `map[key]value`
    pub fn map_of(key: Type, value: Type) -> Self {
        Self::unnamed(Repr::Map(key, value))
    }

    /// `chan elem`
    pub fn chan_of(elem: Type) -> Self {
        Self::unnamed(Repr::Chan(elem))
    }

    /// Anonymous record type
    pub fn record(fields: Vec<Field>) -> Self {
        Self::unnamed(Repr::Struct(fields.into()))
    }

    /// Declare a new named type over `underlying`.
    ///
    /// Every call creates a distinct type.
    pub fn named(name: impl Into<String>, underlying: Type) -> Self {
        Self(Arc::new(TypeInner {
            name: Some(name.into()),
            repr: underlying.0.repr.clone(),
        }))
    }

    /// Structural kind
    pub fn kind(&self) -> Kind {
        match &self.0.repr {
            Repr::Bool => Kind::Bool,
            Repr::Int => Kind::Int,
            Repr::Uint => Kind::Uint,
            Repr::Float => Kind::Float,
            Repr::String => Kind::String,
            Repr::Func => Kind::Func,
            Repr::Opaque => Kind::Opaque,
            Repr::Ptr(_) => Kind::Ptr,
            Repr::Slice(_) => Kind::Slice,
            Repr::Array(..) => Kind::Array,
            Repr::Map(..) => Kind::Map,
            Repr::Struct(_) => Kind::Struct,
            Repr::Interface => Kind::Interface,
            Repr::Chan(_) => Kind::Chan,
        }
    }

    /// Declared name, if the type is named
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Element type of a pointer, slice, array or channel; value type of a map
    pub fn elem(&self) -> Option<&Type> {
        match &self.0.repr {
            Repr::Ptr(elem) | Repr::Slice(elem) | Repr::Array(elem, _) | Repr::Chan(elem) => {
                Some(elem)
            }
            Repr::Map(_, value) => Some(value),
            _ => None,
        }
    }

    /// Key type of a map
    pub fn key(&self) -> Option<&Type> {
        match &self.0.repr {
            Repr::Map(key, _) => Some(key),
            _ => None,
        }
    }

    /// Length of an array type
    pub fn array_len(&self) -> Option<usize> {
        match &self.0.repr {
            Repr::Array(_, len) => Some(*len),
            _ => None,
        }
    }

    /// Fields of a record type; empty for every other kind
    pub fn fields(&self) -> &[Field] {
        match &self.0.repr {
            Repr::Struct(fields) => fields,
            _ => &[],
        }
    }

    /// Position of the named field
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name() == name)
    }

    /// Whether values of this type have a nil form
    pub fn is_nilable(&self) -> bool {
        self.kind().is_nilable()
    }

    /// Whether values of this type may be used as map keys.
    ///
    /// Interfaces are accepted here; the held value is checked on insertion.
    pub fn is_comparable(&self) -> bool {
        match &self.0.repr {
            Repr::Slice(_) | Repr::Map(..) | Repr::Func | Repr::Opaque => false,
            Repr::Array(elem, _) => elem.is_comparable(),
            Repr::Struct(fields) => fields.iter().all(|f| f.ty().is_comparable()),
            _ => true,
        }
    }

    /// Whether both types share the same underlying representation,
    /// which is the condition for [`Value::convert`](crate::Value::convert).
    pub fn same_underlying(&self, other: &Type) -> bool {
        self.0.repr == other.0.repr
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&self.0.name, &other.0.name) {
            (None, None) => self.0.repr == other.0.repr,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.0.name {
            return f.write_str(name);
        }
        match &self.0.repr {
            Repr::Bool => f.write_str("bool"),
            Repr::Int => f.write_str("int"),
            Repr::Uint => f.write_str("uint"),
            Repr::Float => f.write_str("float"),
            Repr::String => f.write_str("string"),
            Repr::Func => f.write_str("func"),
            Repr::Opaque => f.write_str("opaque"),
            Repr::Ptr(elem) => write!(f, "*{elem}"),
            Repr::Slice(elem) => write!(f, "[]{elem}"),
            Repr::Array(elem, len) => write!(f, "[{len}]{elem}"),
            Repr::Map(key, value) => write!(f, "map[{key}]{value}"),
            Repr::Chan(elem) => write!(f, "chan {elem}"),
            Repr::Interface => f.write_str("interface {}"),
            Repr::Struct(fields) => {
                f.write_str("struct {")?;
                for (i, field) in fields.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "; " };
                    write!(f, "{sep}{} {}", field.name(), field.ty())?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A named record field
#[derive(Clone)]
pub struct Field {
    name: String,
    ty: FieldType,
    exported: bool,
}

#[derive(Clone)]
enum FieldType {
    Ready(Type),
    // Resolved on use so a record can refer to itself through a pointer.
    Deferred(fn() -> Type),
}

impl Field {
    /// Exported field of type `ty`
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Ready(ty),
            exported: true,
        }
    }

    /// Exported field whose type is produced on demand
    pub fn deferred(name: impl Into<String>, ty: fn() -> Type) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Deferred(ty),
            exported: true,
        }
    }

    /// Mark the field unexported. Unexported fields cannot be written through
    /// [`Value::set_field`](crate::Value::set_field) and are not cloned.
    pub fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn ty(&self) -> Type {
        match &self.ty {
            FieldType::Ready(ty) => ty.clone(),
            FieldType::Deferred(make) => make(),
        }
    }

    /// Whether the field may be written from outside the declaration
    pub fn is_exported(&self) -> bool {
        self.exported
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.exported == other.exported && self.ty() == other.ty()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("exported", &self.exported)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn node_type() -> Type {
        static NODE: OnceLock<Type> = OnceLock::new();
        NODE.get_or_init(|| {
            Type::named(
                "Node",
                Type::record(vec![
                    Field::new("Value", Type::int()),
                    Field::deferred("Next", || Type::pointer_to(node_type())),
                ]),
            )
        })
        .clone()
    }

    #[test]
    fn test_unnamed_types_compare_structurally() {
        assert_eq!(Type::slice_of(Type::int()), Type::slice_of(Type::int()));
        assert_eq!(
            Type::map_of(Type::string(), Type::any()),
            Type::map_of(Type::string(), Type::any())
        );
        assert_ne!(Type::slice_of(Type::int()), Type::slice_of(Type::uint()));
        assert_ne!(Type::array_of(Type::int(), 2), Type::array_of(Type::int(), 3));
    }

    #[test]
    fn test_named_types_compare_by_declaration() {
        let celsius = Type::named("Celsius", Type::float());
        let again = Type::named("Celsius", Type::float());

        assert_eq!(celsius, celsius.clone());
        assert_ne!(celsius, again);
        assert_ne!(celsius, Type::float());
        assert!(celsius.same_underlying(&Type::float()));
        assert_eq!(Type::pointer_to(celsius.clone()), Type::pointer_to(celsius));
    }

    #[test]
    fn test_display() {
        let person = Type::named("Person", Type::record(vec![Field::new("Name", Type::string())]));
        assert_eq!(Type::pointer_to(person.clone()).to_string(), "*Person");
        assert_eq!(Type::slice_of(Type::string()).to_string(), "[]string");
        assert_eq!(Type::array_of(Type::string(), 3).to_string(), "[3]string");
        assert_eq!(Type::map_of(Type::string(), Type::any()).to_string(), "map[string]interface {}");
        assert_eq!(Type::chan_of(Type::int()).to_string(), "chan int");
        assert_eq!(
            Type::record(vec![Field::new("A", Type::int()), Field::new("b", Type::bool()).private()])
                .to_string(),
            "struct { A int; b bool }"
        );
    }

    #[test]
    fn test_self_referential_record() {
        let node = node_type();
        assert_eq!(node.kind(), Kind::Struct);
        let next = node.fields()[1].ty();
        assert_eq!(next.kind(), Kind::Ptr);
        assert_eq!(next.elem(), Some(&node));
        assert_eq!(node.field_index("Next"), Some(1));
        assert!(node.is_comparable());
    }

    #[test]
    fn test_comparability() {
        assert!(Type::int().is_comparable());
        assert!(Type::array_of(Type::string(), 2).is_comparable());
        assert!(!Type::slice_of(Type::int()).is_comparable());
        assert!(!Type::array_of(Type::slice_of(Type::int()), 1).is_comparable());
        assert!(!Type::record(vec![Field::new("M", Type::map_of(Type::int(), Type::int()))]).is_comparable());
    }
}
