//! Runtime-typed values
//!
//! A [`Value`] is either untyped nil or a [`Type`] paired with data of the
//! matching shape. Cloning a `Value` handle behaves like assignment: scalars,
//! arrays and records are copied, while pointer cells, slice backing stores,
//! maps and channels stay shared. [`deep_clone`](crate::deep_clone) is what
//! breaks that sharing.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{CloneError, CloneResult};
use crate::heap::{Cell, ChanRef, FuncRef, MapKey, MapRef, OpaqueRef, SliceRef};
use crate::types::{Kind, Type};

/// Shape-specific payload. `None` in a nilable variant is that type's nil.
#[derive(Clone)]
pub(crate) enum Data {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(Arc<str>),
    Func(Option<FuncRef>),
    Opaque(Option<OpaqueRef>),
    Ptr(Option<Cell>),
    Slice(Option<SliceRef>),
    Array(Vec<Value>),
    Map(Option<MapRef>),
    Struct(Vec<Value>),
    Interface(Option<Box<Value>>),
    Chan(Option<ChanRef>),
}

/// A dynamically typed value
#[derive(Clone, Default)]
pub struct Value(Option<(Type, Data)>);

static NIL: Value = Value(None);

impl Value {
    /// Untyped nil: no type information at all
    pub const NIL: Value = Value(None);

    pub(crate) fn from_parts(ty: Type, data: Data) -> Self {
        Self(Some((ty, data)))
    }

    pub(crate) fn parts(&self) -> Option<(&Type, &Data)> {
        self.0.as_ref().map(|(ty, data)| (ty, data))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// `bool` value
    pub fn bool(b: bool) -> Self {
        Self::from_parts(Type::bool(), Data::Bool(b))
    }

    /// `int` value
    pub fn int(n: i64) -> Self {
        Self::from_parts(Type::int(), Data::Int(n))
    }

    /// `uint` value
    pub fn uint(n: u64) -> Self {
        Self::from_parts(Type::uint(), Data::Uint(n))
    }

    /// `float` value
    pub fn float(x: f64) -> Self {
        Self::from_parts(Type::float(), Data::Float(x))
    }

    /// `string` value
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::from_parts(Type::string(), Data::String(Arc::from(s.as_ref())))
    }

    /// `func` value wrapping a native closure
    pub fn func(f: impl Fn(&[Value]) -> CloneResult<Value> + Send + Sync + 'static) -> Self {
        Self::from_parts(Type::func(), Data::Func(Some(FuncRef(Arc::new(f)))))
    }

    /// `opaque` value wrapping a host object
    pub fn opaque<T: Any + Send + Sync>(object: T) -> Self {
        Self::from_parts(Type::opaque(), Data::Opaque(Some(OpaqueRef(Arc::new(object)))))
    }

    /// Zero value of `ty`: nil for nilable types, zero scalars, and
    /// element-wise zero for arrays and records
    pub fn zero(ty: &Type) -> Self {
        let data = match ty.kind() {
            Kind::Bool => Data::Bool(false),
            Kind::Int => Data::Int(0),
            Kind::Uint => Data::Uint(0),
            Kind::Float => Data::Float(0.0),
            Kind::String => Data::String(Arc::from("")),
            Kind::Func => Data::Func(None),
            Kind::Opaque => Data::Opaque(None),
            Kind::Ptr => Data::Ptr(None),
            Kind::Slice => Data::Slice(None),
            Kind::Map => Data::Map(None),
            Kind::Interface => Data::Interface(None),
            Kind::Chan => Data::Chan(None),
            Kind::Array => {
                let len = ty.array_len().unwrap_or(0);
                let items = match ty.elem() {
                    Some(elem) => (0..len).map(|_| Value::zero(elem)).collect(),
                    None => Vec::new(),
                };
                Data::Array(items)
            }
            Kind::Struct => Data::Struct(ty.fields().iter().map(|f| Value::zero(&f.ty())).collect()),
        };
        Self::from_parts(ty.clone(), data)
    }

    /// Pointer to a fresh cell holding the zero value of `ty`
    pub fn new(ty: &Type) -> Self {
        Self::from_parts(
            Type::pointer_to(ty.clone()),
            Data::Ptr(Some(Cell::new(Value::zero(ty)))),
        )
    }

    /// Pointer to a fresh cell holding `value`
    pub fn pointer(value: Value) -> CloneResult<Self> {
        let ty = value
            .type_of()
            .cloned()
            .ok_or_else(|| CloneError::unsupported("taking a pointer", None))?;
        Ok(Self::from_parts(
            Type::pointer_to(ty),
            Data::Ptr(Some(Cell::new(value))),
        ))
    }

    /// Slice of `elem` with length and capacity `items.len()`
    pub fn slice(elem: &Type, items: Vec<Value>) -> CloneResult<Self> {
        let items = items
            .into_iter()
            .map(|item| coerce(item, elem))
            .collect::<CloneResult<Vec<_>>>()?;
        let cap = items.len();
        Ok(Self::from_parts(
            Type::slice_of(elem.clone()),
            Data::Slice(Some(SliceRef::new(items, cap))),
        ))
    }

    /// Allocated slice of type `ty` holding `len` zero elements
    pub fn make_slice(ty: &Type, len: usize, cap: usize) -> CloneResult<Self> {
        let elem = elem_of(ty, Kind::Slice)?;
        if len > cap {
            return Err(CloneError::InvalidSliceBounds { len, cap });
        }
        let items = (0..len).map(|_| Value::zero(elem)).collect();
        Ok(Self::from_parts(ty.clone(), Data::Slice(Some(SliceRef::new(items, cap)))))
    }

    /// Array of `elem` whose length is `items.len()`
    pub fn array(elem: &Type, items: Vec<Value>) -> CloneResult<Self> {
        let items = items
            .into_iter()
            .map(|item| coerce(item, elem))
            .collect::<CloneResult<Vec<_>>>()?;
        Ok(Self::from_parts(
            Type::array_of(elem.clone(), items.len()),
            Data::Array(items),
        ))
    }

    /// Allocated, empty map of type `ty`
    pub fn make_map(ty: &Type) -> CloneResult<Self> {
        if ty.kind() != Kind::Map {
            return Err(CloneError::kind_mismatch(Kind::Map, Some(ty)));
        }
        Ok(Self::from_parts(ty.clone(), Data::Map(Some(MapRef::empty(0)))))
    }

    /// `map[key]value` holding `entries`
    pub fn map(key: &Type, value: &Type, entries: Vec<(Value, Value)>) -> CloneResult<Self> {
        let map = Self::make_map(&Type::map_of(key.clone(), value.clone()))?;
        for (k, v) in entries {
            map.map_insert(k, v)?;
        }
        Ok(map)
    }

    /// Record of type `ty` with one value per declared field, in order
    pub fn record(ty: &Type, fields: Vec<Value>) -> CloneResult<Self> {
        if ty.kind() != Kind::Struct {
            return Err(CloneError::kind_mismatch(Kind::Struct, Some(ty)));
        }
        let defs = ty.fields();
        if defs.len() != fields.len() {
            return Err(CloneError::TypeMismatch {
                expected: format!("{} fields for {ty}", defs.len()),
                found: format!("{} values", fields.len()),
            });
        }
        let fields = defs
            .iter()
            .zip(fields)
            .map(|(def, value)| coerce(value, &def.ty()))
            .collect::<CloneResult<Vec<_>>>()?;
        Ok(Self::from_parts(ty.clone(), Data::Struct(fields)))
    }

    /// Record built without type checks. Used by `#[derive(Reflect)]`, whose
    /// field values already carry the declared field types.
    #[doc(hidden)]
    pub fn from_record_parts(ty: Type, fields: Vec<Value>) -> Self {
        Self::from_parts(ty, Data::Struct(fields))
    }

    /// Value of interface type `ty` holding `held`.
    ///
    /// Holding another interface value stores its content, never the wrapper.
    pub fn interface(ty: &Type, held: Value) -> CloneResult<Self> {
        if ty.kind() != Kind::Interface {
            return Err(CloneError::kind_mismatch(Kind::Interface, Some(ty)));
        }
        Ok(wrap(ty.clone(), held))
    }

    /// Value of the empty interface type holding `held`
    pub fn any(held: Value) -> Self {
        wrap(Type::any(), held)
    }

    /// Channel of type `ty` with buffer capacity `cap`
    pub fn make_chan(ty: &Type, cap: usize) -> CloneResult<Self> {
        if ty.kind() != Kind::Chan {
            return Err(CloneError::kind_mismatch(Kind::Chan, Some(ty)));
        }
        Ok(Self::from_parts(ty.clone(), Data::Chan(Some(ChanRef::new(cap)))))
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Runtime type; `None` for untyped nil
    pub fn type_of(&self) -> Option<&Type> {
        self.0.as_ref().map(|(ty, _)| ty)
    }

    /// Structural kind; `None` for untyped nil
    pub fn kind(&self) -> Option<Kind> {
        self.type_of().map(Type::kind)
    }

    /// Whether the value carries type information
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Untyped nil, or the nil form of a nilable type
    pub fn is_nil(&self) -> bool {
        match self.parts() {
            None => true,
            Some((_, data)) => matches!(
                data,
                Data::Func(None)
                    | Data::Opaque(None)
                    | Data::Ptr(None)
                    | Data::Slice(None)
                    | Data::Map(None)
                    | Data::Interface(None)
                    | Data::Chan(None)
            ),
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self.parts() {
            Some((_, Data::Bool(b))) => Some(*b),
            _ => None,
        }
    }

    /// Signed integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self.parts() {
            Some((_, Data::Int(n))) => Some(*n),
            _ => None,
        }
    }

    /// Unsigned integer payload
    pub fn as_uint(&self) -> Option<u64> {
        match self.parts() {
            Some((_, Data::Uint(n))) => Some(*n),
            _ => None,
        }
    }

    /// Floating point payload
    pub fn as_float(&self) -> Option<f64> {
        match self.parts() {
            Some((_, Data::Float(x))) => Some(*x),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self.parts() {
            Some((_, Data::String(s))) => Some(s),
            _ => None,
        }
    }

    /// The value held by an interface, or `self` for any other value.
    /// An empty interface yields untyped nil.
    pub fn concrete(&self) -> &Value {
        match self.parts() {
            Some((_, Data::Interface(Some(held)))) => held,
            Some((_, Data::Interface(None))) => &NIL,
            _ => self,
        }
    }

    /// Length of a slice, array, map, string or channel queue
    pub fn len(&self) -> CloneResult<usize> {
        match self.parts() {
            Some((_, Data::Slice(slice))) => Ok(slice.as_ref().map_or(0, |s| s.read().items.len())),
            Some((_, Data::Array(items))) => Ok(items.len()),
            Some((_, Data::Map(map))) => Ok(map.as_ref().map_or(0, |m| m.read().len())),
            Some((_, Data::String(s))) => Ok(s.len()),
            Some((_, Data::Chan(chan))) => Ok(chan.as_ref().map_or(0, ChanRef::len)),
            other => Err(CloneError::unsupported("len", other.map(|(ty, _)| ty))),
        }
    }

    /// Whether [`len`](Self::len) is zero
    pub fn is_empty(&self) -> CloneResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Capacity of a slice or channel; length of an array
    pub fn cap(&self) -> CloneResult<usize> {
        match self.parts() {
            Some((_, Data::Slice(slice))) => Ok(slice.as_ref().map_or(0, |s| s.read().cap)),
            Some((_, Data::Array(items))) => Ok(items.len()),
            Some((_, Data::Chan(chan))) => Ok(chan.as_ref().map_or(0, ChanRef::cap)),
            other => Err(CloneError::unsupported("cap", other.map(|(ty, _)| ty))),
        }
    }

    /// Element `index` of a slice or array
    pub fn index(&self, index: usize) -> CloneResult<Value> {
        match self.parts() {
            Some((_, Data::Array(items))) => items
                .get(index)
                .cloned()
                .ok_or(CloneError::IndexOutOfRange { index, len: items.len() }),
            Some((_, Data::Slice(Some(slice)))) => {
                let buf = slice.read();
                buf.items
                    .get(index)
                    .cloned()
                    .ok_or(CloneError::IndexOutOfRange { index, len: buf.items.len() })
            }
            Some((_, Data::Slice(None))) => Err(CloneError::IndexOutOfRange { index, len: 0 }),
            other => Err(CloneError::unsupported("index", other.map(|(ty, _)| ty))),
        }
    }

    /// Field `name` of a record
    pub fn field(&self, name: &str) -> CloneResult<Value> {
        let index = self.field_position(name)?;
        self.field_at(index)
    }

    /// Field at declaration position `index` of a record
    pub fn field_at(&self, index: usize) -> CloneResult<Value> {
        match self.parts() {
            Some((_, Data::Struct(fields))) => fields
                .get(index)
                .cloned()
                .ok_or(CloneError::IndexOutOfRange { index, len: fields.len() }),
            other => Err(CloneError::unsupported("field access", other.map(|(ty, _)| ty))),
        }
    }

    fn field_position(&self, name: &str) -> CloneResult<usize> {
        match self.type_of() {
            Some(ty) if ty.kind() == Kind::Struct => {
                ty.field_index(name).ok_or_else(|| CloneError::NoSuchField {
                    type_name: ty.to_string(),
                    field: name.to_string(),
                })
            }
            ty => Err(CloneError::unsupported("field access", ty)),
        }
    }

    /// Pointee of a pointer, or the value held by an interface.
    ///
    /// A nil pointer is an error; an empty interface yields untyped nil.
    pub fn elem(&self) -> CloneResult<Value> {
        match self.parts() {
            Some((_, Data::Ptr(Some(cell)))) => Ok(cell.get()),
            Some((ty, Data::Ptr(None))) => Err(CloneError::NilPointer(ty.to_string())),
            Some((_, Data::Interface(held))) => {
                Ok(held.as_deref().cloned().unwrap_or_default())
            }
            other => Err(CloneError::unsupported("elem", other.map(|(ty, _)| ty))),
        }
    }

    /// Look up `key` in a map. A nil map holds nothing.
    pub fn map_get(&self, key: &Value) -> CloneResult<Option<Value>> {
        match self.parts() {
            Some((ty, Data::Map(map))) => {
                let key = coerce(key.clone(), key_of(ty)?)?;
                Ok(map.as_ref().and_then(|m| m.read().get(&MapKey(key)).cloned()))
            }
            other => Err(CloneError::unsupported("map lookup", other.map(|(ty, _)| ty))),
        }
    }

    /// All entries of a map, in insertion order
    pub fn map_entries(&self) -> CloneResult<Vec<(Value, Value)>> {
        match self.parts() {
            Some((_, Data::Map(map))) => Ok(map.as_ref().map_or_else(Vec::new, |m| {
                m.read()
                    .iter()
                    .map(|(k, v)| (k.0.clone(), v.clone()))
                    .collect()
            })),
            other => Err(CloneError::unsupported("map iteration", other.map(|(ty, _)| ty))),
        }
    }

    /// Call a function value
    pub fn call(&self, args: &[Value]) -> CloneResult<Value> {
        match self.parts() {
            Some((_, Data::Func(Some(func)))) => (func.0)(args),
            Some((ty, Data::Func(None))) => Err(CloneError::NilPointer(ty.to_string())),
            other => Err(CloneError::unsupported("call", other.map(|(ty, _)| ty))),
        }
    }

    /// Host object behind an opaque value, if it has type `T`
    pub fn downcast_opaque<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self.parts() {
            Some((_, Data::Opaque(Some(object)))) => object.0.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Identity of the shared storage behind a pointer, slice, map, channel,
    /// function or opaque value
    pub fn storage_addr(&self) -> Option<usize> {
        match self.parts()? {
            (_, Data::Ptr(cell)) => cell.as_ref().map(Cell::addr),
            (_, Data::Slice(slice)) => slice.as_ref().map(SliceRef::addr),
            (_, Data::Map(map)) => map.as_ref().map(MapRef::addr),
            (_, Data::Chan(chan)) => chan.as_ref().map(ChanRef::addr),
            (_, Data::Func(func)) => func.as_ref().map(|f| Arc::as_ptr(&f.0) as *const () as usize),
            (_, Data::Opaque(object)) => {
                object.as_ref().map(|o| Arc::as_ptr(&o.0) as *const () as usize)
            }
            (_, Data::Interface(Some(held))) => held.storage_addr(),
            _ => None,
        }
    }

    /// Whether both values refer to the same shared storage
    pub fn same_storage(&self, other: &Value) -> bool {
        match (self.storage_addr(), other.storage_addr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Replace element `index` of a slice or array.
    ///
    /// Slices write through to the shared backing store.
    pub fn set_index(&mut self, index: usize, value: Value) -> CloneResult<()> {
        match &mut self.0 {
            Some((ty, Data::Array(items))) => {
                let value = coerce(value, elem_of(ty, Kind::Array)?)?;
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or(CloneError::IndexOutOfRange { index, len })?;
                *slot = value;
                Ok(())
            }
            Some((ty, Data::Slice(Some(slice)))) => {
                let value = coerce(value, elem_of(ty, Kind::Slice)?)?;
                let mut buf = slice.write();
                let len = buf.items.len();
                let slot = buf
                    .items
                    .get_mut(index)
                    .ok_or(CloneError::IndexOutOfRange { index, len })?;
                *slot = value;
                Ok(())
            }
            Some((_, Data::Slice(None))) => Err(CloneError::IndexOutOfRange { index, len: 0 }),
            other => Err(CloneError::unsupported(
                "index assignment",
                other.as_ref().map(|(ty, _)| ty),
            )),
        }
    }

    /// Assign field `name` of a record. Unexported fields are rejected.
    pub fn set_field(&mut self, name: &str, value: Value) -> CloneResult<()> {
        let index = self.field_position(name)?;
        match &mut self.0 {
            Some((ty, Data::Struct(fields))) => {
                let def = &ty.fields()[index];
                if !def.is_exported() {
                    return Err(CloneError::UnexportedField {
                        type_name: ty.to_string(),
                        field: name.to_string(),
                    });
                }
                fields[index] = coerce(value, &def.ty())?;
                Ok(())
            }
            other => Err(CloneError::unsupported(
                "field assignment",
                other.as_ref().map(|(ty, _)| ty),
            )),
        }
    }

    /// Store `value` into the cell a pointer refers to
    pub fn set_elem(&self, value: Value) -> CloneResult<()> {
        match self.parts() {
            Some((ty, Data::Ptr(Some(cell)))) => {
                cell.set(coerce(value, elem_of(ty, Kind::Ptr)?)?);
                Ok(())
            }
            Some((ty, Data::Ptr(None))) => Err(CloneError::NilPointer(ty.to_string())),
            other => Err(CloneError::unsupported("elem assignment", other.map(|(ty, _)| ty))),
        }
    }

    /// Modify the pointee of a pointer in place.
    ///
    /// `f` works on a copy that is written back when it returns `Ok`, so it
    /// may freely read other values, including this pointer.
    pub fn update_elem<R>(&self, f: impl FnOnce(&mut Value) -> CloneResult<R>) -> CloneResult<R> {
        match self.parts() {
            Some((ty, Data::Ptr(Some(cell)))) => {
                let mut pointee = cell.get();
                let out = f(&mut pointee)?;
                cell.set(coerce(pointee, elem_of(ty, Kind::Ptr)?)?);
                Ok(out)
            }
            Some((ty, Data::Ptr(None))) => Err(CloneError::NilPointer(ty.to_string())),
            other => Err(CloneError::unsupported("elem update", other.map(|(ty, _)| ty))),
        }
    }

    /// Insert or replace `key` in a map
    pub fn map_insert(&self, key: Value, value: Value) -> CloneResult<()> {
        match self.parts() {
            Some((ty, Data::Map(Some(map)))) => {
                let key = coerce(key, key_of(ty)?)?;
                if !MapKey::is_hashable(&key) {
                    let found = key.concrete().type_of().map_or_else(|| "nil".to_string(), Type::to_string);
                    return Err(CloneError::UnhashableKey(found));
                }
                let value = coerce(value, elem_of(ty, Kind::Map)?)?;
                map.write().insert(MapKey(key), value);
                Ok(())
            }
            Some((ty, Data::Map(None))) => Err(CloneError::NilPointer(ty.to_string())),
            other => Err(CloneError::unsupported("map insertion", other.map(|(ty, _)| ty))),
        }
    }

    /// Remove `key` from a map, returning its value
    pub fn map_remove(&self, key: &Value) -> CloneResult<Option<Value>> {
        match self.parts() {
            Some((ty, Data::Map(map))) => {
                let key = coerce(key.clone(), key_of(ty)?)?;
                Ok(map.as_ref().and_then(|m| m.write().shift_remove(&MapKey(key))))
            }
            other => Err(CloneError::unsupported("map removal", other.map(|(ty, _)| ty))),
        }
    }

    /// Queue `value` on a channel without blocking
    pub fn try_send(&self, value: Value) -> CloneResult<()> {
        match self.parts() {
            Some((ty, Data::Chan(Some(chan)))) => {
                let value = coerce(value, elem_of(ty, Kind::Chan)?)?;
                if chan.try_send(value) {
                    Ok(())
                } else {
                    Err(CloneError::ChannelFull(ty.to_string()))
                }
            }
            Some((ty, Data::Chan(None))) => Err(CloneError::NilPointer(ty.to_string())),
            other => Err(CloneError::unsupported("send", other.map(|(ty, _)| ty))),
        }
    }

    /// Take the next queued message from a channel without blocking
    pub fn try_recv(&self) -> CloneResult<Option<Value>> {
        match self.parts() {
            Some((_, Data::Chan(chan))) => Ok(chan.as_ref().and_then(ChanRef::try_recv)),
            other => Err(CloneError::unsupported("receive", other.map(|(ty, _)| ty))),
        }
    }

    /// Convert to `ty`.
    ///
    /// Allowed between types sharing an underlying representation, between
    /// numeric kinds, into any interface type, and from untyped nil into a
    /// nilable type.
    pub fn convert(&self, ty: &Type) -> CloneResult<Value> {
        let Some((from, data)) = self.parts() else {
            if ty.is_nilable() {
                return Ok(Value::zero(ty));
            }
            return Err(CloneError::Conversion {
                from: "nil".to_string(),
                to: ty.to_string(),
            });
        };
        if from == ty {
            return Ok(self.clone());
        }
        if ty.kind() == Kind::Interface {
            return Ok(wrap(ty.clone(), self.clone()));
        }
        if from.same_underlying(ty) {
            return Ok(Self::from_parts(ty.clone(), data.clone()));
        }
        let converted = match (data, ty.kind()) {
            (Data::Int(n), Kind::Uint) => Data::Uint(*n as u64),
            (Data::Int(n), Kind::Float) => Data::Float(*n as f64),
            (Data::Uint(n), Kind::Int) => Data::Int(*n as i64),
            (Data::Uint(n), Kind::Float) => Data::Float(*n as f64),
            (Data::Float(x), Kind::Int) => Data::Int(*x as i64),
            (Data::Float(x), Kind::Uint) => Data::Uint(*x as u64),
            (Data::Int(n), Kind::Int) => Data::Int(*n),
            (Data::Uint(n), Kind::Uint) => Data::Uint(*n),
            (Data::Float(x), Kind::Float) => Data::Float(*x),
            _ => {
                return Err(CloneError::Conversion {
                    from: from.to_string(),
                    to: ty.to_string(),
                });
            }
        };
        Ok(Self::from_parts(ty.clone(), converted))
    }
}

/// Make `value` assignable to a slot of type `ty`: exact type match, untyped
/// nil into a nilable slot, or any value into an interface slot.
pub(crate) fn coerce(value: Value, ty: &Type) -> CloneResult<Value> {
    match value.type_of().map(|found| found == ty) {
        None if ty.is_nilable() => Ok(Value::zero(ty)),
        Some(true) => Ok(value),
        Some(false) if ty.kind() == Kind::Interface => Ok(wrap(ty.clone(), value)),
        _ => Err(CloneError::type_mismatch(ty, value.type_of())),
    }
}

fn wrap(ty: Type, held: Value) -> Value {
    let held = match held.0 {
        None => None,
        Some((_, Data::Interface(inner))) => inner,
        Some((held_ty, data)) => Some(Box::new(Value::from_parts(held_ty, data))),
    };
    Value::from_parts(ty, Data::Interface(held))
}

fn elem_of(ty: &Type, kind: Kind) -> CloneResult<&Type> {
    match ty.elem() {
        Some(elem) if ty.kind() == kind => Ok(elem),
        _ => Err(CloneError::kind_mismatch(kind, Some(ty))),
    }
}

fn key_of(ty: &Type) -> CloneResult<&Type> {
    ty.key().ok_or_else(|| CloneError::kind_mismatch(Kind::Map, Some(ty)))
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::uint(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

// Nesting past this depth prints as an ellipsis, which also bounds output
// for cyclic graphs.
const DEBUG_DEPTH: usize = 16;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self, f, 0)
    }
}

fn write_value(value: &Value, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let Some((ty, data)) = value.parts() else {
        return f.write_str("nil");
    };
    if depth > DEBUG_DEPTH {
        return f.write_str("...");
    }
    match data {
        Data::Bool(b) => write!(f, "{b}"),
        Data::Int(n) => write!(f, "{n}"),
        Data::Uint(n) => write!(f, "{n}"),
        Data::Float(x) => write!(f, "{x:?}"),
        Data::String(s) => write!(f, "{:?}", &**s),
        Data::Func(None)
        | Data::Opaque(None)
        | Data::Ptr(None)
        | Data::Slice(None)
        | Data::Map(None)
        | Data::Interface(None)
        | Data::Chan(None) => write!(f, "{ty}(nil)"),
        Data::Func(Some(func)) => write!(f, "{func:?}"),
        Data::Opaque(Some(object)) => write!(f, "{object:?}"),
        Data::Chan(Some(chan)) => write!(f, "{ty}({:#x}, cap {})", chan.addr(), chan.cap()),
        Data::Interface(Some(held)) => write_value(held, f, depth),
        Data::Ptr(Some(cell)) => {
            f.write_str("&")?;
            write_value(&cell.read(), f, depth + 1)
        }
        Data::Slice(Some(slice)) => {
            write!(f, "{ty}")?;
            write_items(&slice.read().items, f, depth)
        }
        Data::Array(items) => {
            write!(f, "{ty}")?;
            write_items(items, f, depth)
        }
        Data::Map(Some(map)) => {
            write!(f, "{ty}{{")?;
            for (i, (key, value)) in map.read().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_value(&key.0, f, depth + 1)?;
                f.write_str(": ")?;
                write_value(value, f, depth + 1)?;
            }
            f.write_str("}")
        }
        Data::Struct(fields) => {
            write!(f, "{ty}{{")?;
            for (i, (def, value)) in ty.fields().iter().zip(fields).enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: ", def.name())?;
                write_value(value, f, depth + 1)?;
            }
            f.write_str("}")
        }
    }
}

fn write_items(items: &[Value], f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    f.write_str("{")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_value(item, f, depth + 1)?;
    }
    f.write_str("}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn address_type() -> Type {
        Type::named(
            "Address",
            Type::record(vec![
                Field::new("Street", Type::string()),
                Field::new("City", Type::string()),
                Field::new("zip", Type::string()).private(),
            ]),
        )
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(Value::zero(&Type::int()).as_int(), Some(0));
        assert_eq!(Value::zero(&Type::string()).as_str(), Some(""));
        assert!(Value::zero(&Type::slice_of(Type::int())).is_nil());
        assert!(Value::zero(&Type::pointer_to(Type::int())).is_nil());

        let addr = Value::zero(&address_type());
        assert_eq!(addr.field("Street").unwrap().as_str(), Some(""));

        let arr = Value::zero(&Type::array_of(Type::bool(), 2));
        assert_eq!(arr.len().unwrap(), 2);
        assert_eq!(arr.index(1).unwrap().as_bool(), Some(false));
    }

    #[test]
    fn test_handle_clone_shares_reference_storage() {
        let mut slice = Value::slice(&Type::int(), vec![Value::int(1), Value::int(2)]).unwrap();
        let alias = slice.clone();
        slice.set_index(0, Value::int(10)).unwrap();
        assert_eq!(alias.index(0).unwrap().as_int(), Some(10));
        assert!(slice.same_storage(&alias));

        let mut arr = Value::array(&Type::int(), vec![Value::int(1)]).unwrap();
        let copy = arr.clone();
        arr.set_index(0, Value::int(10)).unwrap();
        assert_eq!(copy.index(0).unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_set_field_checks_type_and_visibility() {
        let mut addr = Value::zero(&address_type());
        addr.set_field("Street", Value::string("Jl. Braga")).unwrap();
        assert_eq!(addr.field("Street").unwrap().as_str(), Some("Jl. Braga"));

        assert!(matches!(
            addr.set_field("Street", Value::int(1)),
            Err(CloneError::TypeMismatch { .. })
        ));
        assert!(matches!(
            addr.set_field("zip", Value::string("40111")),
            Err(CloneError::UnexportedField { .. })
        ));
        assert!(matches!(
            addr.set_field("Country", Value::string("ID")),
            Err(CloneError::NoSuchField { .. })
        ));
    }

    #[test]
    fn test_make_slice_respects_bounds() {
        let ty = Type::slice_of(Type::string());
        let s = Value::make_slice(&ty, 2, 5).unwrap();
        assert_eq!(s.len().unwrap(), 2);
        assert_eq!(s.cap().unwrap(), 5);
        assert!(!s.is_nil());
        assert_eq!(
            Value::make_slice(&ty, 3, 1).unwrap_err(),
            CloneError::InvalidSliceBounds { len: 3, cap: 1 }
        );
    }

    #[test]
    fn test_interface_flattens_nested_wrappers() {
        let inner = Value::any(Value::int(7));
        let outer = Value::any(inner);
        assert_eq!(outer.kind(), Some(Kind::Interface));
        assert_eq!(outer.elem().unwrap().kind(), Some(Kind::Int));
        assert_eq!(outer.concrete().as_int(), Some(7));
        assert!(!Value::any(Value::NIL).concrete().is_valid());
    }

    #[test]
    fn test_map_keys() {
        let m = Value::make_map(&Type::map_of(Type::any(), Type::int())).unwrap();
        m.map_insert(Value::string("a"), Value::int(1)).unwrap();
        m.map_insert(Value::int(1), Value::int(2)).unwrap();
        assert_eq!(m.map_get(&Value::string("a")).unwrap().unwrap().as_int(), Some(1));
        assert_eq!(m.map_get(&Value::int(1)).unwrap().unwrap().as_int(), Some(2));
        assert!(m.map_get(&Value::uint(1)).unwrap().is_none());

        let unhashable = Value::slice(&Type::int(), vec![]).unwrap();
        assert!(matches!(
            m.map_insert(unhashable, Value::int(3)),
            Err(CloneError::UnhashableKey(_))
        ));

        let nil_map = Value::zero(&Type::map_of(Type::string(), Type::int()));
        assert!(nil_map.map_get(&Value::string("a")).unwrap().is_none());
        assert!(matches!(
            nil_map.map_insert(Value::string("a"), Value::int(1)),
            Err(CloneError::NilPointer(_))
        ));
    }

    #[test]
    fn test_pointer_update() {
        let p = Value::new(&address_type());
        p.update_elem(|addr| addr.set_field("City", Value::string("Bandung"))).unwrap();
        assert_eq!(p.elem().unwrap().field("City").unwrap().as_str(), Some("Bandung"));

        let nil = Value::zero(&Type::pointer_to(address_type()));
        assert!(matches!(nil.elem(), Err(CloneError::NilPointer(_))));
    }

    #[test]
    fn test_channel_buffer() {
        let ch = Value::make_chan(&Type::chan_of(Type::int()), 1).unwrap();
        ch.try_send(Value::int(1)).unwrap();
        assert!(matches!(ch.try_send(Value::int(2)), Err(CloneError::ChannelFull(_))));
        assert_eq!(ch.len().unwrap(), 1);
        assert_eq!(ch.try_recv().unwrap().unwrap().as_int(), Some(1));
        assert!(ch.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_convert() {
        let celsius = Type::named("Celsius", Type::float());
        let c = Value::float(21.5).convert(&celsius).unwrap();
        assert_eq!(c.type_of(), Some(&celsius));
        assert_eq!(c.as_float(), Some(21.5));
        assert_eq!(Value::int(3).convert(&Type::float()).unwrap().as_float(), Some(3.0));
        assert!(Value::string("x").convert(&Type::int()).is_err());
        assert!(Value::NIL.convert(&Type::pointer_to(Type::int())).unwrap().is_nil());
    }

    #[test]
    fn test_debug_output() {
        let mut addr = Value::zero(&address_type());
        addr.set_field("City", Value::string("Bandung")).unwrap();
        assert_eq!(
            format!("{addr:?}"),
            r#"Address{Street: "", City: "Bandung", zip: ""}"#
        );
        assert_eq!(format!("{:?}", Value::NIL), "nil");
        assert_eq!(
            format!("{:?}", Value::zero(&Type::slice_of(Type::int()))),
            "[]int(nil)"
        );
    }
}
