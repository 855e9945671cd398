//! Bridge between native Rust types and [`Value`].
//!
//! [`Reflect`] describes how a Rust type maps onto the value model:
//! `Box<T>` is a pointer, `Vec<T>` a slice, `[T; N]` an array, `HashMap` and
//! `BTreeMap` maps, and [`Value`] itself the empty interface. Records come
//! from `#[derive(Reflect)]`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use crate::cloner::deep_clone;
use crate::error::{CloneError, CloneResult};
use crate::heap::{Cell, MapKey, MapRef, SliceRef};
use crate::types::Type;
use crate::value::{Data, Value};

/// A Rust type with a runtime [`Type`] and a conversion to and from [`Value`]
pub trait Reflect: Sized {
    /// Runtime type of every value produced by [`to_value`](Self::to_value)
    fn reflect_type() -> Type;

    /// Convert to a dynamic value. Native data is copied into fresh storage;
    /// an embedded [`Value`] keeps its handle (assignment semantics).
    fn to_value(&self) -> Value;

    /// Recover a native value. Fails unless the dynamic type is exactly
    /// [`reflect_type`](Self::reflect_type); an interface is looked through.
    fn from_value(value: &Value) -> CloneResult<Self>;
}

/// Types usable as reflected map keys. Their runtime types are comparable.
pub trait ReflectKey: Reflect {}

/// Deep copy a native value through the value model
pub fn deep_copy<T: Reflect>(value: &T) -> CloneResult<T> {
    T::from_value(&deep_clone(&value.to_value())?)
}

/// Check the dynamic type of `value` against `ty`, looking through interfaces
pub(crate) fn expect_type<'a>(value: &'a Value, ty: &Type) -> CloneResult<&'a Value> {
    let value = value.concrete();
    match value.type_of() {
        Some(found) if found == ty => Ok(value),
        found => Err(CloneError::type_mismatch(ty, found)),
    }
}

fn items_of<T: Reflect>(value: &Value, ty: &Type) -> CloneResult<Vec<T>> {
    let value = expect_type(value, ty)?;
    (0..value.len()?).map(|i| T::from_value(&value.index(i)?)).collect()
}

// ============================================================================
// Scalars
// ============================================================================

impl Reflect for bool {
    fn reflect_type() -> Type {
        Type::bool()
    }

    fn to_value(&self) -> Value {
        Value::bool(*self)
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Type::bool())?;
        value
            .as_bool()
            .ok_or_else(|| CloneError::type_mismatch(&Type::bool(), value.type_of()))
    }
}

impl ReflectKey for bool {}

macro_rules! reflect_signed {
    ($($ty:ty),*) => {$(
        impl Reflect for $ty {
            fn reflect_type() -> Type {
                Type::int()
            }

            #[allow(clippy::unnecessary_cast)]
            fn to_value(&self) -> Value {
                Value::int(*self as i64)
            }

            fn from_value(value: &Value) -> CloneResult<Self> {
                let value = expect_type(value, &Type::int())?;
                let n = value
                    .as_int()
                    .ok_or_else(|| CloneError::type_mismatch(&Type::int(), value.type_of()))?;
                <$ty>::try_from(n).map_err(|_| CloneError::Overflow {
                    value: n.to_string(),
                    target: stringify!($ty),
                })
            }
        }

        impl ReflectKey for $ty {}
    )*};
}

macro_rules! reflect_unsigned {
    ($($ty:ty),*) => {$(
        impl Reflect for $ty {
            fn reflect_type() -> Type {
                Type::uint()
            }

            #[allow(clippy::unnecessary_cast)]
            fn to_value(&self) -> Value {
                Value::uint(*self as u64)
            }

            fn from_value(value: &Value) -> CloneResult<Self> {
                let value = expect_type(value, &Type::uint())?;
                let n = value
                    .as_uint()
                    .ok_or_else(|| CloneError::type_mismatch(&Type::uint(), value.type_of()))?;
                <$ty>::try_from(n).map_err(|_| CloneError::Overflow {
                    value: n.to_string(),
                    target: stringify!($ty),
                })
            }
        }

        impl ReflectKey for $ty {}
    )*};
}

reflect_signed!(i8, i16, i32, i64, isize);
reflect_unsigned!(u8, u16, u32, u64, usize);

impl Reflect for f64 {
    fn reflect_type() -> Type {
        Type::float()
    }

    fn to_value(&self) -> Value {
        Value::float(*self)
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Type::float())?;
        value
            .as_float()
            .ok_or_else(|| CloneError::type_mismatch(&Type::float(), value.type_of()))
    }
}

impl Reflect for f32 {
    fn reflect_type() -> Type {
        Type::float()
    }

    fn to_value(&self) -> Value {
        Value::float(f64::from(*self))
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let x = f64::from_value(value)?;
        if x.is_finite() && x.abs() > f64::from(f32::MAX) {
            return Err(CloneError::Overflow {
                value: x.to_string(),
                target: "f32",
            });
        }
        Ok(x as f32)
    }
}

impl Reflect for String {
    fn reflect_type() -> Type {
        Type::string()
    }

    fn to_value(&self) -> Value {
        Value::string(self)
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Type::string())?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CloneError::type_mismatch(&Type::string(), value.type_of()))
    }
}

impl ReflectKey for String {}

/// The empty interface: any value, including untyped nil
impl Reflect for Value {
    fn reflect_type() -> Type {
        Type::any()
    }

    fn to_value(&self) -> Value {
        Value::any(self.clone())
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        Ok(value.concrete().clone())
    }
}

// ============================================================================
// Pointers
// ============================================================================

thread_local! {
    /// Pointee types currently being rebuilt from a nil pointer
    static ZERO_FILL: RefCell<Vec<Type>> = const { RefCell::new(Vec::new()) };
}

/// `T` read from its zero value. A type that reaches itself again through
/// nil pointers has no finite zero and is reported as a nil dereference.
fn zero_filled<T: Reflect>(pointer: &Type) -> CloneResult<T> {
    let ty = T::reflect_type();
    if ZERO_FILL.with_borrow(|pending| pending.contains(&ty)) {
        return Err(CloneError::NilPointer(pointer.to_string()));
    }
    ZERO_FILL.with_borrow_mut(|pending| pending.push(ty.clone()));
    let result = T::from_value(&Value::zero(&ty));
    ZERO_FILL.with_borrow_mut(|pending| pending.pop());
    result
}

/// A nil pointer reads back as a box holding `T`'s zero value, which is what
/// an unexported pointer field becomes in a deep copy
impl<T: Reflect> Reflect for Box<T> {
    fn reflect_type() -> Type {
        Type::pointer_to(T::reflect_type())
    }

    fn to_value(&self) -> Value {
        Value::from_parts(Self::reflect_type(), Data::Ptr(Some(Cell::new(self.as_ref().to_value()))))
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let ty = Self::reflect_type();
        let value = expect_type(value, &ty)?;
        if value.is_nil() {
            return zero_filled::<T>(&ty).map(Box::new);
        }
        T::from_value(&value.elem()?).map(Box::new)
    }
}

/// `None` is the nil pointer
impl<T: Reflect> Reflect for Option<Box<T>> {
    fn reflect_type() -> Type {
        Box::<T>::reflect_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(boxed) => boxed.to_value(),
            None => Value::zero(&Self::reflect_type()),
        }
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Self::reflect_type())?;
        if value.is_nil() {
            return Ok(None);
        }
        Box::<T>::from_value(value).map(Some)
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// Always an allocated slice; a nil slice reads back as an empty `Vec`
impl<T: Reflect> Reflect for Vec<T> {
    fn reflect_type() -> Type {
        Type::slice_of(T::reflect_type())
    }

    fn to_value(&self) -> Value {
        let items: Vec<Value> = self.iter().map(Reflect::to_value).collect();
        let cap = items.len();
        Value::from_parts(Self::reflect_type(), Data::Slice(Some(SliceRef::new(items, cap))))
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        items_of(value, &Self::reflect_type())
    }
}

/// `None` is the nil slice
impl<T: Reflect> Reflect for Option<Vec<T>> {
    fn reflect_type() -> Type {
        Vec::<T>::reflect_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(items) => items.to_value(),
            None => Value::zero(&Self::reflect_type()),
        }
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Self::reflect_type())?;
        if value.is_nil() {
            return Ok(None);
        }
        Vec::<T>::from_value(value).map(Some)
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn reflect_type() -> Type {
        Type::array_of(T::reflect_type(), N)
    }

    fn to_value(&self) -> Value {
        let items = self.iter().map(Reflect::to_value).collect();
        Value::from_parts(Self::reflect_type(), Data::Array(items))
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let items = items_of::<T>(value, &Self::reflect_type())?;
        let len = items.len();
        items.try_into().map_err(|_| CloneError::TypeMismatch {
            expected: format!("array of length {N}"),
            found: format!("length {len}"),
        })
    }
}

impl<T: ReflectKey, const N: usize> ReflectKey for [T; N] {}

// ============================================================================
// Maps
// ============================================================================

fn map_to_value<'a, K, V>(ty: Type, len: usize, entries: impl Iterator<Item = (&'a K, &'a V)>) -> Value
where
    K: ReflectKey + 'a,
    V: Reflect + 'a,
{
    let map = MapRef::empty(len);
    {
        let mut target = map.write();
        for (key, value) in entries {
            target.insert(MapKey(key.to_value()), value.to_value());
        }
    }
    Value::from_parts(ty, Data::Map(Some(map)))
}

fn map_entries_of<K: ReflectKey, V: Reflect>(value: &Value, ty: &Type) -> CloneResult<Vec<(K, V)>> {
    expect_type(value, ty)?
        .map_entries()?
        .iter()
        .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
        .collect()
}

/// Always an allocated map; a nil map reads back as empty
impl<K, V, S> Reflect for HashMap<K, V, S>
where
    K: ReflectKey + Eq + Hash,
    V: Reflect,
    S: BuildHasher + Default,
{
    fn reflect_type() -> Type {
        Type::map_of(K::reflect_type(), V::reflect_type())
    }

    fn to_value(&self) -> Value {
        map_to_value(Self::reflect_type(), self.len(), self.iter())
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        Ok(map_entries_of::<K, V>(value, &Self::reflect_type())?
            .into_iter()
            .collect())
    }
}

/// `None` is the nil map
impl<K, V, S> Reflect for Option<HashMap<K, V, S>>
where
    K: ReflectKey + Eq + Hash,
    V: Reflect,
    S: BuildHasher + Default,
{
    fn reflect_type() -> Type {
        HashMap::<K, V, S>::reflect_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(map) => map.to_value(),
            None => Value::zero(&Self::reflect_type()),
        }
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        let value = expect_type(value, &Self::reflect_type())?;
        if value.is_nil() {
            return Ok(None);
        }
        HashMap::<K, V, S>::from_value(value).map(Some)
    }
}

/// Entries are inserted in key order
impl<K, V> Reflect for BTreeMap<K, V>
where
    K: ReflectKey + Ord,
    V: Reflect,
{
    fn reflect_type() -> Type {
        Type::map_of(K::reflect_type(), V::reflect_type())
    }

    fn to_value(&self) -> Value {
        map_to_value(Self::reflect_type(), self.len(), self.iter())
    }

    fn from_value(value: &Value) -> CloneResult<Self> {
        Ok(map_entries_of::<K, V>(value, &Self::reflect_type())?
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Kind;

    #[test]
    fn test_integer_range_checks() {
        assert_eq!(u8::from_value(&Value::uint(200)).unwrap(), 200);
        assert_eq!(
            u8::from_value(&Value::uint(300)).unwrap_err(),
            CloneError::Overflow {
                value: "300".to_string(),
                target: "u8",
            }
        );
        assert_eq!(i16::from_value(&Value::int(-5)).unwrap(), -5);
        assert!(matches!(
            i32::from_value(&Value::uint(1)),
            Err(CloneError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_float_range_checks() {
        assert_eq!(f32::from_value(&Value::float(1.5)).unwrap(), 1.5);
        assert!(f32::from_value(&Value::float(f64::INFINITY)).unwrap().is_infinite());
        assert!(f32::from_value(&Value::float(f64::NAN)).unwrap().is_nan());
        assert!(matches!(
            f32::from_value(&Value::float(1e300)),
            Err(CloneError::Overflow { target: "f32", .. })
        ));
        assert!(matches!(
            f32::from_value(&Value::float(-1e39)),
            Err(CloneError::Overflow { .. })
        ));
    }

    #[test]
    fn test_value_keeps_its_handle() {
        let shared = Value::pointer(Value::int(1)).unwrap();
        let value = shared.to_value();
        assert_eq!(value.kind(), Some(Kind::Interface));
        assert!(value.concrete().same_storage(&shared));

        let native = vec![1i64];
        let first = native.to_value();
        assert!(!first.same_storage(&native.to_value()));
    }

    #[test]
    fn test_interface_is_looked_through() {
        let held = Value::any(Value::string("inside"));
        assert_eq!(String::from_value(&held).unwrap(), "inside");
        assert!(!Value::from_value(&Value::any(Value::NIL)).unwrap().is_valid());
    }

    #[test]
    fn test_optional_shapes_map_to_nil() {
        let nil: Option<Vec<i64>> = None;
        let value = nil.to_value();
        assert!(value.is_nil());
        assert_eq!(value.kind(), Some(Kind::Slice));
        assert_eq!(Option::<Vec<i64>>::from_value(&value).unwrap(), None);
        assert_eq!(Vec::<i64>::from_value(&value).unwrap(), Vec::<i64>::new());

        let empty: Option<Vec<i64>> = Some(Vec::new());
        assert_eq!(Option::<Vec<i64>>::from_value(&empty.to_value()).unwrap(), Some(vec![]));

        let nil: Option<Box<u32>> = None;
        assert!(nil.to_value().is_nil());
        assert_eq!(*Box::<u32>::from_value(&nil.to_value()).unwrap(), 0);
        assert_eq!(
            *Box::<Box<String>>::from_value(&Value::zero(&Box::<Box<String>>::reflect_type()))
                .unwrap(),
            Box::new(String::new())
        );
    }

    #[test]
    fn test_boxes_are_pointers() {
        let boxed = Box::new(7i64);
        let value = boxed.to_value();
        assert_eq!(value.type_of(), Some(&Type::pointer_to(Type::int())));
        assert_eq!(value.elem().unwrap().as_int(), Some(7));
        assert_eq!(*Box::<i64>::from_value(&value).unwrap(), 7);
    }

    #[test]
    fn test_arrays_and_maps() {
        let array = ["a".to_string(), "b".to_string()];
        let value = array.to_value();
        assert_eq!(value.type_of(), Some(&Type::array_of(Type::string(), 2)));
        assert_eq!(<[String; 2]>::from_value(&value).unwrap(), array);
        assert!(<[String; 3]>::from_value(&value).is_err());

        let mut map = BTreeMap::new();
        map.insert(2u8, vec![true]);
        map.insert(1u8, vec![]);
        let value = map.to_value();
        assert_eq!(value.len().unwrap(), 2);
        assert_eq!(value.map_entries().unwrap()[0].0.as_uint(), Some(1));
        assert_eq!(BTreeMap::<u8, Vec<bool>>::from_value(&value).unwrap(), map);
    }

    #[test]
    fn test_deep_copy_hash_map() {
        let mut source: HashMap<String, Option<Box<f64>>> = HashMap::new();
        source.insert("pi".to_string(), Some(Box::new(2.5)));
        source.insert("none".to_string(), None);

        let copy = deep_copy(&source).unwrap();
        assert_eq!(copy, source);
    }
}
