//! Deep Clone Algorithm
//!
//! Rebuilds a value graph so that the copy shares no mutable storage with
//! the source.
//!
//! Per shape:
//! - Scalars, functions and opaque handles are returned as-is
//! - Nil pointers, slices, maps, interfaces and channels stay nil and keep their type
//! - Pointers get a new cell holding a clone of the pointee
//! - Slices get a new backing store with the same length and capacity
//! - Maps are rebuilt entry by entry, cloning keys and values
//! - Records are rebuilt field by field; unexported fields stay zero
//! - Interfaces rewrap a clone of the held value
//! - Channels are recreated empty with the same capacity
//!
//! Without [`CloneConfig::preserve_aliasing`] there is no identity tracking:
//! a cyclic graph recurses until the depth limit (or the stack) runs out.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::{CloneConfig, FieldPolicy};
use crate::error::{CloneError, CloneResult};
use crate::heap::{Cell, ChanRef, MapKey, MapRef, SliceRef};
use crate::types::Type;
use crate::value::{Data, Value};

/// Performs the deep clone algorithm
#[derive(Debug, Default)]
pub struct DeepCloner {
    config: CloneConfig,
    depth: usize,
    /// Map from source storage address to its copy (aliasing mode only)
    memory: FxHashMap<usize, Value>,
}

impl DeepCloner {
    /// Create a new cloner
    pub fn new(config: CloneConfig) -> Self {
        Self {
            config,
            depth: 0,
            memory: FxHashMap::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Clone a value. The first error aborts the whole clone.
    pub fn clone_value(&mut self, value: &Value) -> CloneResult<Value> {
        self.depth = 0;
        self.memory.clear();
        let result = self.internal_clone(value);
        self.memory.clear();
        match &result {
            Ok(_) => trace!(kind = ?value.kind(), "deep clone complete"),
            Err(err) => debug!(kind = ?value.kind(), error = %err, "deep clone aborted"),
        }
        result
    }

    fn internal_clone(&mut self, value: &Value) -> CloneResult<Value> {
        // Untyped nil has nothing to copy
        let Some((ty, data)) = value.parts() else {
            return Ok(Value::NIL);
        };

        match self.config.max_depth {
            Some(limit) if self.depth >= limit => {
                return Err(CloneError::DepthExceeded { limit });
            }
            _ => {}
        }

        self.depth += 1;
        let result = match data {
            Data::Ptr(Some(cell)) => self.clone_pointer(ty, cell),
            Data::Slice(Some(slice)) => self.clone_slice(ty, slice),
            Data::Map(Some(map)) => self.clone_map(ty, map),
            Data::Chan(Some(chan)) => Ok(self.clone_chan(ty, chan)),
            Data::Struct(fields) => self.clone_record(ty, fields),
            Data::Array(items) => self.clone_array(ty, items),
            Data::Interface(Some(held)) => self.internal_clone(held).map(|copy| {
                Value::from_parts(ty.clone(), Data::Interface(Some(Box::new(copy))))
            }),

            // Nil reference shapes: zero of the exact same type, so a nil
            // slice never turns into an empty one
            Data::Ptr(None)
            | Data::Slice(None)
            | Data::Map(None)
            | Data::Chan(None)
            | Data::Interface(None) => Ok(Value::zero(ty)),

            // Scalars are values; functions and opaque handles pass through
            Data::Bool(_)
            | Data::Int(_)
            | Data::Uint(_)
            | Data::Float(_)
            | Data::String(_)
            | Data::Func(_)
            | Data::Opaque(_) => Ok(value.clone()),
        };
        self.depth -= 1;
        result
    }

    fn recall(&self, addr: usize, ty: &Type) -> Option<Value> {
        if !self.config.preserve_aliasing {
            return None;
        }
        let copy = self.memory.get(&addr)?;
        match copy.parts() {
            // Same storage reached through a differently named type
            Some((seen, data)) if seen != ty => Some(Value::from_parts(ty.clone(), data.clone())),
            _ => Some(copy.clone()),
        }
    }

    fn remember(&mut self, addr: usize, copy: &Value) {
        if self.config.preserve_aliasing {
            self.memory.insert(addr, copy.clone());
        }
    }

    fn clone_pointer(&mut self, ty: &Type, cell: &Cell) -> CloneResult<Value> {
        if let Some(copy) = self.recall(cell.addr(), ty) {
            return Ok(copy);
        }

        let target = Cell::new(Value::NIL);
        let copy = Value::from_parts(ty.clone(), Data::Ptr(Some(target.clone())));

        // Register before descending so a cycle back to this cell finds it
        self.remember(cell.addr(), &copy);

        let pointee = self.internal_clone(&cell.read())?;
        *target.write() = pointee;
        Ok(copy)
    }

    fn clone_slice(&mut self, ty: &Type, slice: &SliceRef) -> CloneResult<Value> {
        if let Some(copy) = self.recall(slice.addr(), ty) {
            return Ok(copy);
        }

        let source = slice.read();
        let target = SliceRef::new(Vec::new(), source.cap);
        let copy = Value::from_parts(ty.clone(), Data::Slice(Some(target.clone())));
        self.remember(slice.addr(), &copy);

        // Capacity is bookkeeping only; reserve what is actually stored
        let mut items = Vec::with_capacity(source.items.len());
        for item in &source.items {
            items.push(self.internal_clone(item)?);
        }
        target.write().items = items;
        Ok(copy)
    }

    fn clone_map(&mut self, ty: &Type, map: &MapRef) -> CloneResult<Value> {
        if let Some(copy) = self.recall(map.addr(), ty) {
            return Ok(copy);
        }

        let source = map.read();
        let target = MapRef::empty(source.len());
        let copy = Value::from_parts(ty.clone(), Data::Map(Some(target.clone())));
        self.remember(map.addr(), &copy);

        for (key, value) in source.iter() {
            let key = self.internal_clone(&key.0)?;
            let value = self.internal_clone(value)?;
            target.write().insert(MapKey(key), value);
        }
        Ok(copy)
    }

    fn clone_chan(&mut self, ty: &Type, chan: &ChanRef) -> Value {
        if let Some(copy) = self.recall(chan.addr(), ty) {
            return copy;
        }

        // Same element type and capacity; queued messages stay behind
        let copy = Value::from_parts(ty.clone(), Data::Chan(Some(ChanRef::new(chan.cap()))));
        self.remember(chan.addr(), &copy);
        copy
    }

    fn clone_record(&mut self, ty: &Type, fields: &[Value]) -> CloneResult<Value> {
        let mut copied = Vec::with_capacity(fields.len());
        for (def, field) in ty.fields().iter().zip(fields) {
            if def.is_exported() {
                copied.push(self.internal_clone(field)?);
                continue;
            }
            match self.config.unexported_fields {
                FieldPolicy::Skip => {
                    debug!(record = %ty, field = def.name(), "leaving unexported field at zero");
                    copied.push(Value::zero(&def.ty()));
                }
                FieldPolicy::Reject => {
                    return Err(CloneError::UnexportedField {
                        type_name: ty.to_string(),
                        field: def.name().to_string(),
                    });
                }
            }
        }
        Ok(Value::from_parts(ty.clone(), Data::Struct(copied)))
    }

    fn clone_array(&mut self, ty: &Type, items: &[Value]) -> CloneResult<Value> {
        let copied = items
            .iter()
            .map(|item| self.internal_clone(item))
            .collect::<CloneResult<Vec<_>>>()?;
        Ok(Value::from_parts(ty.clone(), Data::Array(copied)))
    }
}

/// Deep clone `value` with the default configuration
pub fn deep_clone(value: &Value) -> CloneResult<Value> {
    DeepCloner::default().clone_value(value)
}

/// Deep clone `value` with `config`
pub fn deep_clone_with(value: &Value, config: &CloneConfig) -> CloneResult<Value> {
    DeepCloner::new(config.clone()).clone_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Kind};
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

    fn cycle() -> Value {
        let node = node_type();
        let a = Value::new(&node);
        let b = Value::new(&node);
        a.update_elem(|n| n.set_field("Next", b.clone())).unwrap();
        b.update_elem(|n| {
            n.set_field("Value", Value::int(2))?;
            n.set_field("Next", a.clone())
        })
        .unwrap();
        a
    }

    #[test]
    fn test_clone_primitives() {
        let mut cloner = DeepCloner::default();

        assert!(!cloner.clone_value(&Value::NIL).unwrap().is_valid());
        assert_eq!(cloner.clone_value(&Value::bool(true)).unwrap().as_bool(), Some(true));
        assert_eq!(cloner.clone_value(&Value::int(42)).unwrap().as_int(), Some(42));
        assert_eq!(cloner.clone_value(&Value::uint(7)).unwrap().as_uint(), Some(7));
        assert_eq!(cloner.clone_value(&Value::float(1.5)).unwrap().as_float(), Some(1.5));
        assert_eq!(cloner.clone_value(&Value::string("hello")).unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn test_nil_shapes_keep_their_type() {
        let shapes = [
            Type::pointer_to(node_type()),
            Type::slice_of(Type::int()),
            Type::map_of(Type::string(), Type::int()),
            Type::chan_of(Type::int()),
            Type::any(),
            Type::func(),
        ];
        for ty in shapes {
            let copy = deep_clone(&Value::zero(&ty)).unwrap();
            assert!(copy.is_nil(), "{ty} should stay nil");
            assert_eq!(copy.type_of(), Some(&ty));
        }
    }

    #[test]
    fn test_slice_keeps_length_and_capacity() {
        let ty = Type::slice_of(Type::string());
        let source = Value::make_slice(&ty, 2, 8).unwrap();
        let copy = deep_clone(&source).unwrap();
        assert_eq!(copy.len().unwrap(), 2);
        assert_eq!(copy.cap().unwrap(), 8);
        assert!(!copy.same_storage(&source));

        let empty = Value::make_slice(&ty, 0, 0).unwrap();
        let copy = deep_clone(&empty).unwrap();
        assert!(!copy.is_nil());
        assert_eq!(copy.len().unwrap(), 0);
    }

    #[test]
    fn test_func_and_opaque_pass_through() {
        let func = Value::func(|args| Ok(Value::int(args.len() as i64)));
        let copy = deep_clone(&func).unwrap();
        assert!(copy.same_storage(&func));
        assert_eq!(copy.call(&[Value::NIL, Value::NIL]).unwrap().as_int(), Some(2));

        let opaque = Value::opaque(vec![1u8, 2, 3]);
        let copy = deep_clone(&opaque).unwrap();
        assert!(copy.same_storage(&opaque));
        assert_eq!(copy.downcast_opaque::<Vec<u8>>().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_unexported_field_policy() {
        let secret = Type::named(
            "Secret",
            Type::record(vec![
                Field::new("Label", Type::string()),
                Field::new("token", Type::string()).private(),
            ]),
        );
        let source =
            Value::record(&secret, vec![Value::string("db"), Value::string("hunter2")]).unwrap();

        let copy = deep_clone(&source).unwrap();
        assert_eq!(copy.field("Label").unwrap().as_str(), Some("db"));
        assert_eq!(copy.field("token").unwrap().as_str(), Some(""));
        assert_eq!(source.field("token").unwrap().as_str(), Some("hunter2"));

        let err = deep_clone_with(&source, &CloneConfig::strict()).unwrap_err();
        assert_eq!(
            err,
            CloneError::UnexportedField {
                type_name: "Secret".to_string(),
                field: "token".to_string(),
            }
        );
    }

    #[test]
    fn test_error_aborts_whole_clone() {
        let secret = Type::named(
            "Secret",
            Type::record(vec![Field::new("token", Type::string()).private()]),
        );
        let list = Value::slice(
            &Type::any(),
            vec![Value::int(1), Value::zero(&secret), Value::int(3)],
        )
        .unwrap();
        let result = deep_clone_with(&list, &CloneConfig::strict());
        assert!(matches!(result, Err(CloneError::UnexportedField { .. })));
    }

    #[test]
    fn test_depth_limit_stops_cycles() {
        let config = CloneConfig::new().with_max_depth(64);
        let err = deep_clone_with(&cycle(), &config).unwrap_err();
        assert_eq!(err, CloneError::DepthExceeded { limit: 64 });
    }

    #[test]
    fn test_aliasing_mode_clones_cycles() {
        let source = cycle();
        let copy = deep_clone_with(&source, &CloneConfig::hardened()).unwrap();

        assert!(!copy.same_storage(&source));
        let second = copy.elem().unwrap().field("Next").unwrap();
        assert_eq!(second.elem().unwrap().field("Value").unwrap().as_int(), Some(2));
        let back = second.elem().unwrap().field("Next").unwrap();
        assert!(back.same_storage(&copy));
    }

    #[test]
    fn test_aliasing_mode_preserves_shared_substructure() {
        let shared = Value::slice(&Type::int(), vec![Value::int(1)]).unwrap();
        let pair = Value::array(&shared.type_of().unwrap().clone(), vec![shared.clone(), shared])
            .unwrap();

        let copy = deep_clone_with(&pair, &CloneConfig::new().with_aliasing(true)).unwrap();
        assert!(copy.index(0).unwrap().same_storage(&copy.index(1).unwrap()));

        let copy = deep_clone(&pair).unwrap();
        assert!(!copy.index(0).unwrap().same_storage(&copy.index(1).unwrap()));
    }

    #[test]
    fn test_map_keys_are_cloned() {
        let key_ty = Type::pointer_to(Type::int());
        let map = Value::make_map(&Type::map_of(key_ty, Type::string())).unwrap();
        let key = Value::pointer(Value::int(5)).unwrap();
        map.map_insert(key.clone(), Value::string("five")).unwrap();

        let copy = deep_clone(&map).unwrap();
        let entries = copy.map_entries().unwrap();
        assert_eq!(entries.len(), 1);
        let (copied_key, copied_value) = &entries[0];
        assert!(!copied_key.same_storage(&key));
        assert_eq!(copied_key.elem().unwrap().as_int(), Some(5));
        assert_eq!(copied_value.as_str(), Some("five"));
        assert_eq!(copy.kind(), Some(Kind::Map));
    }

    #[test]
    fn test_huge_capacity_is_not_allocated() {
        let ty = Type::slice_of(Type::int());
        let cap = usize::MAX / 64;
        let source = Value::make_slice(&ty, 0, cap).unwrap();

        let copy = deep_clone(&source).unwrap();
        assert_eq!(copy.cap().unwrap(), cap);
        assert_eq!(copy.len().unwrap(), 0);
        assert!(!copy.same_storage(&source));
    }

    #[test]
    fn test_depth_is_restored_after_interface_error() {
        let secret = Type::named(
            "Secret",
            Type::record(vec![Field::new("token", Type::string()).private()]),
        );
        let mut cloner = DeepCloner::new(CloneConfig::strict());
        assert!(cloner.internal_clone(&Value::any(Value::zero(&secret))).is_err());
        assert_eq!(cloner.depth, 0);

        let ok = cloner.internal_clone(&Value::any(Value::int(1))).unwrap();
        assert_eq!(ok.concrete().as_int(), Some(1));
        assert_eq!(cloner.depth, 0);
    }
}
