//! Structural equality over value graphs.
//!
//! Used to check that a deep copy matches its source. Two values are deeply
//! equal when they have identical types and equal contents, following
//! pointers, slices, maps and interfaces. A nil slice or map never equals an
//! empty one. Functions, opaque handles and channels compare by identity.
//! Floats compare numerically, so NaN is never equal to itself.

use rustc_hash::FxHashSet;

use crate::heap::MapKey;
use crate::value::{Data, Value};

/// Whether `a` and `b` are deeply equal. Terminates on cyclic graphs.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    Comparer::default().equal(a, b)
}

#[derive(Default)]
struct Comparer {
    /// Storage pairs already under comparison, assumed equal on revisit
    visited: FxHashSet<(usize, usize)>,
}

impl Comparer {
    fn equal(&mut self, a: &Value, b: &Value) -> bool {
        let (Some((ta, da)), Some((tb, db))) = (a.parts(), b.parts()) else {
            return !a.is_valid() && !b.is_valid();
        };
        if ta != tb {
            return false;
        }

        match (da, db) {
            (Data::Bool(x), Data::Bool(y)) => x == y,
            (Data::Int(x), Data::Int(y)) => x == y,
            (Data::Uint(x), Data::Uint(y)) => x == y,
            (Data::Float(x), Data::Float(y)) => x == y,
            (Data::String(x), Data::String(y)) => x == y,
            (Data::Func(x), Data::Func(y)) => match (x, y) {
                (Some(x), Some(y)) => x.ptr_eq(y),
                (None, None) => true,
                _ => false,
            },
            (Data::Opaque(x), Data::Opaque(y)) => match (x, y) {
                (Some(x), Some(y)) => x.ptr_eq(y),
                (None, None) => true,
                _ => false,
            },
            (Data::Chan(x), Data::Chan(y)) => match (x, y) {
                (Some(x), Some(y)) => x.addr() == y.addr(),
                (None, None) => true,
                _ => false,
            },
            (Data::Ptr(x), Data::Ptr(y)) => match (x, y) {
                (Some(x), Some(y)) => {
                    if x.addr() == y.addr() || !self.visit(x.addr(), y.addr()) {
                        return true;
                    }
                    self.equal(&x.read(), &y.read())
                }
                (None, None) => true,
                _ => false,
            },
            (Data::Slice(x), Data::Slice(y)) => match (x, y) {
                (Some(x), Some(y)) => {
                    let (xs, ys) = (x.read(), y.read());
                    if xs.items.len() != ys.items.len() {
                        return false;
                    }
                    if x.addr() == y.addr() || !self.visit(x.addr(), y.addr()) {
                        return true;
                    }
                    xs.items
                        .iter()
                        .zip(&ys.items)
                        .all(|(x, y)| self.equal(x, y))
                }
                (None, None) => true,
                _ => false,
            },
            (Data::Map(x), Data::Map(y)) => match (x, y) {
                (Some(x), Some(y)) => {
                    let (xs, ys) = (x.read(), y.read());
                    if xs.len() != ys.len() {
                        return false;
                    }
                    if x.addr() == y.addr() || !self.visit(x.addr(), y.addr()) {
                        return true;
                    }
                    xs.iter().all(|(key, xv)| match ys.get(&MapKey(key.0.clone())) {
                        Some(yv) => self.equal(xv, yv),
                        None => false,
                    })
                }
                (None, None) => true,
                _ => false,
            },
            (Data::Array(xs), Data::Array(ys)) | (Data::Struct(xs), Data::Struct(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.equal(x, y))
            }
            (Data::Interface(x), Data::Interface(y)) => match (x, y) {
                (Some(x), Some(y)) => self.equal(x, y),
                (None, None) => true,
                _ => false,
            },
            _ => false,
        }
    }

    /// Record a storage pair; `false` if it was already being compared
    fn visit(&mut self, a: usize, b: usize) -> bool {
        self.visited.insert((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Type};

    #[test]
    fn test_scalars() {
        assert!(deep_equal(&Value::NIL, &Value::NIL));
        assert!(deep_equal(&Value::int(3), &Value::int(3)));
        assert!(!deep_equal(&Value::int(3), &Value::uint(3)));
        assert!(!deep_equal(&Value::int(3), &Value::NIL));
        assert!(!deep_equal(&Value::float(f64::NAN), &Value::float(f64::NAN)));
        assert!(deep_equal(&Value::string("a"), &Value::string("a")));
    }

    #[test]
    fn test_named_types_differ() {
        let celsius = Type::named("Celsius", Type::float());
        let a = Value::float(20.0).convert(&celsius).unwrap();
        assert!(!deep_equal(&a, &Value::float(20.0)));
        assert!(deep_equal(&a, &a.clone()));
    }

    #[test]
    fn test_nil_and_empty_differ() {
        let ty = Type::slice_of(Type::int());
        let nil = Value::zero(&ty);
        let empty = Value::make_slice(&ty, 0, 0).unwrap();
        assert!(!deep_equal(&nil, &empty));
        assert!(deep_equal(&nil, &Value::zero(&ty)));

        let ty = Type::map_of(Type::string(), Type::int());
        assert!(!deep_equal(&Value::zero(&ty), &Value::make_map(&ty).unwrap()));
    }

    #[test]
    fn test_follows_pointers() {
        let a = Value::pointer(Value::int(1)).unwrap();
        let b = Value::pointer(Value::int(1)).unwrap();
        assert!(deep_equal(&a, &b));
        b.set_elem(Value::int(2)).unwrap();
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn test_maps_ignore_order() {
        let a = Value::map(
            &Type::string(),
            &Type::int(),
            vec![(Value::string("x"), Value::int(1)), (Value::string("y"), Value::int(2))],
        )
        .unwrap();
        let b = Value::map(
            &Type::string(),
            &Type::int(),
            vec![(Value::string("y"), Value::int(2)), (Value::string("x"), Value::int(1))],
        )
        .unwrap();
        assert!(deep_equal(&a, &b));
        b.map_insert(Value::string("x"), Value::int(9)).unwrap();
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn test_identity_kinds() {
        let f = Value::func(|_| Ok(Value::NIL));
        let g = Value::func(|_| Ok(Value::NIL));
        assert!(deep_equal(&f, &f.clone()));
        assert!(!deep_equal(&f, &g));

        let ty = Type::chan_of(Type::int());
        let c = Value::make_chan(&ty, 1).unwrap();
        assert!(deep_equal(&c, &c.clone()));
        assert!(!deep_equal(&c, &Value::make_chan(&ty, 1).unwrap()));
    }

    #[test]
    fn test_cycles_terminate() {
        fn ring() -> Type {
            static RING: std::sync::OnceLock<Type> = std::sync::OnceLock::new();
            RING.get_or_init(|| {
                Type::named(
                    "Ring",
                    Type::record(vec![Field::deferred("Next", || Type::pointer_to(ring()))]),
                )
            })
            .clone()
        }

        let make = || {
            let p = Value::new(&ring());
            p.update_elem(|r| r.set_field("Next", p.clone())).unwrap();
            p
        };
        assert!(deep_equal(&make(), &make()));
    }
}
