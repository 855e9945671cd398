//! # deepclone
//!
//! Generic deep copy of runtime-typed value graphs.
//!
//! A [`Value`] pairs a runtime [`Type`] with data. Plain `clone()` on a value
//! behaves like assignment: pointer cells, slice backing stores, maps and
//! channels stay shared between the two handles. [`deep_clone`] walks the
//! graph and allocates fresh storage everywhere, so mutating the copy never
//! shows through the source.
//!
//! ## Design Principles
//!
//! - **Type preserving**: the copy has exactly the source's type, nil stays nil
//! - **Nil is not empty**: a nil slice or map is never turned into an empty one
//! - **Thread-safe**: values are `Send + Sync`; the cloner takes read locks only
//! - **Native bridge**: [`Reflect`] (and `#[derive(Reflect)]`) maps Rust types
//!   onto the model, and [`deep_copy`] deep copies them through it
//!
//! ## Example
//!
//! ```
//! use deepclone::{Type, Value, deep_clone};
//!
//! let names = Value::slice(&Type::string(), vec![Value::string("ada")]).unwrap();
//! let mut copy = deep_clone(&names).unwrap();
//! copy.set_index(0, Value::string("grace")).unwrap();
//!
//! assert_eq!(names.index(0).unwrap().as_str(), Some("ada"));
//! assert_eq!(copy.index(0).unwrap().as_str(), Some("grace"));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cloner;
pub mod config;
pub mod equal;
pub mod error;
mod heap;
pub mod reflect;
pub mod types;
pub mod value;

pub use cloner::{DeepCloner, deep_clone, deep_clone_with};
pub use config::{CloneConfig, DEFAULT_MAX_DEPTH, FieldPolicy};
pub use deepclone_macros::Reflect;
pub use equal::deep_equal;
pub use error::{CloneError, CloneResult};
pub use heap::NativeFn;
pub use reflect::{Reflect, ReflectKey, deep_copy};
pub use types::{Field, Kind, Type};
pub use value::Value;
