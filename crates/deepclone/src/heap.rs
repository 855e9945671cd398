//! Shared storage behind reference-like values.
//!
//! Pointers, slices, maps and channels hold their storage behind `Arc`, so
//! cloning a [`Value`] handle (plain assignment) shares it. Only the deep
//! cloner allocates fresh storage. Locks are `parking_lot::RwLock`; traversal
//! uses recursive read locks so one graph may reference the same cell more
//! than once.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxBuildHasher;

use crate::error::CloneResult;
use crate::value::{Data, Value};

/// Storage cell a pointer refers to
#[derive(Clone)]
pub struct Cell(Arc<RwLock<Value>>);

impl Cell {
    /// Allocate a new cell
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Copy of the current contents (assignment semantics)
    pub fn get(&self) -> Value {
        self.0.read_recursive().clone()
    }

    /// Replace the contents
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    /// Storage identity
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

/// Backing store of a slice: the visible elements plus the reserved capacity
pub(crate) struct SliceBuf {
    pub(crate) items: Vec<Value>,
    pub(crate) cap: usize,
}

/// Shared slice backing store
#[derive(Clone)]
pub struct SliceRef(Arc<RwLock<SliceBuf>>);

impl SliceRef {
    pub(crate) fn new(items: Vec<Value>, cap: usize) -> Self {
        let cap = cap.max(items.len());
        Self(Arc::new(RwLock::new(SliceBuf { items, cap })))
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SliceBuf> {
        self.0.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SliceBuf> {
        self.0.write()
    }

    /// Storage identity
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

pub(crate) type Entries = IndexMap<MapKey, Value, FxBuildHasher>;

/// Shared map storage, kept in insertion order
#[derive(Clone)]
pub struct MapRef(Arc<RwLock<Entries>>);

impl MapRef {
    pub(crate) fn new(entries: Entries) -> Self {
        Self(Arc::new(RwLock::new(entries)))
    }

    pub(crate) fn empty(capacity: usize) -> Self {
        Self::new(IndexMap::with_capacity_and_hasher(capacity, FxBuildHasher))
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.0.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.0.write()
    }

    /// Storage identity
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

struct Channel {
    tx: Sender<Value>,
    rx: Receiver<Value>,
    cap: usize,
}

/// Buffered channel of values
#[derive(Clone)]
pub struct ChanRef(Arc<Channel>);

impl ChanRef {
    pub(crate) fn new(cap: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        Self(Arc::new(Channel { tx, rx, cap }))
    }

    /// Buffer capacity
    pub fn cap(&self) -> usize {
        self.0.cap
    }

    /// Number of queued messages
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.rx.len()
    }

    /// Queue a message without blocking; `false` when the buffer is full
    pub(crate) fn try_send(&self, value: Value) -> bool {
        match self.0.tx.try_send(value) {
            Ok(()) => true,
            // The channel owns both ends, so it can never disconnect.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub(crate) fn try_recv(&self) -> Option<Value> {
        self.0.rx.try_recv().ok()
    }

    /// Channel identity
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

/// Signature of a callable value
pub type NativeFn = dyn Fn(&[Value]) -> CloneResult<Value> + Send + Sync;

/// Callable value, shared by identity
#[derive(Clone)]
pub struct FuncRef(pub(crate) Arc<NativeFn>);

impl FuncRef {
    /// Identity comparison
    pub fn ptr_eq(&self, other: &FuncRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Host object with no decomposable structure, shared by identity
#[derive(Clone)]
pub struct OpaqueRef(pub(crate) Arc<dyn Any + Send + Sync>);

impl OpaqueRef {
    /// Identity comparison
    pub fn ptr_eq(&self, other: &OpaqueRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({:#x})"), Arc::as_ptr(&self.0) as *const () as usize)
            }
        })*
    };
}

opaque_debug!(Cell, SliceRef, MapRef, ChanRef, FuncRef, OpaqueRef);

// ============================================================================
// MapKey
// ============================================================================

/// Map key with comparable-value semantics.
///
/// Scalars compare by value, pointers and channels by storage identity,
/// arrays and records element-wise, interfaces by the value they hold.
/// Values of distinct types are never equal.
#[derive(Clone)]
pub(crate) struct MapKey(pub(crate) Value);

impl MapKey {
    /// Whether `value` may be used as a key. Checks the dynamic value, so an
    /// interface holding a slice is rejected.
    pub(crate) fn is_hashable(value: &Value) -> bool {
        let Some((ty, data)) = value.parts() else {
            return true;
        };
        match data {
            Data::Slice(_) | Data::Map(_) | Data::Func(_) | Data::Opaque(_) => false,
            Data::Array(items) | Data::Struct(items) => items.iter().all(Self::is_hashable),
            Data::Interface(held) => held.as_deref().is_none_or(Self::is_hashable),
            _ => ty.is_comparable(),
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        key_eq(&self.0, &other.0)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        key_hash(&self.0, state);
    }
}

fn key_eq(a: &Value, b: &Value) -> bool {
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
        (Data::Ptr(x), Data::Ptr(y)) => match (x, y) {
            (Some(x), Some(y)) => x.addr() == y.addr(),
            (None, None) => true,
            _ => false,
        },
        (Data::Chan(x), Data::Chan(y)) => match (x, y) {
            (Some(x), Some(y)) => x.addr() == y.addr(),
            (None, None) => true,
            _ => false,
        },
        (Data::Array(x), Data::Array(y)) | (Data::Struct(x), Data::Struct(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| key_eq(x, y))
        }
        (Data::Interface(x), Data::Interface(y)) => match (x, y) {
            (Some(x), Some(y)) => key_eq(x, y),
            (None, None) => true,
            _ => false,
        },
        _ => false,
    }
}

fn key_hash<H: Hasher>(value: &Value, state: &mut H) {
    let Some((_, data)) = value.parts() else {
        state.write_u8(0);
        return;
    };
    match data {
        Data::Bool(b) => b.hash(state),
        Data::Int(n) => n.hash(state),
        Data::Uint(n) => n.hash(state),
        // +0.0 and -0.0 compare equal and must hash equal.
        Data::Float(x) => (if *x == 0.0 { 0.0f64 } else { *x }).to_bits().hash(state),
        Data::String(s) => s.hash(state),
        Data::Ptr(cell) => cell.as_ref().map(Cell::addr).hash(state),
        Data::Chan(chan) => chan.as_ref().map(ChanRef::addr).hash(state),
        Data::Array(items) | Data::Struct(items) => {
            state.write_usize(items.len());
            for item in items {
                key_hash(item, state);
            }
        }
        Data::Interface(held) => match held {
            Some(held) => key_hash(held, state),
            None => state.write_u8(0),
        },
        // Rejected by `is_hashable` before insertion.
        Data::Slice(_) | Data::Map(_) | Data::Func(_) | Data::Opaque(_) => state.write_u8(1),
    }
}
