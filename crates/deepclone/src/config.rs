//! Configuration for the deep cloner.
//!
//! By default recursion is unbounded, unexported fields are left at zero
//! without error, and there is no identity tracking, so a cyclic graph never
//! terminates.

/// Depth used by [`CloneConfig::hardened`]
pub const DEFAULT_MAX_DEPTH: usize = 2048;

/// What to do with a record field that cannot be written from outside its
/// declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPolicy {
    /// Leave the field at its zero value in the copy
    #[default]
    Skip,
    /// Abort the clone with [`CloneError::UnexportedField`](crate::CloneError::UnexportedField)
    Reject,
}

/// Deep clone settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloneConfig {
    /// Maximum nesting depth of the traversal.
    /// Default: None (unbounded; deep enough input exhausts the stack)
    pub max_depth: Option<usize>,

    /// Handling of unexported record fields.
    /// Default: [`FieldPolicy::Skip`]
    pub unexported_fields: FieldPolicy,

    /// Clone each pointer cell, slice store, map and channel once per call
    /// and reuse the copy for later references. Makes cyclic graphs
    /// clonable and keeps shared substructure shared in the copy.
    /// Default: false
    pub preserve_aliasing: bool,
}

impl CloneConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to silently drop unexported fields.
    pub fn strict() -> Self {
        Self {
            unexported_fields: FieldPolicy::Reject,
            ..Default::default()
        }
    }

    /// Bounded depth with aliasing preserved; safe on arbitrary graphs.
    pub fn hardened() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            preserve_aliasing: true,
            ..Default::default()
        }
    }

    /// Set the maximum nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set the unexported field policy.
    pub fn with_unexported_fields(mut self, policy: FieldPolicy) -> Self {
        self.unexported_fields = policy;
        self
    }

    /// Enable or disable aliasing preservation.
    pub fn with_aliasing(mut self, preserve: bool) -> Self {
        self.preserve_aliasing = preserve;
        self
    }
}
