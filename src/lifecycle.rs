//! Lifecycle state shared by every owning component.
//!
//! Components that own resources (the cache, the scheduler, the scene) carry a
//! [`Lifecycle`] instead of a scattered `disposed` flag. Public entry points
//! consult it first and return their defined empty result when the component
//! is no longer [`Lifecycle::Active`].

/// Lifecycle of an owning component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    #[default]
    Active,
    Disposing,
    Disposed,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    /// Moves `Active` to `Disposing`.
    ///
    /// Returns `false` when the component is already disposing or disposed so
    /// that teardown runs exactly once.
    pub fn begin_dispose(&mut self) -> bool {
        if *self != Lifecycle::Active {
            return false;
        }
        *self = Lifecycle::Disposing;
        true
    }

    pub fn finish_dispose(&mut self) {
        *self = Lifecycle::Disposed;
    }
}
