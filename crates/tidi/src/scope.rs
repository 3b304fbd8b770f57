//! Release stack for scoped resources acquired during one call

use std::fmt;

use tracing::debug;

use crate::resolver::Resolved;

/// Something that must be released when the enclosing scope ends
pub trait Release: Send {
    fn release(self: Box<Self>);
}

impl<T: ?Sized + Send + Sync + 'static> Release for Resolved<T> {
    fn release(self: Box<Self>) {
        Resolved::release(*self);
    }
}

/// A stack of acquired values, released in reverse acquisition order.
///
/// Releasing happens on [`close`](ScopeStack::close) or on drop, so the stack also
/// unwinds when a later resolution fails or the wrapped callable panics.
///
/// ```
/// use tidi::ScopeStack;
///
/// let mut scope = ScopeStack::new();
/// scope.push_fn(|| println!("released second"));
/// scope.push_fn(|| println!("released first"));
/// scope.close();
/// ```
#[derive(Default)]
pub struct ScopeStack {
    entries: Vec<Box<dyn Release>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<R: Release + 'static>(&mut self, entry: R) {
        self.entries.push(Box::new(entry));
    }

    pub fn push_boxed(&mut self, entry: Box<dyn Release>) {
        self.entries.push(entry);
    }

    /// Push a release callback
    pub fn push_fn<F: FnOnce() + Send + 'static>(&mut self, release: F) {
        self.push(ReleaseFn(release));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release everything now
    pub fn close(self) {
        drop(self);
    }

    fn unwind(&mut self) {
        if !self.entries.is_empty() {
            debug!(count = self.entries.len(), "Releasing scope stack");
        }
        let mut pending = PendingReleases(&mut self.entries);
        while let Some(entry) = pending.0.pop() {
            entry.release();
        }
    }
}

/// Keeps releasing from the top of the stack if a release panics
struct PendingReleases<'a>(&'a mut Vec<Box<dyn Release>>);

impl Drop for PendingReleases<'_> {
    fn drop(&mut self) {
        while let Some(entry) = self.0.pop() {
            entry.release();
        }
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStack")
            .field("len", &self.entries.len())
            .finish()
    }
}

struct ReleaseFn<F>(F);

impl<F: FnOnce() + Send> Release for ReleaseFn<F> {
    fn release(self: Box<Self>) {
        (self.0)();
    }
}
