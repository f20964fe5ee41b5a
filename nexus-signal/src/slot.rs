//! The callable invoked for each connection when a signal fires.

/// A callback that receives a signal's argument.
///
/// Any `Fn(&A)` closure is a slot. Implement this directly for types that
/// carry their own state and want a name in stack traces.
///
/// Slots take `&self` because firing a signal from inside one of its own
/// slots re-enters every slot still connected; keep mutable state in a
/// `Cell` or `RefCell`.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use nexus_signal::{Signal, Slot};
///
/// struct Counter {
///     hits: Cell<u64>,
/// }
///
/// impl Slot<u64> for Counter {
///     fn invoke(&self, amount: &u64) {
///         self.hits.set(self.hits.get() + amount);
///     }
/// }
///
/// let signal = Signal::new();
/// let _conn = signal.connect_slot(Counter { hits: Cell::new(0) });
/// signal.emit(&5);
/// ```
pub trait Slot<A: ?Sized> {
    /// Handles one firing.
    fn invoke(&self, args: &A);
}

impl<A: ?Sized, F> Slot<A> for F
where
    F: Fn(&A),
{
    #[inline]
    fn invoke(&self, args: &A) {
        self(args)
    }
}
