//! Connection handles and the follower nodes they own.
//!
//! Every connection owns one heap-allocated [`Follower`]: an intrusive link
//! into the signal's follower list, the slot, and a back-pointer to the
//! signal. The follower never moves while linked, so moving a `Connection`
//! only moves the owning pointer; the subscription keeps both its address
//! and its place in firing order, and any emission cursor parked on it stays
//! valid.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use nexus_intrusive::{Link, Linked};
use tracing::trace;

use crate::signal::Shared;
use crate::Slot;

/// Tag for the follower list links.
pub(crate) enum FollowerTag {}

/// One subscription, linked into its signal's follower list.
///
/// Either unlinked with no owner, or linked into exactly one signal's list
/// with `owner` pointing at that signal.
#[repr(C)]
pub(crate) struct Follower<A: ?Sized> {
    // first field: `from_link` is a plain cast
    link: Link<FollowerTag>,
    owner: Cell<Option<NonNull<Shared<A>>>>,
    slot: RefCell<Option<Rc<dyn Slot<A>>>>,
}

// SAFETY: `link` is the first field of a `repr(C)` struct, so a pointer to it
// derived from the follower pointer is a pointer to the follower.
unsafe impl<A: ?Sized> Linked<FollowerTag> for Follower<A> {
    #[inline]
    unsafe fn link_ptr(ptr: NonNull<Self>) -> NonNull<Link<FollowerTag>> {
        // Safety: caller guarantees `ptr` is a live follower
        unsafe { NonNull::new_unchecked(ptr::addr_of_mut!((*ptr.as_ptr()).link)) }
    }

    #[inline]
    unsafe fn from_link(link: NonNull<Link<FollowerTag>>) -> NonNull<Self> {
        link.cast()
    }
}

impl<A: ?Sized> Follower<A> {
    /// Allocates an unlinked follower. Ownership passes to a [`Connection`]
    /// through [`Connection::from_node`].
    pub(crate) fn new(owner: &Shared<A>, slot: Rc<dyn Slot<A>>) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self {
            link: Link::new(),
            owner: Cell::new(Some(NonNull::from(owner))),
            slot: RefCell::new(Some(slot)),
        })))
    }

    /// Returns a handle to the slot that outlives a mid-call disconnect.
    #[inline]
    pub(crate) fn slot(&self) -> Option<Rc<dyn Slot<A>>> {
        self.slot.borrow().clone()
    }

    #[inline]
    fn is_connected(&self) -> bool {
        self.owner.get().is_some()
    }

    /// Unlinks the follower and hands back its slot.
    ///
    /// Active emission frames parked on this follower are moved to its
    /// successor before the unlink. The caller drops the returned slot once
    /// it no longer holds any reference into the follower.
    pub(crate) fn detach(&self) -> Option<Rc<dyn Slot<A>>> {
        if let Some(owner) = self.owner.take() {
            // Safety: the owner is only set while linked, and the signal
            // detaches every follower before its shared state is released
            unsafe { owner.as_ref() }.skip_past(&self.link);
        }
        self.link.unlink();
        self.slot.borrow_mut().take()
    }
}

/// A subscription to a [`Signal`](crate::Signal).
///
/// The slot stays connected for as long as the handle lives. Dropping the
/// handle, calling [`disconnect`](Self::disconnect), or assigning over it
/// removes the slot; this is safe at any time, including from inside the
/// slot itself while the signal is firing.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use nexus_signal::Signal;
///
/// let signal = Signal::new();
/// let hits = Rc::new(Cell::new(0));
///
/// let counter = Rc::clone(&hits);
/// let mut conn = signal.connect(move |_: &()| counter.set(counter.get() + 1));
///
/// signal.emit(&());
/// conn.disconnect();
/// signal.emit(&());
///
/// assert_eq!(hits.get(), 1);
/// assert!(!conn.is_connected());
/// ```
#[must_use = "dropping a connection disconnects its slot"]
pub struct Connection<A: ?Sized> {
    node: Option<NonNull<Follower<A>>>,
    _owns: PhantomData<Box<Follower<A>>>,
}

impl<A: ?Sized> Connection<A> {
    /// Takes ownership of a node from [`Follower::new`].
    pub(crate) fn from_node(node: NonNull<Follower<A>>) -> Self {
        Self {
            node: Some(node),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn follower(&self) -> Option<&Follower<A>> {
        // Safety: the node is owned by this handle until `disconnect`
        self.node.map(|node| unsafe { &*node.as_ptr() })
    }

    /// Returns `true` while the slot is registered with a live signal.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.follower().is_some_and(Follower::is_connected)
    }

    /// Removes the slot from its signal and empties this handle.
    ///
    /// A no-op on a handle that is already disconnected.
    pub fn disconnect(&mut self) {
        let Some(node) = self.node.take() else {
            return;
        };

        // Safety: the node is live until freed below
        let slot = unsafe { node.as_ref() }.detach();
        // Safety: allocated by `Follower::new`, and this handle was its only
        // owner; now unlinked, so nothing else points at it
        drop(unsafe { Box::from_raw(node.as_ptr()) });

        if let Some(slot) = slot {
            trace!("slot disconnected");
            // may run arbitrary drop code, so last
            drop(slot);
        }
    }

    /// Moves the subscription into a new handle, leaving this one empty.
    ///
    /// The slot keeps its position in firing order.
    #[inline]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<A: ?Sized> Default for Connection<A> {
    /// An empty, disconnected handle.
    fn default() -> Self {
        Self {
            node: None,
            _owns: PhantomData,
        }
    }
}

impl<A: ?Sized> Drop for Connection<A> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<A: ?Sized> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signal;

    #[test]
    fn default_is_disconnected() {
        let mut conn: Connection<u32> = Connection::default();
        assert!(!conn.is_connected());
        conn.disconnect();
        assert!(!conn.is_connected());
    }

    #[test]
    fn disconnect_twice_is_noop() {
        let signal: Signal<u32> = Signal::new();
        let mut conn = signal.connect(|_| {});

        conn.disconnect();
        conn.disconnect();

        assert!(!conn.is_connected());
        assert!(signal.is_empty());
    }

    #[test]
    fn drop_disconnects() {
        let signal: Signal<u32> = Signal::new();
        {
            let _conn = signal.connect(|_| {});
            assert_eq!(signal.len(), 1);
        }
        assert!(signal.is_empty());
    }

    #[test]
    fn take_keeps_subscription() {
        let signal: Signal<u32> = Signal::new();
        let mut conn = signal.connect(|_| {});

        let moved = conn.take();

        assert!(!conn.is_connected());
        assert!(moved.is_connected());
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn assign_over_disconnects_old() {
        let signal: Signal<u32> = Signal::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&calls);
        let mut conn = signal.connect(move |_| log.borrow_mut().push("old"));
        assert!(conn.is_connected());
        let log = Rc::clone(&calls);
        conn = signal.connect(move |_| log.borrow_mut().push("new"));

        signal.emit(&0);

        assert!(conn.is_connected());
        assert_eq!(*calls.borrow(), vec!["new"]);
    }

    #[test]
    fn disconnect_releases_slot_captures() {
        let signal: Signal<u32> = Signal::new();
        let token = Rc::new(());

        let held = Rc::clone(&token);
        let mut conn = signal.connect(move |_| drop(Rc::clone(&held)));
        assert_eq!(Rc::strong_count(&token), 2);

        conn.disconnect();
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn outlives_signal() {
        let signal: Signal<u32> = Signal::new();
        let mut conn = signal.connect(|_| {});

        drop(signal);

        assert!(!conn.is_connected());
        conn.disconnect();
    }

    #[test]
    fn link_pointer_recovers_whole_follower() {
        let signal: Signal<u32> = Signal::new();
        let conn = signal.connect(|_| {});
        let node = conn.node.unwrap();

        // the link pointer is derived from the follower pointer, so walking
        // back from it reaches every field
        let link = unsafe { Follower::link_ptr(node) };
        let back = unsafe { Follower::<u32>::from_link(link) };
        assert_eq!(back, node);

        let follower = unsafe { back.as_ref() };
        assert!(follower.is_connected());
        assert!(follower.slot().is_some());
        assert_eq!(signal.len(), 1);
    }
}
