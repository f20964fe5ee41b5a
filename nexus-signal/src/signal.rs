//! Signals and the reentrant emission loop.
//!
//! # Emission Frames
//!
//! Each call to `emit` pushes a [`Frame`] onto the signal's frame chain. The
//! frame holds the cursor for that emission; nested emissions of the same
//! signal push further frames, innermost first:
//!
//! ```text
//! Shared.innermost ─▶ [frame 2] ─outer─▶ [frame 1] ─outer─▶ None
//!                        │                   │
//!                      cursor              cursor
//!                        ▼                   ▼
//!   [sentinel] ⇄ [follower C] ⇄ [follower B] ⇄ [follower A]
//! ```
//!
//! The cursor moves to the successor *before* its slot runs, so a slot can
//! never invalidate the cursor of its own frame. Any other frame may still be
//! parked on a follower that gets disconnected; `Follower::detach` walks the
//! whole chain and moves those cursors on before unlinking.
//!
//! Dropping the signal marks every frame destroyed. Each emission stops as
//! soon as control returns to it, without touching another follower.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use nexus_intrusive::{Link, Linked};
use tracing::{debug, trace};

use crate::connection::{Connection, Follower, FollowerTag};
use crate::Slot;

/// Per-emission cursor state. Lives on the stack of `Shared::emit`.
struct Frame {
    cursor: Cell<NonNull<Link<FollowerTag>>>,
    outer: Option<NonNull<Frame>>,
    destroyed: Cell<bool>,
}

/// Registers a frame as innermost for its lifetime, including unwinding.
struct Entered<'s, A: ?Sized> {
    shared: &'s Shared<A>,
    frame: &'s Frame,
}

impl<'s, A: ?Sized> Entered<'s, A> {
    fn new(shared: &'s Shared<A>, frame: &'s Frame) -> Self {
        shared.innermost.set(Some(NonNull::from(frame)));
        Self { shared, frame }
    }
}

impl<A: ?Sized> Drop for Entered<'_, A> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.shared.innermost.get(),
            Some(NonNull::from(self.frame)),
            "emission frames must unwind in LIFO order"
        );
        self.shared.innermost.set(self.frame.outer);
    }
}

/// Walks the frame chain from innermost outward.
struct Frames<'s> {
    next: Option<NonNull<Frame>>,
    _marker: PhantomData<&'s Frame>,
}

impl<'s> Iterator for Frames<'s> {
    type Item = &'s Frame;

    fn next(&mut self) -> Option<&'s Frame> {
        // Safety: frames unregister themselves before their stack slot dies
        let frame = unsafe { self.next?.as_ref() };
        self.next = frame.outer;
        Some(frame)
    }
}

/// State shared by a signal, its weak handles and its followers.
///
/// Lives in an `Rc` allocation, so the sentinel never moves.
pub(crate) struct Shared<A: ?Sized> {
    followers: Link<FollowerTag>,
    innermost: Cell<Option<NonNull<Frame>>>,
    open: Cell<bool>,
    _args: PhantomData<fn(&A)>,
}

impl<A: ?Sized> Shared<A> {
    fn new() -> Self {
        Self {
            followers: Link::new(),
            innermost: Cell::new(None),
            open: Cell::new(true),
            _args: PhantomData,
        }
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.open.get()
    }

    #[inline]
    fn frames(&self) -> Frames<'_> {
        Frames {
            next: self.innermost.get(),
            _marker: PhantomData,
        }
    }

    fn len(&self) -> usize {
        let end = self.followers.as_ptr();
        let mut count = 0;
        let mut pos = self.followers.next();
        while pos != end {
            count += 1;
            // Safety: every non-sentinel link in the cycle is a live follower
            pos = unsafe { pos.as_ref() }.next();
        }
        count
    }

    /// Moves every frame parked on `link` to its successor.
    pub(crate) fn skip_past(&self, link: &Link<FollowerTag>) {
        let target = link.as_ptr();
        let next = link.next();
        for frame in self.frames() {
            if frame.cursor.get() == target {
                frame.cursor.set(next);
            }
        }
    }

    fn connect(&self, slot: Rc<dyn Slot<A>>) -> Connection<A> {
        if !self.is_open() {
            return Connection::default();
        }

        let node = Follower::new(self, slot);
        // Safety: the follower is heap-allocated and only freed by its
        // connection, which detaches it first; the sentinel lives until
        // `close` has detached every follower. The link pointer comes from
        // the node pointer, so emission can read the whole follower.
        unsafe { Link::link_before(Follower::link_ptr(node), self.followers.next()) };
        trace!("slot connected");

        Connection::from_node(node)
    }

    fn emit(&self, args: &A) {
        if !self.is_open() {
            return;
        }

        let frame = Frame {
            cursor: Cell::new(self.followers.next()),
            outer: self.innermost.get(),
            destroyed: Cell::new(false),
        };
        let _entered = Entered::new(self, &frame);

        let end = self.followers.as_ptr();
        while frame.cursor.get() != end {
            let slot = {
                // Safety: a live frame's cursor is the sentinel or a linked
                // follower; detach moves it on before any unlink
                let follower = unsafe { Follower::<A>::from_link(frame.cursor.get()).as_ref() };
                frame.cursor.set(follower.link().next());
                follower.slot()
            };

            if let Some(slot) = slot {
                slot.invoke(args);
            }

            if frame.destroyed.get() {
                return;
            }
        }
    }

    /// Teardown: stop every emission in flight and detach all followers.
    fn close(&self) {
        self.open.set(false);

        let mut interrupted = 0usize;
        for frame in self.frames() {
            frame.destroyed.set(true);
            interrupted += 1;
        }

        let mut slots = Vec::new();
        while self.followers.is_linked() {
            // Safety: every non-sentinel link in the cycle is a live follower
            let follower = unsafe { Follower::<A>::from_link(self.followers.next()).as_ref() };
            slots.extend(follower.detach());
        }

        if interrupted > 0 {
            debug!(interrupted, "signal dropped during emission");
        }
        trace!(followers = slots.len(), "signal closed");
        drop(slots);
    }
}

/// Fans a call out to every connected slot.
///
/// Slots run synchronously, most recently connected first. Connecting,
/// disconnecting, re-firing, or dropping the signal from inside a slot are
/// all well defined:
///
/// - a slot disconnected mid-emission is skipped for the rest of it
/// - a slot connected mid-emission first runs on the next emission
/// - a nested emission walks the list independently of the outer one
/// - dropping the signal stops every emission in flight once the running
///   slot returns
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use nexus_signal::Signal;
///
/// let signal: Signal<str> = Signal::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let log = Rc::clone(&seen);
/// let _a = signal.connect(move |msg| log.borrow_mut().push(format!("a:{msg}")));
/// let log = Rc::clone(&seen);
/// let _b = signal.connect(move |msg| log.borrow_mut().push(format!("b:{msg}")));
///
/// signal.emit("tick");
/// assert_eq!(*seen.borrow(), vec!["b:tick", "a:tick"]);
/// ```
pub struct Signal<A: ?Sized = ()> {
    shared: Rc<Shared<A>>,
}

impl<A: ?Sized> Signal<A> {
    /// Creates a signal with no connections.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared::new()),
        }
    }

    /// Connects a closure. It stays connected while the returned handle lives.
    pub fn connect<F>(&self, slot: F) -> Connection<A>
    where
        F: Fn(&A) + 'static,
    {
        self.connect_slot(slot)
    }

    /// Connects any [`Slot`] implementation.
    pub fn connect_slot<S>(&self, slot: S) -> Connection<A>
    where
        S: Slot<A> + 'static,
    {
        self.shared.connect(Rc::new(slot))
    }

    /// Invokes every connected slot with `args`.
    #[inline]
    pub fn emit(&self, args: &A) {
        self.shared.emit(args);
    }

    /// Counts connected slots. O(n).
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns `true` if no slot is connected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.shared.followers.is_linked()
    }

    /// Creates a non-owning handle that can fire and connect while this
    /// signal is alive.
    pub fn downgrade(&self) -> WeakSignal<A> {
        WeakSignal {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

impl<A: ?Sized> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> Drop for Signal<A> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<A: ?Sized> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.len())
            .field("emitting", &self.shared.innermost.get().is_some())
            .finish()
    }
}

/// A non-owning handle to a [`Signal`].
///
/// Lets slots fire or subscribe to a signal they do not own, including the
/// signal currently calling them. Once the signal is dropped, `emit` does
/// nothing and `connect` returns a disconnected handle.
///
/// # Example
///
/// ```
/// use nexus_signal::Signal;
///
/// let signal: Signal<u32> = Signal::new();
/// let weak = signal.downgrade();
/// assert!(weak.is_alive());
///
/// drop(signal);
/// assert!(!weak.is_alive());
/// weak.emit(&1);
/// assert!(!weak.connect(|_| {}).is_connected());
/// ```
pub struct WeakSignal<A: ?Sized = ()> {
    shared: Weak<Shared<A>>,
}

impl<A: ?Sized> WeakSignal<A> {
    /// Returns `true` while the signal has not been dropped.
    pub fn is_alive(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| shared.is_open())
    }

    /// Fires the signal if it is still alive.
    pub fn emit(&self, args: &A) {
        // the upgraded Rc keeps the shared state allocated even if a slot
        // drops the signal mid-emission
        if let Some(shared) = self.shared.upgrade() {
            shared.emit(args);
        }
    }

    /// Connects a closure if the signal is still alive.
    pub fn connect<F>(&self, slot: F) -> Connection<A>
    where
        F: Fn(&A) + 'static,
    {
        match self.shared.upgrade() {
            Some(shared) => shared.connect(Rc::new(slot)),
            None => Connection::default(),
        }
    }
}

impl<A: ?Sized> Clone for WeakSignal<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<A: ?Sized> Default for WeakSignal<A> {
    /// A handle that was never attached to a signal.
    fn default() -> Self {
        Self { shared: Weak::new() }
    }
}

impl<A: ?Sized> fmt::Debug for WeakSignal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSignal")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn Fn(&u32)>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&calls);
        let make = move |name: &'static str| {
            let log = Rc::clone(&log);
            Box::new(move |_: &u32| log.borrow_mut().push(name)) as Box<dyn Fn(&u32)>
        };
        (calls, make)
    }

    #[test]
    fn emit_without_connections_is_noop() {
        let signal: Signal<u32> = Signal::new();
        signal.emit(&1);
        assert!(signal.is_empty());
        assert_eq!(signal.len(), 0);
    }

    #[test]
    fn fires_most_recent_first() {
        let signal: Signal<u32> = Signal::new();
        let (calls, slot) = recorder();

        let _a = signal.connect(slot("a"));
        let _b = signal.connect(slot("b"));
        let _c = signal.connect(slot("c"));
        signal.emit(&0);

        assert_eq!(*calls.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn passes_arguments() {
        let signal: Signal<(u32, &'static str)> = Signal::new();
        let got = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&got);
        let _conn = signal.connect(move |&(n, s)| *sink.borrow_mut() = Some((n, s)));
        signal.emit(&(7, "seven"));

        assert_eq!(*got.borrow(), Some((7, "seven")));
    }

    #[test]
    fn unsized_arguments() {
        let signal: Signal<[u32]> = Signal::new();
        let total = Rc::new(Cell::new(0));

        let sum = Rc::clone(&total);
        let _conn = signal.connect(move |xs| sum.set(xs.iter().sum()));
        signal.emit(&[1, 2, 3]);

        assert_eq!(total.get(), 6);
    }

    #[test]
    fn frame_chain_empty_after_emit() {
        let signal: Signal<u32> = Signal::new();
        let _conn = signal.connect(|_| {});

        signal.emit(&0);

        assert!(signal.shared.innermost.get().is_none());
    }

    #[test]
    fn nested_frames_are_chained() {
        let signal: Signal<u32> = Signal::new();
        let weak = signal.downgrade();
        let depths = Rc::new(RefCell::new(Vec::new()));

        let seen = Rc::clone(&depths);
        let shared = Rc::downgrade(&signal.shared);
        let _conn = signal.connect(move |&n| {
            let shared = shared.upgrade().unwrap();
            seen.borrow_mut().push(shared.frames().count());
            if n > 0 {
                weak.emit(&(n - 1));
            }
        });
        signal.emit(&2);

        assert_eq!(*depths.borrow(), vec![1, 2, 3]);
        assert!(signal.shared.innermost.get().is_none());
    }

    #[test]
    fn close_marks_frames_and_detaches() {
        let signal: Signal<u32> = Signal::new();
        let (calls, slot) = recorder();
        let a = signal.connect(slot("a"));
        let b = signal.connect(slot("b"));

        signal.shared.close();

        assert!(signal.is_empty());
        assert!(!a.is_connected());
        assert!(!b.is_connected());

        signal.emit(&0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn closed_signal_refuses_connections() {
        let signal: Signal<u32> = Signal::new();
        signal.shared.close();

        let conn = signal.connect(|_| {});
        assert!(!conn.is_connected());
    }

    #[test]
    fn weak_handle_fires() {
        let signal: Signal<u32> = Signal::new();
        let (calls, slot) = recorder();
        let _a = signal.connect(slot("a"));

        let weak = signal.downgrade();
        weak.emit(&0);
        let _b = weak.connect(slot("b"));
        weak.emit(&0);

        assert_eq!(*calls.borrow(), vec!["a", "b", "a"]);
    }

    #[test]
    fn default_weak_is_dead() {
        let weak: WeakSignal<u32> = WeakSignal::default();
        assert!(!weak.is_alive());
        weak.emit(&0);
    }
}
