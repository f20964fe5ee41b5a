//! Single-threaded signals and slots.
//!
//! A [`Signal`] fans a call out to every connected slot. Each subscription is
//! held by a [`Connection`]; dropping the connection removes the slot.
//!
//! # Reentrancy
//!
//! Slots may do anything to the signal that is calling them:
//!
//! | From inside a slot            | Effect on the running emission         |
//! |-------------------------------|----------------------------------------|
//! | disconnect itself             | continues with the next slot           |
//! | disconnect a later slot       | that slot is skipped                   |
//! | connect a new slot            | not called until the next emission     |
//! | emit the same signal          | nested emission runs to completion     |
//! | move or take a connection     | slot keeps its place, fires at most once |
//! | drop the signal               | stops once the running slot returns    |
//!
//! A slot reaches the signal that is calling it through a [`WeakSignal`].
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use nexus_signal::{Connection, Signal};
//!
//! let signal: Signal<u32> = Signal::new();
//! let weak = signal.downgrade();
//! let once: Rc<RefCell<Connection<u32>>> = Rc::default();
//! let hits = Rc::new(RefCell::new(Vec::new()));
//!
//! // a slot that unsubscribes itself after the first call
//! let handle = Rc::clone(&once);
//! let log = Rc::clone(&hits);
//! *once.borrow_mut() = weak.connect(move |n| {
//!     log.borrow_mut().push(*n);
//!     handle.borrow_mut().disconnect();
//! });
//!
//! signal.emit(&1);
//! signal.emit(&2);
//! assert_eq!(*hits.borrow(), vec![1]);
//! assert!(signal.is_empty());
//! ```
//!
//! # Threading
//!
//! Signals, weak handles and connections are `!Send` and `!Sync`.

#![warn(missing_docs)]

mod connection;
mod signal;
mod slot;

pub use connection::Connection;
pub use signal::{Signal, WeakSignal};
pub use slot::Slot;
