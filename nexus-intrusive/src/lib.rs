//! Intrusive doubly-linked lists.
//!
//! Elements embed their own prev/next links, so list membership costs no
//! allocation and every structural operation is O(1) pointer relinking.
//!
//! # Design Philosophy
//!
//! Owning collections copy or box every element:
//!
//! ```text
//! LinkedList<T>  - allocates a node per element, owns the data
//! Vec<T>         - indices shift on removal, no stable positions
//! ```
//!
//! An intrusive list owns nothing but a sentinel:
//!
//! ```text
//! Element (owned elsewhere) - embeds Link<Tag>, stable address
//! List                      - sentinel + cycle of links, no element memory
//! ```
//!
//! Benefits:
//! - **Zero allocation**: linking and unlinking never allocate
//! - **O(1) everything**: insert, erase, splice, relocate
//! - **Self-removal**: an element can unlink itself without the list
//! - **Multiple memberships**: one [`Link`] per tag type
//!
//! # Quick Start
//!
//! ```
//! use nexus_intrusive::{impl_linked, Link, List};
//!
//! struct Timer {
//!     deadline: u64,
//!     link: Link,
//! }
//!
//! impl_linked!(Timer, link);
//!
//! let a = Timer { deadline: 10, link: Link::new() };
//! let b = Timer { deadline: 20, link: Link::new() };
//!
//! let wheel = List::new();
//! wheel.push_back(&a);
//! wheel.push_back(&b);
//!
//! // O(1) removal without touching the list
//! a.link.unlink();
//! assert_eq!(wheel.front().map(|t| t.deadline), Some(20));
//! ```
//!
//! # Structure
//!
//! ```text
//!        ┌──────────────────────────────────────────┐
//!        ▼                                          │
//!   [sentinel] ⇄ [elem 0] ⇄ [elem 1] ⇄ ... ⇄ [elem n]
//! ```
//!
//! The sentinel is the `end()` position. An empty list is a sentinel linked
//! to itself; an unlinked element is likewise its own neighbour.
//!
//! # Raw Links
//!
//! [`Link`] also exposes `unsafe` relinking primitives for containers whose
//! members are owned through raw pointers rather than borrowed, such as
//! heap-allocated subscription nodes. Those callers take over the address
//! invariant documented on [`Link`], and pass link pointers obtained through
//! [`Linked::link_ptr`] so the element can be recovered from them.

#![warn(missing_docs)]

pub mod link;
pub mod list;

pub use link::{DefaultTag, Link, Linked};
pub use list::{Cursor, Iter, List};
