//! Embedded prev/next links for intrusive doubly-linked lists.
//!
//! A [`Link`] lives inside the element it links. Lists are circular: every
//! list owns one sentinel link, and all member links plus the sentinel form a
//! single cycle. An unlinked link points at itself on both sides, so
//! "is linked" is just `next != self` and unlinking twice is harmless.
//!
//! # Address Invariant
//!
//! While a link is linked, its neighbours hold its address. It must not move
//! or be freed until it is unlinked again. Dropping a link unlinks it, so an
//! element that is dropped in place never leaves dangling neighbours.
//!
//! An unlinked link stores its self-loop as an absent pointer rather than its
//! own address, which keeps unlinked elements freely movable by value.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Tag for elements that participate in a single list.
///
/// Elements that sit in several independent lists embed one [`Link`] per
/// list, each with its own tag type.
pub enum DefaultTag {}

/// A prev/next link pair embedded in a list element.
///
/// # Example
///
/// ```
/// use nexus_intrusive::{impl_linked, Link, List};
///
/// struct Order {
///     id: u64,
///     link: Link,
/// }
///
/// impl_linked!(Order, link);
///
/// let a = Order { id: 1, link: Link::new() };
/// let b = Order { id: 2, link: Link::new() };
///
/// let list = List::new();
/// list.push_back(&a);
/// list.push_back(&b);
/// assert!(a.link.is_linked());
///
/// a.link.unlink();
/// let ids: Vec<_> = list.iter().map(|o| o.id).collect();
/// assert_eq!(ids, vec![2]);
/// ```
pub struct Link<Tag = DefaultTag> {
    // `None` means "points at self".
    next: Cell<Option<NonNull<Link<Tag>>>>,
    prev: Cell<Option<NonNull<Link<Tag>>>>,
    sentinel: bool,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> Link<Tag> {
    /// Creates an unlinked link.
    #[inline]
    pub const fn new() -> Self {
        Self {
            next: Cell::new(None),
            prev: Cell::new(None),
            sentinel: false,
            _tag: PhantomData,
        }
    }

    /// Creates the end marker of a list. Never embedded in an element.
    #[inline]
    pub(crate) const fn sentinel() -> Self {
        Self {
            next: Cell::new(None),
            prev: Cell::new(None),
            sentinel: true,
            _tag: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    /// Returns this link's address.
    ///
    /// The pointer only covers the link itself. Pointers that will later be
    /// turned back into elements must come from [`Linked::link_ptr`].
    #[inline]
    pub fn as_ptr(&self) -> NonNull<Self> {
        NonNull::from(self)
    }

    /// Returns `true` if the link is part of a cycle other than itself.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.next.get().is_some()
    }

    /// Returns the next link in the cycle, or this link if unlinked.
    #[inline]
    pub fn next(&self) -> NonNull<Self> {
        self.next.get().unwrap_or_else(|| self.as_ptr())
    }

    /// Returns the previous link in the cycle, or this link if unlinked.
    #[inline]
    pub fn prev(&self) -> NonNull<Self> {
        self.prev.get().unwrap_or_else(|| self.as_ptr())
    }

    /// Like [`next`](Self::next), but an unlinked link yields `this` itself,
    /// keeping the caller's pointer.
    ///
    /// # Safety
    ///
    /// `this` must point at a live link.
    #[inline]
    pub(crate) unsafe fn next_of(this: NonNull<Self>) -> NonNull<Self> {
        // Safety: caller guarantees `this` is live
        unsafe { this.as_ref() }.next.get().unwrap_or(this)
    }

    /// Like [`prev`](Self::prev), keeping `this` for an unlinked link.
    ///
    /// # Safety
    ///
    /// `this` must point at a live link.
    #[inline]
    pub(crate) unsafe fn prev_of(this: NonNull<Self>) -> NonNull<Self> {
        // Safety: caller guarantees `this` is live
        unsafe { this.as_ref() }.prev.get().unwrap_or(this)
    }

    #[inline]
    fn set_next(&self, next: NonNull<Self>) {
        self.next
            .set(if next == self.as_ptr() { None } else { Some(next) });
    }

    #[inline]
    fn set_prev(&self, prev: NonNull<Self>) {
        self.prev
            .set(if prev == self.as_ptr() { None } else { Some(prev) });
    }

    /// Makes `b` follow `a`.
    ///
    /// # Safety
    ///
    /// Both pointers must refer to live links.
    #[inline]
    unsafe fn join(a: NonNull<Self>, b: NonNull<Self>) {
        // SAFETY: caller guarantees both links are live
        unsafe {
            a.as_ref().set_next(b);
            b.as_ref().set_prev(a);
        }
    }

    /// Removes this link from its cycle. O(1), no-op if already unlinked.
    #[inline]
    pub fn unlink(&self) {
        let (Some(prev), Some(next)) = (self.prev.get(), self.next.get()) else {
            return;
        };

        // Safety: neighbours of a linked link are live (address invariant)
        unsafe { Self::join(prev, next) };

        self.next.set(None);
        self.prev.set(None);
    }

    /// Links `this` immediately before `pos`.
    ///
    /// If `this` is already linked it is unlinked first. `pos` may be a list
    /// sentinel, which makes `this` the new last element of that list.
    ///
    /// # Safety
    ///
    /// Both pointers must refer to live links that stay at their current
    /// addresses until they are unlinked, and must be unlinked (or dropped in
    /// place) before their memory is released. The neighbours keep `this`
    /// as given, so a link embedded in an element must be addressed through
    /// [`Linked::link_ptr`].
    #[inline]
    pub unsafe fn link_before(this: NonNull<Self>, pos: NonNull<Self>) {
        if this == pos {
            return;
        }

        // Safety: caller guarantees both links are live
        unsafe {
            this.as_ref().unlink();
            let prev = Self::prev_of(pos);
            Self::join(prev, this);
            Self::join(this, pos);
        }
    }

    /// Moves `src`'s position in its cycle to `this`.
    ///
    /// `this` is unlinked first. If `src` is linked, `this` takes its exact
    /// place (both neighbours are rebound to `this`) and `src` is left
    /// unlinked. If `src` is unlinked, `this` simply ends up unlinked.
    ///
    /// # Safety
    ///
    /// Same contract as [`link_before`](Self::link_before).
    #[inline]
    pub unsafe fn replace(this: NonNull<Self>, src: NonNull<Self>) {
        if this == src {
            return;
        }

        // Safety: caller guarantees both links are live, and neighbours of
        // a linked `src` are live
        unsafe {
            this.as_ref().unlink();
            let src = src.as_ref();
            let (Some(prev), Some(next)) = (src.prev.get(), src.next.get()) else {
                return;
            };
            Self::join(prev, this);
            Self::join(this, next);

            src.next.set(None);
            src.prev.set(None);
        }
    }

    /// Moves the half-open range `[first, last)` so it sits immediately
    /// before `pos`, purely by relinking.
    ///
    /// No-op when `pos == first` or `first == last`. The range may come from
    /// the same cycle as `pos` or from a different one.
    ///
    /// # Safety
    ///
    /// `first` must reach `last` by following `next` without passing a
    /// sentinel, `pos` must not lie inside `[first, last)`, and every link
    /// involved must uphold the [`link_before`](Self::link_before) contract.
    pub unsafe fn splice(pos: NonNull<Self>, first: NonNull<Self>, last: NonNull<Self>) {
        if pos == first || first == last {
            return;
        }

        // Safety: every pointer below is `pos`, `first`, `last` or one of
        // their live neighbours (caller contract)
        unsafe {
            let range_back = Self::prev_of(last);
            let before_range = Self::prev_of(first);
            let before_pos = Self::prev_of(pos);

            // close the gap the range leaves behind
            Self::join(before_range, last);

            // then open one in front of `pos`
            let before_pos = if before_pos == range_back {
                before_range
            } else {
                before_pos
            };
            Self::join(before_pos, first);
            Self::join(range_back, pos);
        }
    }
}

impl<Tag> Default for Link<Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tag> Drop for Link<Tag> {
    fn drop(&mut self) {
        self.unlink();
    }
}

impl<Tag> fmt::Debug for Link<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("addr", &self.as_ptr())
            .field("next", &self.next())
            .field("prev", &self.prev())
            .field("sentinel", &self.sentinel)
            .finish()
    }
}

/// Types that embed a [`Link`] and can be members of a [`List`](crate::List).
///
/// Use [`impl_linked!`](crate::impl_linked) rather than implementing this by
/// hand for plain structs.
///
/// # Safety
///
/// `link_ptr` must always address the same embedded field and derive its
/// result from `ptr`, so the link pointer keeps access to the whole element.
/// `from_link` must invert it exactly: given a pointer produced by
/// `link_ptr`, it returns the pointer to the enclosing `Self`.
pub unsafe trait Linked<Tag = DefaultTag>: Sized {
    /// Returns the embedded link of the element at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live `Self`.
    unsafe fn link_ptr(ptr: NonNull<Self>) -> NonNull<Link<Tag>>;

    /// Recovers the element from the address of its embedded link.
    ///
    /// # Safety
    ///
    /// `link` must come from [`link_ptr`](Self::link_ptr) on a live `Self`.
    unsafe fn from_link(link: NonNull<Link<Tag>>) -> NonNull<Self>;

    /// Returns the embedded link.
    #[inline]
    fn link(&self) -> &Link<Tag> {
        // Safety: `self` is live for the returned borrow
        unsafe { Self::link_ptr(NonNull::from(self)).as_ref() }
    }
}

/// Implements [`Linked`] for a struct by naming its [`Link`] field.
///
/// ```
/// use nexus_intrusive::{impl_linked, Link};
///
/// enum ByPrice {}
/// enum ByTime {}
///
/// struct Order {
///     price: Link<ByPrice>,
///     time: Link<ByTime>,
///     qty: u64,
/// }
///
/// impl_linked!(Order, price, ByPrice);
/// impl_linked!(Order, time, ByTime);
/// ```
#[macro_export]
macro_rules! impl_linked {
    ($ty:ty, $field:ident) => {
        $crate::impl_linked!($ty, $field, $crate::DefaultTag);
    };
    ($ty:ty, $field:ident, $tag:ty) => {
        // SAFETY: `link_ptr` projects `$field` out of the element pointer and
        // `from_link` undoes that projection
        unsafe impl $crate::Linked<$tag> for $ty {
            #[inline]
            unsafe fn link_ptr(
                ptr: ::core::ptr::NonNull<Self>,
            ) -> ::core::ptr::NonNull<$crate::Link<$tag>> {
                // SAFETY: caller guarantees `ptr` is a live `$ty`
                unsafe {
                    ::core::ptr::NonNull::new_unchecked(::core::ptr::addr_of_mut!(
                        (*ptr.as_ptr()).$field
                    ))
                }
            }

            #[inline]
            unsafe fn from_link(
                link: ::core::ptr::NonNull<$crate::Link<$tag>>,
            ) -> ::core::ptr::NonNull<Self> {
                let offset = ::core::mem::offset_of!($ty, $field);
                // SAFETY: caller guarantees `link` is the field of a live `$ty`
                unsafe {
                    ::core::ptr::NonNull::new_unchecked(
                        link.as_ptr().cast::<u8>().sub(offset).cast::<Self>(),
                    )
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked_pair(a: &Link, b: &Link) -> bool {
        a.next() == b.as_ptr() && b.prev() == a.as_ptr()
    }

    #[test]
    fn new_link_is_self_loop() {
        let link: Link = Link::new();
        assert!(!link.is_linked());
        assert_eq!(link.next(), link.as_ptr());
        assert_eq!(link.prev(), link.as_ptr());
    }

    #[test]
    fn link_before_forms_cycle() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::link_before(b.as_ptr(), head.as_ptr());
        }

        // head -> a -> b -> head
        assert!(linked_pair(&head, &a));
        assert!(linked_pair(&a, &b));
        assert!(linked_pair(&b, &head));
        assert!(head.is_linked());
    }

    #[test]
    fn unlink_is_idempotent() {
        let head: Link = Link::new();
        let a: Link = Link::new();

        unsafe { Link::link_before(a.as_ptr(), head.as_ptr()) };
        a.unlink();
        a.unlink();

        assert!(!a.is_linked());
        assert!(!head.is_linked());
        assert_eq!(head.next(), head.as_ptr());
    }

    #[test]
    fn unlink_middle() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();
        let c: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::link_before(b.as_ptr(), head.as_ptr());
            Link::link_before(c.as_ptr(), head.as_ptr());
        }
        b.unlink();

        assert!(linked_pair(&a, &c));
        assert_eq!(b.next(), b.as_ptr());
        assert_eq!(b.prev(), b.as_ptr());
    }

    #[test]
    fn relinking_moves_link() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::link_before(b.as_ptr(), head.as_ptr());
            // a is already linked: moves behind b
            Link::link_before(a.as_ptr(), head.as_ptr());
        }

        assert!(linked_pair(&head, &b));
        assert!(linked_pair(&b, &a));
        assert!(linked_pair(&a, &head));
    }

    #[test]
    fn replace_takes_position() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();
        let c: Link = Link::new();
        let moved: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::link_before(b.as_ptr(), head.as_ptr());
            Link::link_before(c.as_ptr(), head.as_ptr());
            Link::replace(moved.as_ptr(), b.as_ptr());
        }

        assert!(linked_pair(&a, &moved));
        assert!(linked_pair(&moved, &c));
        assert!(!b.is_linked());
    }

    #[test]
    fn replace_from_unlinked_leaves_unlinked() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let src: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::replace(a.as_ptr(), src.as_ptr());
        }

        // a lost its old place and src had none to give
        assert!(!a.is_linked());
        assert!(!head.is_linked());
    }

    #[test]
    fn replace_sole_element() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::replace(b.as_ptr(), a.as_ptr());
        }

        assert!(linked_pair(&head, &b));
        assert!(linked_pair(&b, &head));
        assert!(!a.is_linked());
    }

    #[test]
    fn splice_between_cycles() {
        let h1: Link = Link::new();
        let h2: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();
        let c: Link = Link::new();
        let x: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), h1.as_ptr());
            Link::link_before(b.as_ptr(), h1.as_ptr());
            Link::link_before(c.as_ptr(), h1.as_ptr());
            Link::link_before(x.as_ptr(), h2.as_ptr());

            // move [a, c) in front of x
            Link::splice(x.as_ptr(), a.as_ptr(), c.as_ptr());
        }

        assert!(linked_pair(&h1, &c));
        assert!(linked_pair(&c, &h1));
        assert!(linked_pair(&h2, &a));
        assert!(linked_pair(&a, &b));
        assert!(linked_pair(&b, &x));
        assert!(linked_pair(&x, &h2));
    }

    #[test]
    fn splice_whole_cycle_empties_source() {
        let h1: Link = Link::new();
        let h2: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), h1.as_ptr());
            Link::link_before(b.as_ptr(), h1.as_ptr());
            Link::splice(h2.as_ptr(), a.as_ptr(), h1.as_ptr());
        }

        assert!(!h1.is_linked());
        assert!(linked_pair(&h2, &a));
        assert!(linked_pair(&a, &b));
        assert!(linked_pair(&b, &h2));
    }

    #[test]
    fn splice_to_range_end_is_noop() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        let b: Link = Link::new();
        let c: Link = Link::new();

        unsafe {
            Link::link_before(a.as_ptr(), head.as_ptr());
            Link::link_before(b.as_ptr(), head.as_ptr());
            Link::link_before(c.as_ptr(), head.as_ptr());
            Link::splice(c.as_ptr(), a.as_ptr(), c.as_ptr());
        }

        assert!(linked_pair(&head, &a));
        assert!(linked_pair(&a, &b));
        assert!(linked_pair(&b, &c));
        assert!(linked_pair(&c, &head));
    }

    #[test]
    fn drop_unlinks() {
        let head: Link = Link::new();
        let a: Link = Link::new();
        {
            let b: Link = Link::new();
            unsafe {
                Link::link_before(a.as_ptr(), head.as_ptr());
                Link::link_before(b.as_ptr(), head.as_ptr());
            }
        }

        assert!(linked_pair(&a, &head));
        assert!(linked_pair(&head, &a));
    }

    #[test]
    fn sentinel_is_marked() {
        let head: Link = Link::sentinel();
        let a: Link = Link::new();

        assert!(head.is_sentinel());
        assert!(!a.is_sentinel());

        unsafe { Link::link_before(a.as_ptr(), head.as_ptr()) };
        assert!(linked_pair(&head, &a));
        assert!(head.is_sentinel());
    }
}
