//! Circular intrusive list with a boxed sentinel.
//!
//! The list owns only its sentinel link. Elements are borrowed for `'a` and
//! embed their own [`Link`]; the borrow keeps every member alive and in place
//! for as long as the list can reach it. Dropping the list unlinks everything.
//!
//! Linking goes through `&self`: links are `Cell`s, so cursors (which borrow
//! the list) can coexist with inserts and erases, just like positional
//! iterators into a C-style list. A cursor parked on an element that gets
//! erased still refers to a live element; it just walks a self-loop.
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{impl_linked, Link, List};
//!
//! struct Task {
//!     id: u32,
//!     link: Link,
//! }
//!
//! impl_linked!(Task, link);
//!
//! let tasks: Vec<Task> = (0..4).map(|id| Task { id, link: Link::new() }).collect();
//! let list = List::new();
//! for task in &tasks {
//!     list.push_back(task);
//! }
//!
//! // Erase returns the successor
//! let next = list.erase(list.begin());
//! assert_eq!(next.get().map(|t| t.id), Some(1));
//!
//! let ids: Vec<_> = list.iter().map(|t| t.id).collect();
//! assert_eq!(ids, vec![1, 2, 3]);
//! ```
//!
//! # Moving Between Lists
//!
//! ```
//! use nexus_intrusive::{impl_linked, Link, List};
//!
//! struct Order {
//!     qty: u64,
//!     link: Link,
//! }
//!
//! impl_linked!(Order, link);
//!
//! let orders: Vec<Order> = (1..=3).map(|qty| Order { qty, link: Link::new() }).collect();
//! let level_100 = List::new();
//! let level_101 = List::new();
//! for order in &orders {
//!     level_100.push_back(order);
//! }
//!
//! // Move everything but the last order, O(1)
//! let last = level_100.cursor_at(&orders[2]);
//! level_101.splice(level_101.end(), &level_100, level_100.begin(), last);
//!
//! assert_eq!(level_100.len(), 1);
//! assert_eq!(level_101.iter().map(|o| o.qty).sum::<u64>(), 3);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{DefaultTag, Link, Linked};

/// An intrusive doubly-linked list over borrowed elements.
///
/// # Type Parameters
///
/// - `'a`: how long the members are borrowed
/// - `T`: element type, embedding a `Link<Tag>`
/// - `Tag`: selects which embedded link this list uses
pub struct List<'a, T, Tag = DefaultTag>
where
    T: Linked<Tag>,
{
    // heap sentinel, owned; stays put while the list value moves
    head: NonNull<Link<Tag>>,
    _owns: PhantomData<Box<Link<Tag>>>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T, Tag> Default for List<'a, T, Tag>
where
    T: Linked<Tag>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, Tag> List<'a, T, Tag>
where
    T: Linked<Tag>,
{
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            head: NonNull::from(Box::leak(Box::new(Link::sentinel()))),
            _owns: PhantomData,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn head(&self) -> &Link<Tag> {
        // Safety: the sentinel is freed only in `Drop`
        unsafe { self.head.as_ref() }
    }

    /// Returns `true` if the list has no elements. O(1).
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.head().is_linked()
    }

    /// Counts the elements. O(n).
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Cursor at the first element, or `end()` if empty.
    #[inline]
    pub fn begin(&self) -> Cursor<'_, 'a, T, Tag> {
        self.end().next_cursor()
    }

    /// Cursor at the sentinel, one past the last element.
    #[inline]
    pub fn end(&self) -> Cursor<'_, 'a, T, Tag> {
        Cursor {
            node: self.head,
            end: self.head,
            _marker: PhantomData,
        }
    }

    /// Cursor at `elem`.
    ///
    /// `elem` should be a member of this list. A cursor at a non-member walks
    /// whatever list `elem` is in, and reports `end()` of this list once it
    /// steps off that list's members.
    #[inline]
    pub fn cursor_at(&self, elem: &'a T) -> Cursor<'_, 'a, T, Tag> {
        Cursor {
            node: link_of(elem),
            end: self.head,
            _marker: PhantomData,
        }
    }

    /// Returns the first element.
    #[inline]
    pub fn front(&self) -> Option<&'a T> {
        self.begin().get()
    }

    /// Returns the last element.
    #[inline]
    pub fn back(&self) -> Option<&'a T> {
        self.end().prev_cursor().get()
    }

    /// Links `elem` immediately before `pos` and returns a cursor at it.
    ///
    /// `pos` may be `end()`. An `elem` that is already linked somewhere is
    /// unlinked first.
    pub fn insert(&self, pos: Cursor<'_, 'a, T, Tag>, elem: &'a T) -> Cursor<'_, 'a, T, Tag> {
        let node = link_of(elem);
        // Safety: `pos` is a live sentinel or a member borrowed for 'a, and
        // `elem` is borrowed for 'a, which outlives the list.
        unsafe { Link::link_before(node, pos.node) };
        self.cursor_at(elem)
    }

    /// Unlinks the element at `pos` and returns a cursor at its successor.
    ///
    /// Erasing `end()` is a no-op that returns `end()`.
    pub fn erase(&self, pos: Cursor<'_, 'a, T, Tag>) -> Cursor<'_, 'a, T, Tag> {
        let Some(elem) = pos.get() else {
            return self.end();
        };
        let next = pos.next_cursor();
        elem.link().unlink();
        match next.get() {
            Some(next) => self.cursor_at(next),
            None => self.end(),
        }
    }

    /// Links `elem` as the first element.
    #[inline]
    pub fn push_front(&self, elem: &'a T) {
        self.insert(self.begin(), elem);
    }

    /// Links `elem` as the last element.
    #[inline]
    pub fn push_back(&self, elem: &'a T) {
        self.insert(self.end(), elem);
    }

    /// Unlinks and returns the first element.
    pub fn pop_front(&self) -> Option<&'a T> {
        let front = self.front()?;
        front.link().unlink();
        Some(front)
    }

    /// Unlinks and returns the last element.
    pub fn pop_back(&self) -> Option<&'a T> {
        let back = self.back()?;
        back.link().unlink();
        Some(back)
    }

    /// Moves `[first, last)` out of `other` and links it before `pos`.
    ///
    /// Pure relinking: nothing is copied, and cursors into the moved range
    /// stay valid, now denoting members of this list. `other` may be `self`.
    /// No-op when `pos == first` or `first == last`.
    ///
    /// `first..last` must be a forward range of `other` and `pos` must lie
    /// outside it. Breaking that leaves the lists scrambled, though never
    /// dangling.
    pub fn splice(
        &self,
        pos: Cursor<'_, 'a, T, Tag>,
        other: &List<'a, T, Tag>,
        first: Cursor<'_, 'a, T, Tag>,
        last: Cursor<'_, 'a, T, Tag>,
    ) {
        debug_assert!(
            first == last || first.node != other.head,
            "splice range starts at the sentinel"
        );

        // Safety: all three cursors sit on sentinels of live lists or on
        // members borrowed for 'a
        unsafe { Link::splice(pos.node, first.node, last.node) };
    }

    /// Moves every element of `other` to the back of this list.
    pub fn append(&self, other: &List<'a, T, Tag>) {
        self.splice(self.end(), other, other.begin(), other.end());
    }

    /// Moves every element into a new list, leaving this one empty. O(1).
    pub fn take(&mut self) -> Self {
        let taken = Self::new();
        taken.append(self);
        taken
    }

    /// Puts `new` in `old`'s exact position and unlinks `old`.
    ///
    /// If `old` is not linked, `new` ends up unlinked as well.
    pub fn replace(&self, old: &'a T, new: &'a T) {
        // Safety: both elements are borrowed for 'a
        unsafe { Link::replace(link_of(new), link_of(old)) };
    }

    /// Unlinks every element.
    pub fn clear(&self) {
        while self.pop_back().is_some() {}
    }

    /// Iterates the elements front to back.
    #[inline]
    pub fn iter(&self) -> Iter<'_, 'a, T, Tag> {
        Iter {
            front: self.begin().node,
            back: self.end().prev_cursor().node,
            end: self.head,
            _marker: PhantomData,
        }
    }
}

impl<'a, T, Tag> Drop for List<'a, T, Tag>
where
    T: Linked<Tag>,
{
    fn drop(&mut self) {
        self.clear();
        // Safety: allocated in `new`; the link unlinks itself on drop
        drop(unsafe { Box::from_raw(self.head.as_ptr()) });
    }
}

impl<'a, T, Tag> fmt::Debug for List<'a, T, Tag>
where
    T: Linked<Tag> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'l, 'a, T, Tag> IntoIterator for &'l List<'a, T, Tag>
where
    T: Linked<Tag>,
{
    type Item = &'a T;
    type IntoIter = Iter<'l, 'a, T, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Link pointer of `elem`, derived from the element so it can be turned back
/// into `&T` later.
#[inline]
fn link_of<T: Linked<Tag>, Tag>(elem: &T) -> NonNull<Link<Tag>> {
    // Safety: `elem` is a live reference
    unsafe { T::link_ptr(NonNull::from(elem)) }
}

/// Follows one step from `from` and maps any sentinel to `end`.
///
/// Members of other lists are fine to land on, but a sentinel of another list
/// may be freed while we hold it, so it is never kept.
///
/// # Safety
///
/// `from` must be `end` or a link inside an element that is still alive.
#[inline]
unsafe fn step<Tag>(
    from: NonNull<Link<Tag>>,
    end: NonNull<Link<Tag>>,
    forward: bool,
) -> NonNull<Link<Tag>> {
    // Safety: `from` is live, and so is every link in its cycle
    unsafe {
        let to = if forward {
            Link::next_of(from)
        } else {
            Link::prev_of(from)
        };
        if to.as_ref().is_sentinel() {
            end
        } else {
            to
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A position in a [`List`]: an element or the `end()` sentinel.
///
/// Cursors are plain values. They borrow the list, not each other, so any
/// number can be held while the list is being relinked. Stepping past
/// `end()` wraps around to `begin()`.
///
/// A cursor only ever rests on an element or on its own list's `end()`. If
/// its element is moved to another list, it follows the element and reports
/// `end()` of its own list when it walks off the other list's members.
pub struct Cursor<'l, 'a, T, Tag = DefaultTag> {
    node: NonNull<Link<Tag>>,
    end: NonNull<Link<Tag>>,
    _marker: PhantomData<(&'l Link<Tag>, &'a T)>,
}

impl<'l, 'a, T, Tag> Clone for Cursor<'l, 'a, T, Tag> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'l, 'a, T, Tag> Copy for Cursor<'l, 'a, T, Tag> {}

impl<'l, 'a, T, Tag> PartialEq for Cursor<'l, 'a, T, Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<'l, 'a, T, Tag> Eq for Cursor<'l, 'a, T, Tag> {}

impl<'l, 'a, T, Tag> fmt::Debug for Cursor<'l, 'a, T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("node", &self.node)
            .field("is_end", &self.is_end())
            .finish()
    }
}

impl<'l, 'a, T, Tag> Cursor<'l, 'a, T, Tag> {
    /// Returns `true` if the cursor is at the sentinel.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.node == self.end
    }

    /// Advances to the next position.
    #[inline]
    pub fn move_next(&mut self) {
        // Safety: the node is our sentinel, alive for 'l, or an element,
        // alive for 'a
        self.node = unsafe { step(self.node, self.end, true) };
    }

    /// Steps back to the previous position.
    #[inline]
    pub fn move_prev(&mut self) {
        // Safety: as in `move_next`
        self.node = unsafe { step(self.node, self.end, false) };
    }

    /// Returns the cursor one step forward.
    #[inline]
    #[must_use]
    pub fn next_cursor(mut self) -> Self {
        self.move_next();
        self
    }

    /// Returns the cursor one step back.
    #[inline]
    #[must_use]
    pub fn prev_cursor(mut self) -> Self {
        self.move_prev();
        self
    }

    /// Moves `n` steps, backwards when `n` is negative.
    pub fn advance_by(&mut self, n: isize) {
        for _ in 0..n.unsigned_abs() {
            if n < 0 {
                self.move_prev();
            } else {
                self.move_next();
            }
        }
    }
}

impl<'l, 'a, T, Tag> Cursor<'l, 'a, T, Tag>
where
    T: Linked<Tag>,
{
    /// Returns the element, or `None` at `end()`.
    #[inline]
    pub fn get(&self) -> Option<&'a T> {
        if self.is_end() {
            None
        } else {
            // Safety: off `end`, the node is always an element's link
            // obtained from `link_ptr`, and elements live for 'a
            Some(unsafe { T::from_link(self.node).as_ref() })
        }
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// Front-to-back iterator over list elements.
///
/// Stops early if the element it is about to yield has been unlinked, or once
/// it walks onto any sentinel.
pub struct Iter<'l, 'a, T, Tag = DefaultTag> {
    front: NonNull<Link<Tag>>,
    back: NonNull<Link<Tag>>,
    end: NonNull<Link<Tag>>,
    _marker: PhantomData<(&'l Link<Tag>, &'a T)>,
}

impl<'l, 'a, T, Tag> Iter<'l, 'a, T, Tag> {
    #[inline]
    fn finish(&mut self) {
        self.front = self.end;
        self.back = self.end;
    }

    /// Takes `node` as the next item, or ends if it was unlinked meanwhile.
    #[inline]
    fn claim(&mut self, node: NonNull<Link<Tag>>, forward: bool) -> Option<NonNull<Link<Tag>>> {
        if node == self.end {
            return None;
        }
        // Safety: off `end`, nodes are element links alive for 'a
        if !unsafe { node.as_ref() }.is_linked() {
            self.finish();
            return None;
        }

        if self.front == self.back {
            self.finish();
        } else if forward {
            // Safety: as above
            self.front = unsafe { step(node, self.end, true) };
        } else {
            // Safety: as above
            self.back = unsafe { step(node, self.end, false) };
        }
        Some(node)
    }
}

impl<'l, 'a, T, Tag> Iterator for Iter<'l, 'a, T, Tag>
where
    T: Linked<Tag>,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.claim(self.front, true)?;
        // Safety: `claim` only returns element links
        Some(unsafe { T::from_link(node).as_ref() })
    }
}

impl<'l, 'a, T, Tag> DoubleEndedIterator for Iter<'l, 'a, T, Tag>
where
    T: Linked<Tag>,
{
    fn next_back(&mut self) -> Option<&'a T> {
        let node = self.claim(self.back, false)?;
        // Safety: `claim` only returns element links
        Some(unsafe { T::from_link(node).as_ref() })
    }
}
