use alloc::fmt;

use crate::Vec;

/// The value stack shared by every frame of one call chain.
///
/// Frames address their slots absolutely (`base + offset`), so besides the
/// usual push/pop this exposes indexed access and truncation to a frame base.
/// Growth is unbounded here; recursion depth is bounded by the frame limit.
///
/// ```ignore
/// use tessel_core::vm::Stack;
///
/// let mut stack = Stack::with_capacity(16);
/// stack.push(1);
/// stack.push(2);
/// assert_eq!(stack.top_n(2), Some(&[1, 2][..]));
/// stack.truncate(1);
/// assert_eq!(stack.pop(), Some(1));
/// ```
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Stack<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    #[inline]
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Allocated slots; kept across `clear` so pooled stacks stay warm.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Drops everything at or above `len`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Slot at an absolute index (counted from the bottom).
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// The top `n` elements, bottom first. `None` if there are fewer than `n`.
    #[inline]
    pub fn top_n(&self, n: usize) -> Option<&[T]> {
        let len = self.items.len();
        if n > len {
            None
        } else {
            Some(&self.items[len - n..])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> Stack<T> {
    /// Pushes `count` copies of `value`.
    pub fn push_n(&mut self, count: usize, value: T) {
        let len = self.items.len();
        self.items.resize(len + count, value);
    }

    /// Pushes every element of `values`, in order.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.items.extend_from_slice(values);
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
