//! Collection types for protobuf messages.
//!
//! - [`RepeatedField<'a, T>`]: a growable array whose storage lives in an
//!   [`Arena`]
//! - [`UnknownFields<'a>`]: raw spans of fields the layout does not know
//!
//! These types never run destructors. Memory is released when the arena is
//! dropped.
//!
//! # Example
//!
//! ```
//! use pbarena::{arena::Arena, containers::RepeatedField};
//! use allocator_api2::alloc::Global;
//!
//! let arena = Arena::new(&Global);
//! let mut numbers = RepeatedField::<u64>::new();
//! numbers.push(1, &arena).unwrap();
//! numbers.push(2, &arena).unwrap();
//! assert_eq!(&numbers[..], &[1, 2]);
//! ```

use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::arena::{AllocError, Arena};

/// Raw tag + payload spans of fields skipped during decoding.
pub type UnknownFields<'a> = RepeatedField<'a, &'a [u8]>;

pub struct RepeatedField<'a, T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    phantom: PhantomData<&'a mut [T]>,
}

// Safety: RepeatedField uniquely owns its elements, exactly like &'a mut [T].
unsafe impl<T: Send> Send for RepeatedField<'_, T> {}
unsafe impl<T: Sync> Sync for RepeatedField<'_, T> {}

impl<'a, T> RepeatedField<'a, T> {
    pub const fn new() -> Self {
        RepeatedField {
            ptr: NonNull::dangling(),
            len: 0,
            cap: if core::mem::size_of::<T>() == 0 { usize::MAX } else { 0 },
            phantom: PhantomData,
        }
    }

    pub fn from_slice(slice: &[T], arena: &'a Arena) -> Result<Self, AllocError>
    where
        T: Copy,
    {
        let mut rf = Self::new();
        rf.extend_from_slice(slice, arena)?;
        Ok(rf)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_slice(&self) -> &[T] {
        // Safety: the first len elements are initialized; ptr is dangling but
        // aligned when len == 0.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // Safety: see as_slice.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Gives up the container and returns its elements with the arena lifetime.
    pub fn into_slice(self) -> &'a mut [T] {
        // Safety: the storage is arena memory that lives for 'a and is no
        // longer reachable through self.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn push(&mut self, elem: T, arena: &'a Arena) -> Result<(), AllocError> {
        const { assert!(!core::mem::needs_drop::<T>(), "arena values are never dropped") };
        if self.len == self.cap {
            self.grow(0, arena)?;
        }
        // Safety: len < cap after growing.
        unsafe { self.ptr.as_ptr().add(self.len).write(elem) };
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // Safety: the element at len was initialized and is now logically moved out.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.as_mut_slice().last_mut()
    }

    /// Shortens the array; capacity is kept for later growth.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn reserve(&mut self, additional: usize, arena: &'a Arena) -> Result<(), AllocError> {
        let needed = self.len.checked_add(additional).ok_or(AllocError)?;
        if needed > self.cap {
            self.grow(needed, arena)?;
        }
        Ok(())
    }

    pub fn extend_from_slice(&mut self, slice: &[T], arena: &'a Arena) -> Result<(), AllocError>
    where
        T: Copy,
    {
        self.reserve(slice.len(), arena)?;
        // Safety: capacity covers len + slice.len(); slice can't alias our
        // uninitialized tail.
        unsafe {
            ptr::copy_nonoverlapping(slice.as_ptr(), self.ptr.as_ptr().add(self.len), slice.len());
        }
        self.len += slice.len();
        Ok(())
    }

    /// Resizes to `new_len`, filling new slots with values produced by `f`.
    ///
    /// On failure the elements pushed so far are kept, so the caller observes
    /// a length between the old and the requested one.
    pub fn resize_with(
        &mut self,
        new_len: usize,
        arena: &'a Arena,
        mut f: impl FnMut() -> Result<T, AllocError>,
    ) -> Result<(), AllocError> {
        if new_len <= self.len {
            self.truncate(new_len);
            return Ok(());
        }
        self.reserve(new_len - self.len, arena)?;
        while self.len < new_len {
            let value = f()?;
            self.push(value, arena)?;
        }
        Ok(())
    }

    #[inline(never)]
    fn grow(&mut self, min_cap: usize, arena: &'a Arena) -> Result<(), AllocError> {
        // Zero sized types start out with usize::MAX capacity, so getting here
        // means the array is overfull.
        if core::mem::size_of::<T>() == 0 {
            return Err(AllocError);
        }
        let new_cap = if self.cap == 0 { 4 } else { self.cap.checked_mul(2).ok_or(AllocError)? };
        let new_cap = new_cap.max(min_cap);
        let layout = Layout::array::<T>(new_cap).map_err(|_| AllocError)?;
        let new_ptr = arena.alloc_layout(layout)?.cast::<T>();
        // Safety: the new block is disjoint from the old one and large enough
        // for len elements. The old block stays allocated until the arena dies.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len) };
        self.ptr = new_ptr;
        self.cap = new_cap;
        Ok(())
    }
}

impl<T> Default for RepeatedField<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for RepeatedField<'_, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for RepeatedField<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: PartialEq> PartialEq for RepeatedField<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq> PartialEq<[T]> for RepeatedField<'_, T> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq> Eq for RepeatedField<'_, T> {}

impl<T: Debug> Debug for RepeatedField<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_slice().fmt(f)
    }
}

impl<'r, T> IntoIterator for &'r RepeatedField<'_, T> {
    type Item = &'r T;
    type IntoIter = core::slice::Iter<'r, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'r, T> IntoIterator for &'r mut RepeatedField<'_, T> {
    type Item = &'r mut T;
    type IntoIter = core::slice::IterMut<'r, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}
