// Arena allocates memory for protobuf objects which is freed all at once.
// Every allocation borrows the arena, so the borrow checker guarantees that no
// message outlives the memory backing it. Small allocations are batched into
// blocks requested from a dyn Allocator, which keeps Arena a non-generic type
// while still letting users pick the allocator.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::{self, NonNull};

use allocator_api2::alloc::Allocator;

const FIRST_BLOCK_SIZE: usize = 256;
const MAX_BLOCK_SIZE: usize = 64 * 1024;
const BLOCK_ALIGN: usize = 16;

/// The arena could not provide the requested memory, either because the
/// underlying allocator failed or because the arena's byte limit was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("arena allocation failed")]
pub struct AllocError;

// Header at the start of every block obtained from the allocator.
struct MemBlock {
    prev: Option<NonNull<MemBlock>>,
    layout: Layout,
}

// An arena adopted through `Arena::fuse`, stored inside the adopting arena.
struct FusedArena {
    arena: Arena,
    next: Option<NonNull<FusedArena>>,
}

pub struct Arena {
    allocator: &'static dyn Allocator,
    current: Cell<Option<NonNull<MemBlock>>>,
    ptr: Cell<NonNull<u8>>,
    end: Cell<NonNull<u8>>,
    next_block_size: Cell<usize>,
    allocated: Cell<usize>,
    limit: usize,
    fused: Cell<Option<NonNull<FusedArena>>>,
}

impl Arena {
    pub fn new(allocator: &'static dyn Allocator) -> Self {
        Self::with_limit(allocator, usize::MAX)
    }

    /// Creates an arena that never requests more than `limit` bytes in total
    /// from `allocator`. Requests beyond that fail with [`AllocError`].
    pub fn with_limit(allocator: &'static dyn Allocator, limit: usize) -> Self {
        Arena {
            allocator,
            current: Cell::new(None),
            ptr: Cell::new(NonNull::dangling()),
            end: Cell::new(NonNull::dangling()),
            next_block_size: Cell::new(FIRST_BLOCK_SIZE),
            allocated: Cell::new(0),
            limit,
            fused: Cell::new(None),
        }
    }

    /// Bytes obtained from the allocator, including fused arenas.
    pub fn space_allocated(&self) -> usize {
        let mut total = self.allocated.get();
        let mut node = self.fused.get();
        while let Some(fused) = node {
            // Safety: fused nodes stay valid until `release`.
            let fused = unsafe { fused.as_ref() };
            total += fused.arena.space_allocated();
            node = fused.next;
        }
        total
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if let Some(ptr) = self.bump(layout) {
            return Ok(ptr);
        }
        self.alloc_slow(layout)
    }

    pub fn alloc<T>(&self, value: T) -> Result<&mut T, AllocError> {
        const { assert!(!core::mem::needs_drop::<T>(), "arena values are never dropped") };
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();
        // Safety: ptr is fresh, properly aligned and sized for T.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Result<&mut [T], AllocError> {
        let layout = Layout::array::<T>(src.len()).map_err(|_| AllocError)?;
        let ptr = self.alloc_layout(layout)?.cast::<T>();
        // Safety: the destination was just allocated for `src.len()` elements
        // and cannot overlap `src`.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Ok(core::slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    pub fn alloc_str(&self, s: &str) -> Result<&mut str, AllocError> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;
        // Safety: bytes is a verbatim copy of a valid str.
        Ok(unsafe { core::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Adopts `other` so that its memory is released together with `self`,
    /// and returns it borrowed for as long as `self`. Messages allocated
    /// through the returned arena can be referenced by messages of `self`.
    ///
    /// If the bookkeeping allocation fails, `other` is dropped right away.
    pub fn fuse(&self, other: Arena) -> Result<&Arena, AllocError> {
        let node = self
            .alloc_layout(Layout::new::<FusedArena>())?
            .cast::<FusedArena>();
        // Safety: node is fresh memory sized for a FusedArena; it is dropped
        // in place by `release`, which needs `&mut self`, so the returned
        // borrow cannot outlive it.
        unsafe {
            node.as_ptr().write(FusedArena {
                arena: other,
                next: self.fused.get(),
            });
            self.fused.set(Some(node));
            Ok(&(*node.as_ptr()).arena)
        }
    }

    /// Releases all memory. Needs exclusive access, so no allocation from
    /// this arena can still be alive.
    pub fn reset(&mut self) {
        self.release();
    }

    fn bump(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.ptr.get();
        let remaining = self.end.get().as_ptr() as usize - ptr.as_ptr() as usize;
        let pad = ptr.as_ptr().align_offset(layout.align());
        if pad > remaining || layout.size() > remaining - pad {
            return None;
        }
        // Safety: pad + size <= remaining, so both stay inside the current block.
        unsafe {
            let start = ptr.add(pad);
            self.ptr.set(start.add(layout.size()));
            Some(start)
        }
    }

    #[inline(never)]
    fn alloc_slow(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let needed = layout
            .size()
            .checked_add(layout.align())
            .ok_or(AllocError)?;
        let regular = self.next_block_size.get();
        let (block_layout, data_offset) = match self.block_layout(regular.max(needed)) {
            Some(fits) if self.allocated.get().saturating_add(fits.0.size()) <= self.limit => fits,
            _ => {
                // Retry with an exact fit before giving up on the limit.
                let exact = self.block_layout(needed).ok_or(AllocError)?;
                if self.allocated.get().saturating_add(exact.0.size()) > self.limit {
                    tracing::debug!(
                        requested = layout.size(),
                        allocated = self.allocated.get(),
                        limit = self.limit,
                        "arena limit reached"
                    );
                    return Err(AllocError);
                }
                exact
            }
        };

        let base = self
            .allocator
            .allocate(block_layout)
            .map_err(|_| AllocError)?
            .cast::<u8>();
        // Safety: base points to a fresh allocation of block_layout, which starts
        // with room for the header and holds data_offset..size for payload.
        unsafe {
            base.cast::<MemBlock>().as_ptr().write(MemBlock {
                prev: self.current.get(),
                layout: block_layout,
            });
            self.ptr.set(base.add(data_offset));
            self.end.set(base.add(block_layout.size()));
        }
        self.current.set(Some(base.cast()));
        self.allocated.set(self.allocated.get() + block_layout.size());
        if needed <= regular {
            self.next_block_size.set((regular * 2).min(MAX_BLOCK_SIZE));
        }
        tracing::trace!(block = block_layout.size(), total = self.allocated.get(), "arena block");

        self.bump(layout).ok_or(AllocError)
    }

    fn block_layout(&self, payload: usize) -> Option<(Layout, usize)> {
        let data = Layout::from_size_align(payload, BLOCK_ALIGN).ok()?;
        let (layout, offset) = Layout::new::<MemBlock>().extend(data).ok()?;
        Some((layout.pad_to_align(), offset))
    }

    fn release(&mut self) {
        let mut fused = self.fused.take();
        while let Some(node) = fused {
            // Safety: node was written by `fuse` and is dropped exactly once here;
            // its memory belongs to one of our blocks, freed below.
            unsafe {
                fused = (*node.as_ptr()).next;
                ptr::drop_in_place(node.as_ptr());
            }
        }

        let mut block = self.current.take();
        while let Some(b) = block {
            // Safety: every block was allocated by self.allocator with the
            // layout stored in its header.
            unsafe {
                let MemBlock { prev, layout } = b.as_ptr().read();
                self.allocator.deallocate(b.cast(), layout);
                block = prev;
            }
        }

        self.ptr.set(NonNull::dangling());
        self.end.set(NonNull::dangling());
        self.next_block_size.set(FIRST_BLOCK_SIZE);
        self.allocated.set(0);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("space_allocated", &self.space_allocated())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocator_api2::alloc::Global;

    #[test]
    fn alloc_values_stay_valid() {
        let arena = Arena::new(&Global);
        let a = arena.alloc(1u64).unwrap();
        let b = arena.alloc(2u32).unwrap();
        let s = arena.alloc_str("hello").unwrap();
        *a += 41;
        assert_eq!(*a, 42);
        assert_eq!(*b, 2);
        assert_eq!(s, "hello");
        assert_eq!(a as *mut u64 as usize % core::mem::align_of::<u64>(), 0);
    }

    #[test]
    fn grows_across_blocks() {
        let arena = Arena::new(&Global);
        let mut slices = std::vec::Vec::new();
        for i in 0..200u8 {
            slices.push(arena.alloc_slice_copy(&[i; 100]).unwrap());
        }
        for (i, s) in slices.iter().enumerate() {
            assert!(s.iter().all(|&b| b == i as u8));
        }
        assert!(arena.space_allocated() >= 200 * 100);
    }

    #[test]
    fn oversized_request_gets_own_block() {
        let arena = Arena::new(&Global);
        let big = arena.alloc_slice_copy(&[7u8; 100_000]).unwrap();
        assert_eq!(big.len(), 100_000);
        let small = arena.alloc(3u8).unwrap();
        assert_eq!(*small, 3);
    }

    #[test]
    fn limit_reports_failure() {
        let arena = Arena::with_limit(&Global, 512);
        assert!(arena.alloc_slice_copy(&[0u8; 64]).is_ok());
        assert_eq!(arena.alloc_slice_copy(&[0u8; 4096]).err(), Some(AllocError));
        // Small allocations keep working after a failed one.
        assert!(arena.alloc(1u32).is_ok());
        assert!(arena.space_allocated() <= 512);
    }

    #[test]
    fn zero_limit_fails_everything() {
        let arena = Arena::with_limit(&Global, 0);
        assert_eq!(arena.alloc(1u8).err(), Some(AllocError));
        assert_eq!(arena.space_allocated(), 0);
    }

    #[test]
    fn fuse_accounts_for_adopted_memory() {
        let arena = Arena::new(&Global);
        let other = Arena::new(&Global);
        other.alloc_slice_copy(&[1u8; 1000]).unwrap();
        let other_bytes = other.space_allocated();
        let before = arena.space_allocated();
        let fused = arena.fuse(other).unwrap();
        assert_eq!(fused.space_allocated(), other_bytes);
        assert!(arena.space_allocated() >= before + other_bytes);
    }

    #[test]
    fn fused_allocations_outlive_the_session() {
        fn session_str<'a>(owner: &'a Arena, text: &str) -> &'a str {
            let session = owner.fuse(Arena::with_limit(&Global, 4096)).unwrap();
            session.alloc_str(text).unwrap()
        }

        let arena = Arena::new(&Global);
        let head = arena.alloc_str("head").unwrap();
        let tail = session_str(&arena, "tail");
        let joined = arena.alloc([&*head, tail]).unwrap();
        assert_eq!(joined, &["head", "tail"]);
    }

    #[test]
    fn reset_releases_everything() {
        let mut arena = Arena::new(&Global);
        arena.alloc_slice_copy(&[1u8; 5000]).unwrap();
        arena.fuse(Arena::new(&Global)).unwrap();
        assert!(arena.space_allocated() > 0);
        arena.reset();
        assert_eq!(arena.space_allocated(), 0);
        assert_eq!(*arena.alloc(9u16).unwrap(), 9);
    }
}
