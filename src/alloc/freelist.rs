//! Intrusive free lists, one per size class.

use crate::alloc::size_class::NFREELISTS;
use core::ptr::NonNull;

type Link = Option<NonNull<u8>>;

#[inline(always)]
unsafe fn next_of(block: NonNull<u8>) -> Link {
    block.as_ptr().cast::<Link>().read()
}

#[inline(always)]
unsafe fn set_next(block: NonNull<u8>, next: Link) {
    block.as_ptr().cast::<Link>().write(next);
}

/// An intrusive LIFO list of free blocks.
///
/// The link to the next block lives in the first word of each free block, so
/// the list needs no storage of its own beyond the head. While a block sits on
/// the list, that first word belongs to the list; once popped, the whole block
/// belongs to the caller again.
///
/// Not synchronized. The owner serializes access.
pub struct Freelist {
    head: Link,
}

impl Freelist {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Returns `true` if no block is on the list.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Pushes a single block onto the head.
    ///
    /// # Safety
    /// `block` must be valid for writes of one pointer, aligned for a pointer,
    /// and must not be in use by anyone else (including this list).
    #[inline]
    pub unsafe fn push(&mut self, block: NonNull<u8>) {
        set_next(block, self.head);
        self.head = Some(block);
    }

    /// Pops the head block.
    ///
    /// # Safety
    /// Every block on the list must still be valid memory whose first word has
    /// not been touched since it was pushed.
    #[inline]
    pub unsafe fn pop(&mut self) -> Option<NonNull<u8>> {
        let block = self.head?;
        self.head = next_of(block);
        Some(block)
    }

    /// Links `blocks` together and splices them onto the head, so the first
    /// block yielded becomes the new head. Returns the number of blocks added.
    ///
    /// # Safety
    /// Same requirements as [`Freelist::push`], for every block.
    pub unsafe fn push_chain<I>(&mut self, blocks: I) -> usize
    where
        I: IntoIterator<Item = NonNull<u8>>,
    {
        let mut iter = blocks.into_iter();
        let Some(first) = iter.next() else {
            return 0;
        };

        let mut last = first;
        let mut count = 1;
        for block in iter {
            set_next(last, Some(block));
            last = block;
            count += 1;
        }

        set_next(last, self.head);
        self.head = Some(first);
        count
    }

    /// Counts the blocks on the list by walking it.
    ///
    /// # Safety
    /// Same requirements as [`Freelist::pop`].
    pub unsafe fn len(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;
        while let Some(block) = current {
            count += 1;
            current = next_of(block);
        }
        count
    }
}

impl Default for Freelist {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`Freelist`] per size class.
pub struct FreelistBank {
    lists: [Freelist; NFREELISTS],
}

impl FreelistBank {
    /// Creates a bank with every list empty.
    pub const fn new() -> Self {
        const EMPTY: Freelist = Freelist::new();
        Self {
            lists: [EMPTY; NFREELISTS],
        }
    }

    /// Returns `true` if the list for class `index` is empty.
    #[inline]
    pub fn is_empty(&self, index: usize) -> bool {
        self.lists[index].is_empty()
    }

    /// Pops a block from class `index`.
    ///
    /// # Safety
    /// See [`Freelist::pop`].
    #[inline]
    pub unsafe fn pop(&mut self, index: usize) -> Option<NonNull<u8>> {
        self.lists[index].pop()
    }

    /// Pushes a block onto class `index`.
    ///
    /// # Safety
    /// See [`Freelist::push`]. The block must be at least as large as the class.
    #[inline]
    pub unsafe fn push(&mut self, index: usize, block: NonNull<u8>) {
        self.lists[index].push(block);
    }

    /// Splices a chain of blocks onto class `index`.
    ///
    /// # Safety
    /// See [`Freelist::push_chain`].
    pub unsafe fn push_chain<I>(&mut self, index: usize, blocks: I) -> usize
    where
        I: IntoIterator<Item = NonNull<u8>>,
    {
        self.lists[index].push_chain(blocks)
    }

    /// Finds the smallest class strictly larger than `index` that has a spare
    /// block.
    pub fn first_stocked_above(&self, index: usize) -> Option<usize> {
        (index + 1..NFREELISTS).find(|&i| !self.lists[i].is_empty())
    }

    /// Number of free blocks per class.
    ///
    /// # Safety
    /// See [`Freelist::len`].
    pub unsafe fn lengths(&self) -> [usize; NFREELISTS] {
        let mut out = [0; NFREELISTS];
        for (slot, list) in out.iter_mut().zip(self.lists.iter()) {
            *slot = list.len();
        }
        out
    }
}

impl Default for FreelistBank {
    fn default() -> Self {
        Self::new()
    }
}
