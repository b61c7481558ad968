use log::trace;
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;
use std::{error, fmt};

use crate::word::{CELL_ALIGN, WORD_BYTES, Word};

/// Allocation failure, surfaced to the caller as a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The allocator's word budget cannot cover the request.
    Exhausted { requested: usize, budget: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested, budget } => {
                write!(f, "heap exhausted: {requested} words requested, budget {budget}")
            }
        }
    }
}

impl error::Error for AllocError {}

/// The reservation primitive a [`Space`](crate::Space) allocates through.
///
/// This is the sole coupling point between the core and a concrete
/// collector. Every entry point returns the address of a fresh run of
/// 8-byte-aligned words and may trigger a collection first; across such a
/// call, only values reachable from the space's root list survive. A
/// relocating implementation must treat the word arguments of the call in
/// progress as additional roots, and rewrites the root list through
/// [`Space::visit_roots`](crate::Space::visit_roots).
pub trait Allocator {
    /// Reserve `words` contiguous words; write `header` into word 0 and
    /// leave the rest uninitialized.
    fn alloc(&mut self, header: Word, words: usize) -> Result<NonNull<Word>, AllocError>;

    /// As [`alloc`](Allocator::alloc), but pre-fill every word after the
    /// header with `fill`.
    fn alloc_filled(
        &mut self,
        header: Word,
        fill: Word,
        words: usize,
    ) -> Result<NonNull<Word>, AllocError>;

    /// Reserve exactly two words and write both. Used for header-less
    /// kons/snok cells; the tag on the resulting pointer identifies the
    /// object kind.
    fn alloc_cell(&mut self, a: Word, b: Word) -> Result<NonNull<Word>, AllocError>;
}

struct Page {
    ptr: NonNull<Word>,
    words: usize,
}

impl Page {
    fn layout(words: usize) -> Layout {
        Layout::from_size_align(words * WORD_BYTES, CELL_ALIGN).expect("page layout")
    }

    fn new(words: usize) -> Page {
        let layout = Self::layout(words);
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<Word>()) else {
            handle_alloc_error(layout);
        };
        Page { ptr, words }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr().cast(), Self::layout(self.words)) }
    }
}

/// A page-based arena: the no-reclamation allocator the core ships with.
///
/// Reservations are bumped out of 8-byte-aligned pages and never reused; a
/// collector replaces this wholesale. An optional word budget makes
/// exhaustion observable.
pub struct Bump {
    pages: Vec<Page>,
    /// Words still free in the last page.
    left: usize,
    used: usize,
    page_words: usize,
    budget: usize,
}

impl Bump {
    pub const DEFAULT_PAGE_WORDS: usize = 4096;

    #[must_use]
    pub fn new() -> Self {
        Self::with_budget(usize::MAX)
    }

    /// An arena that refuses to hand out more than `budget` words in total.
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Bump {
            pages: Vec::new(),
            left: 0,
            used: 0,
            page_words: Self::DEFAULT_PAGE_WORDS,
            budget,
        }
    }

    /// Total words handed out so far.
    #[must_use]
    pub fn used_words(&self) -> usize {
        self.used
    }

    fn reserve(&mut self, words: usize) -> Result<NonNull<Word>, AllocError> {
        // Keep every reservation a multiple of the cell alignment so the
        // next one starts aligned even when words are narrower than 8 bytes.
        let take = words.next_multiple_of(CELL_ALIGN / WORD_BYTES);
        if self.used.saturating_add(take) > self.budget {
            return Err(AllocError::Exhausted {
                requested: take,
                budget: self.budget,
            });
        }
        if self.left < take {
            let size = self.page_words.max(take);
            trace!("bump arena: new page of {size} words");
            self.pages.push(Page::new(size));
            self.left = size;
        }
        let page = self.pages.last().expect("current page");
        let at = page.words - self.left;
        let ptr = unsafe { NonNull::new_unchecked(page.ptr.as_ptr().add(at)) };
        assert_eq!(
            ptr.as_ptr() as usize & (CELL_ALIGN - 1),
            0,
            "arena produced a misaligned block"
        );
        self.left -= take;
        self.used += take;
        Ok(ptr)
    }
}

impl Default for Bump {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for Bump {
    fn alloc(&mut self, header: Word, words: usize) -> Result<NonNull<Word>, AllocError> {
        assert!(words >= 1, "headered object of zero words");
        let p = self.reserve(words)?;
        unsafe { p.as_ptr().write(header) };
        Ok(p)
    }

    fn alloc_filled(
        &mut self,
        header: Word,
        fill: Word,
        words: usize,
    ) -> Result<NonNull<Word>, AllocError> {
        let p = self.alloc(header, words)?;
        for i in 1..words {
            unsafe { p.as_ptr().add(i).write(fill) };
        }
        Ok(p)
    }

    fn alloc_cell(&mut self, a: Word, b: Word) -> Result<NonNull<Word>, AllocError> {
        let p = self.reserve(2)?;
        unsafe {
            p.as_ptr().write(a);
            p.as_ptr().add(1).write(b);
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::CELL_ALIGN;

    #[test]
    fn cells_are_aligned() {
        let mut arena = Bump::new();
        for i in 0..100 {
            let p = arena
                .alloc_cell(Word::fixint(i), Word::fixint(-i))
                .unwrap();
            assert_eq!(p.as_ptr() as usize & (CELL_ALIGN - 1), 0);
            unsafe {
                assert_eq!(p.as_ptr().read().fixint_value(), i);
                assert_eq!(p.as_ptr().add(1).read().fixint_value(), -i);
            }
        }
    }

    #[test]
    fn filled_allocation() {
        let mut arena = Bump::new();
        let fill = Word::fixint(7);
        let p = arena.alloc_filled(Word::fixint(0), fill, 5).unwrap();
        for i in 1..5 {
            assert_eq!(unsafe { p.as_ptr().add(i).read() }, fill);
        }
    }

    #[test]
    fn budget_exhaustion() {
        let mut arena = Bump::with_budget(4);
        arena.alloc_cell(Word::fixint(1), Word::fixint(2)).unwrap();
        arena.alloc_cell(Word::fixint(3), Word::fixint(4)).unwrap();
        let err = arena.alloc_cell(Word::fixint(5), Word::fixint(6));
        assert_eq!(
            err,
            Err(AllocError::Exhausted {
                requested: 2,
                budget: 4
            })
        );
    }

    #[test]
    fn oversized_requests_get_their_own_page() {
        let mut arena = Bump::new();
        let big = Bump::DEFAULT_PAGE_WORDS * 2;
        let p = arena.alloc(Word::fixint(0), big).unwrap();
        assert_eq!(p.as_ptr() as usize & (CELL_ALIGN - 1), 0);
        assert!(arena.used_words() >= big);
    }
}
