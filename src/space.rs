use log::debug;
use std::cell::RefCell;

use crate::alloc::{AllocError, Allocator, Bump};
use crate::atom::{Lit, ToWord};
use crate::handle::{Handle, RootList};
use crate::layout;
use crate::nym::{self, Nym};
use crate::word::{TAG_KONS, TAG_SNOK, TAG_VAL, Word};

/// The owner of a managed allocation region and its root set.
///
/// Every constructor reserves memory through the pluggable [`Allocator`],
/// writes tagged words into it, and returns a [`Handle`] rooted to this
/// space. Any constructor may trigger a collection; across it, only values
/// behind live handles survive. A space and its handles belong to one
/// thread of control, and values must not migrate between spaces.
pub struct Space<A: Allocator = Bump> {
    alloc: RefCell<A>,
    roots: RootList,
}

impl Space<Bump> {
    /// A space over a fresh unbounded bump arena.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(Bump::new())
    }
}

impl Default for Space<Bump> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Space<A> {
    pub fn with_allocator(alloc: A) -> Self {
        debug!("new space");
        Space {
            alloc: RefCell::new(alloc),
            roots: RootList::new(),
        }
    }

    // --- intrinsics ---

    /// A fresh handle on `#null`. No allocation.
    #[must_use]
    pub fn null(&self) -> Handle<'_> {
        self.lit(Lit::Null)
    }

    /// A fresh handle on any of the four literal constants. No allocation.
    #[must_use]
    pub fn lit(&self, lit: Lit) -> Handle<'_> {
        Handle::link(&self.roots, lit.word())
    }

    /// A fresh handle on an immediate integer. No allocation; panics
    /// outside the fixint range.
    #[must_use]
    pub fn fixint(&self, i: isize) -> Handle<'_> {
        Handle::link(&self.roots, Word::fixint(i))
    }

    // --- constructors ---

    /// Prepend `head` to `tail`.
    ///
    /// When `tail` is already a seq this is a compact header-less 2-word
    /// cell behind a konsref; otherwise it is a fresh `_pr`-headered pair
    /// behind a valref.
    pub fn cons(
        &self,
        head: impl ToWord,
        tail: impl ToWord,
    ) -> Result<Handle<'_>, AllocError> {
        let (h, t) = (head.to_word(), tail.to_word());
        let w = if t.is_seq() {
            let cell = self.alloc.borrow_mut().alloc_cell(h, t)?;
            Word::tag_ptr(cell, TAG_KONS)
        } else {
            self.pair(h, t)?
        };
        Ok(Handle::link(&self.roots, w))
    }

    /// Append `last` to `init`; the mirror of [`cons`](Space::cons).
    ///
    /// When `init` is already a seq this is a 2-word cell behind a snokref;
    /// otherwise a fresh `_pr`-headered pair.
    pub fn snoc(
        &self,
        init: impl ToWord,
        last: impl ToWord,
    ) -> Result<Handle<'_>, AllocError> {
        let (i, l) = (init.to_word(), last.to_word());
        let w = if i.is_seq() {
            let cell = self.alloc.borrow_mut().alloc_cell(i, l)?;
            Word::tag_ptr(cell, TAG_SNOK)
        } else {
            self.pair(i, l)?
        };
        Ok(Handle::link(&self.roots, w))
    }

    /// A 3-word `[_pr, car, cdr]` block. Always fresh, even when an
    /// argument is itself a headered pair.
    fn pair(&self, car: Word, cdr: Word) -> Result<Word, AllocError> {
        let hdr = layout::vec_header(nym::PR, 2);
        let p = self.alloc.borrow_mut().alloc(hdr, 3)?;
        unsafe {
            layout::put_word(p, 1, car);
            layout::put_word(p, 2, cdr);
        }
        Ok(Word::tag_ptr(p, TAG_VAL))
    }

    /// A vector-like of `n` tagged slots under nym `h`, each initialized
    /// to `fill`.
    pub fn make_vec(
        &self,
        h: Nym,
        n: usize,
        fill: impl ToWord,
    ) -> Result<Handle<'_>, AllocError> {
        let extra = layout::overflow_words(n);
        let hdr = layout::vec_header(h, n);
        let p = self
            .alloc
            .borrow_mut()
            .alloc_filled(hdr, fill.to_word(), 1 + extra + n)?;
        if extra == 1 {
            unsafe { layout::put_word(p, 1, Word::from_raw(n)) };
        }
        Ok(Handle::link(&self.roots, Word::tag_ptr(p, TAG_VAL)))
    }

    /// A byte-vector-like of `num_bytes` raw bytes under nym `h`. The byte
    /// region's initial contents are undefined.
    pub fn make_bvl(&self, h: Nym, num_bytes: usize) -> Result<Handle<'_>, AllocError> {
        let extra = layout::overflow_words(num_bytes);
        let hdr = layout::bvl_header(h, num_bytes);
        let words = 1 + extra + layout::words_for_bytes(num_bytes);
        let p = self.alloc.borrow_mut().alloc(hdr, words)?;
        if extra == 1 {
            unsafe { layout::put_word(p, 1, Word::from_raw(num_bytes)) };
        }
        Ok(Handle::link(&self.roots, Word::tag_ptr(p, TAG_VAL)))
    }

    /// A blob: `num_vals` tagged slots initialized to `fill`, an interior
    /// marker, then `num_bytes` raw bytes (initial contents undefined). The
    /// marker records the word distance back to the header so a scan of the
    /// raw region can recover it.
    pub fn make_blob(
        &self,
        h: Nym,
        num_vals: usize,
        fill: impl ToWord,
        num_bytes: usize,
    ) -> Result<Handle<'_>, AllocError> {
        let extra = layout::blob_overflow_words(num_vals, num_bytes);
        let hdr = layout::blob_header(h, num_vals, num_bytes);
        let words = 1 + extra + num_vals + 1 + layout::words_for_bytes(num_bytes);
        let p = self
            .alloc
            .borrow_mut()
            .alloc_filled(hdr, fill.to_word(), words)?;
        if extra == 2 {
            unsafe {
                layout::put_word(p, 1, Word::from_raw(num_vals));
                layout::put_word(p, 2, Word::from_raw(num_bytes));
            }
        }
        let mdr_at = 1 + extra + num_vals;
        unsafe { layout::put_word(p, mdr_at, layout::middler(mdr_at)) };
        Ok(Handle::link(&self.roots, Word::tag_ptr(p, TAG_VAL)))
    }

    // --- root set ---

    /// Number of live handles rooted to this space.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Enumerate every root, replacing each word with what `f` returns.
    /// This is how a relocating collector rewrites the root set.
    pub fn visit_roots(&self, f: impl FnMut(Word) -> Word) {
        self.roots.visit(f);
    }

    /// Assert root-list integrity. Intended for tests and collector
    /// debugging.
    pub fn debug_validate_roots(&self) {
        self.roots.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::FixInt;
    use crate::word::Variant;

    #[test]
    fn null_is_rooted_without_allocating() {
        let space = Space::with_allocator(Bump::with_budget(0));
        let n = space.null();
        assert!(n.is_null() && n.is_seq());
        assert_eq!(space.root_count(), 1);
    }

    #[test]
    fn cons_onto_seq_is_a_cell() {
        let space = Space::new();
        let l = space.cons(FixInt::new(1), Lit::Null).unwrap();
        assert_eq!(l.variant(), Variant::KonsRef);
        assert!(l.is_seq() && l.is_pair());
        assert_eq!(l.seq_car().fixint_value(), 1);
        assert!(l.seq_cdr().is_null());
        assert_eq!(l.allocated_length(), 2);
    }

    #[test]
    fn cons_onto_non_seq_is_a_headered_pair() {
        let space = Space::new();
        let p = space.cons(FixInt::new(7), FixInt::new(9)).unwrap();
        assert_eq!(p.variant(), Variant::ValRef);
        assert!(p.is_pair() && !p.is_seq());
        assert_eq!(p.header_nym(), nym::PR);
        assert_eq!(p.pair_car().fixint_value(), 7);
        assert_eq!(p.pair_cdr().fixint_value(), 9);
        assert_eq!(p.allocated_length(), 3);
    }

    #[test]
    fn snoc_mirrors_cons() {
        let space = Space::new();
        let s = space.snoc(Lit::Null, FixInt::new(5)).unwrap();
        assert_eq!(s.variant(), Variant::SnokRef);
        assert!(s.is_seq());
        assert!(s.seq_car().is_null());
        assert_eq!(s.seq_cdr().fixint_value(), 5);

        let p = space.snoc(FixInt::new(1), FixInt::new(2)).unwrap();
        assert_eq!(p.variant(), Variant::ValRef);
        assert_eq!(p.header_nym(), nym::PR);
    }

    #[test]
    fn cons_over_a_pair_tail_makes_a_fresh_pair() {
        let space = Space::new();
        let inner = space.cons(FixInt::new(7), FixInt::new(9)).unwrap();
        let outer = space.cons(FixInt::new(1), &inner).unwrap();
        assert_eq!(outer.variant(), Variant::ValRef);
        assert_eq!(outer.header_nym(), nym::PR);
        assert_ne!(outer.word(), inner.word());
        assert_eq!(outer.pair_cdr().word(), inner.word());
    }

    #[test]
    fn blob_middler_points_back_at_the_header() {
        let space = Space::new();
        let blob = space.make_blob(nym::BLB, 2, FixInt::new(0), 8).unwrap();
        let hdr = blob.word().addr();
        unsafe {
            let obj = layout::Obj::resolve(hdr);
            let mdr = obj.blob_middler();
            let delta = layout::middler_delta(mdr.as_ptr().read());
            assert_eq!(delta, 3); // header + two value slots
            let back = mdr.as_ptr().sub(delta);
            assert_eq!(back, hdr.as_ptr());
            assert_eq!(back.read().variant(), Variant::BlobHdr);
            // a valref aimed at the middler resolves to the same object
            assert_eq!(layout::Obj::resolve(mdr).nym(), nym::BLB);
        }

        // with overflow length words the delta stretches to cover them
        let big = space.make_blob(nym::BLB, 1, FixInt::new(0), 4000).unwrap();
        unsafe {
            let obj = layout::Obj::resolve(big.word().addr());
            let mdr = obj.blob_middler();
            assert_eq!(layout::middler_delta(mdr.as_ptr().read()), 4);
        }
    }

    #[test]
    fn exhaustion_is_reported_not_fatal() {
        let space = Space::with_allocator(Bump::with_budget(2));
        space.cons(FixInt::new(1), Lit::Null).unwrap();
        let err = space.cons(FixInt::new(2), Lit::Null);
        assert!(matches!(err, Err(AllocError::Exhausted { .. })));
    }
}
