use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use crate::atom::ToWord;
use crate::layout::Obj;
use crate::nym::{self, Nym};
use crate::word::{Variant, Word};

struct RootNode {
    prev: Cell<NonNull<RootNode>>,
    next: Cell<NonNull<RootNode>>,
    value: Cell<Word>,
}

/// The root registry of a space: a sentinel-headed doubly linked list whose
/// member nodes back live [`Handle`]s.
///
/// A collector walks this list (in either direction) to find every value
/// that must survive; a relocating collector rewrites values through
/// [`visit`](RootList::visit).
pub(crate) struct RootList {
    // Boxed so member nodes can point at the sentinel while the owning
    // space moves freely.
    head: Box<RootNode>,
}

impl RootList {
    pub(crate) fn new() -> Self {
        let head = Box::new(RootNode {
            prev: Cell::new(NonNull::dangling()),
            next: Cell::new(NonNull::dangling()),
            value: Cell::new(Word::from_raw(0)),
        });
        let p = NonNull::from(&*head);
        head.prev.set(p);
        head.next.set(p);
        RootList { head }
    }

    fn head_ptr(&self) -> NonNull<RootNode> {
        NonNull::from(&*self.head)
    }

    /// Splice a fresh node immediately after `after`.
    fn link_after(&self, after: NonNull<RootNode>, value: Word) -> NonNull<RootNode> {
        unsafe {
            let next = after.as_ref().next.get();
            let node = NonNull::from(Box::leak(Box::new(RootNode {
                prev: Cell::new(after),
                next: Cell::new(next),
                value: Cell::new(value),
            })));
            after.as_ref().next.set(node);
            next.as_ref().prev.set(node);
            node
        }
    }

    unsafe fn unlink(node: NonNull<RootNode>) {
        unsafe {
            let node = Box::from_raw(node.as_ptr());
            node.prev.get().as_ref().next.set(node.next.get());
            node.next.get().as_ref().prev.set(node.prev.get());
        }
    }

    /// Number of live roots.
    pub(crate) fn len(&self) -> usize {
        let head = self.head_ptr();
        let mut n = 0;
        let mut at = self.head.next.get();
        while at != head {
            n += 1;
            at = unsafe { at.as_ref() }.next.get();
        }
        n
    }

    /// Enumerate every root in insertion-adjacent order, replacing each
    /// value with what `f` returns.
    pub(crate) fn visit(&self, mut f: impl FnMut(Word) -> Word) {
        let head = self.head_ptr();
        let mut at = self.head.next.get();
        while at != head {
            let node = unsafe { at.as_ref() };
            node.value.set(f(node.value.get()));
            at = node.next.get();
        }
    }

    /// Assert the structural invariants: prev/next are inverses and the
    /// only cycle runs through the sentinel.
    pub(crate) fn validate(&self) {
        let head = self.head_ptr();
        let mut seen = 0usize;
        let mut at = head;
        loop {
            let node = unsafe { at.as_ref() };
            let next = node.next.get();
            assert_eq!(
                unsafe { next.as_ref() }.prev.get(),
                at,
                "root list prev/next out of sync"
            );
            at = next;
            if at == head {
                break;
            }
            seen += 1;
            assert!(seen <= 1 << 24, "root list cycle away from the sentinel");
        }
    }
}

/// A stack-scoped rooted reference to a tagged word.
///
/// Creating a handle links it into its space's root list; dropping it
/// unlinks it. While a handle is live, its value survives any collection
/// the space's allocator performs. Cloning splices the copy next to the
/// original; the two lifetimes are independent.
///
/// The borrow a handle holds on its space means handles cannot outlive the
/// space that produced them.
pub struct Handle<'s> {
    node: NonNull<RootNode>,
    roots: &'s RootList,
}

impl<'s> Handle<'s> {
    pub(crate) fn link(roots: &'s RootList, value: Word) -> Self {
        Handle {
            node: roots.link_after(roots.head_ptr(), value),
            roots,
        }
    }

    fn node(&self) -> &RootNode {
        unsafe { self.node.as_ref() }
    }

    /// The tagged word this handle roots.
    #[must_use]
    pub fn word(&self) -> Word {
        self.node().value.get()
    }

    /// Replace the rooted value. List position is unchanged.
    pub fn set(&mut self, v: impl ToWord) {
        self.node().value.set(v.to_word());
    }

    fn derived(&self, value: Word) -> Handle<'s> {
        Handle::link(self.roots, value)
    }

    // --- predicates ---

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.word().variant()
    }

    #[must_use]
    pub fn is_fixint(&self) -> bool {
        self.word().is_fixint()
    }

    #[must_use]
    pub fn is_bool(&self) -> bool {
        self.word().is_bool()
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.word().is_null()
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.word().is_void()
    }

    #[must_use]
    pub fn truth(&self) -> bool {
        self.word().truth()
    }

    /// Requires `is_bool`.
    #[must_use]
    pub fn bool_value(&self) -> bool {
        self.word().bool_value()
    }

    #[must_use]
    pub fn is_kons(&self) -> bool {
        self.word().is_kons()
    }

    #[must_use]
    pub fn is_snok(&self) -> bool {
        self.word().is_snok()
    }

    #[must_use]
    pub fn is_seq(&self) -> bool {
        self.word().is_seq()
    }

    /// Either flavor of 2-word cell, or a heap pair under a `_pr` header.
    #[must_use]
    pub fn is_pair(&self) -> bool {
        let w = self.word();
        if w.is_kons() || w.is_snok() {
            return true;
        }
        w.is_valref() && {
            let obj = unsafe { Obj::resolve(w.addr()) };
            unsafe { obj.kind() == Variant::VecHdr && obj.nym() == nym::PR }
        }
    }

    #[must_use]
    pub fn is_vec(&self) -> bool {
        let w = self.word();
        w.is_valref() && unsafe { Obj::resolve(w.addr()).kind() } == Variant::VecHdr
    }

    #[must_use]
    pub fn is_bvl(&self) -> bool {
        let w = self.word();
        w.is_valref() && unsafe { Obj::resolve(w.addr()).kind() } == Variant::BvlHdr
    }

    #[must_use]
    pub fn is_blob(&self) -> bool {
        let w = self.word();
        w.is_valref() && unsafe { Obj::resolve(w.addr()).kind() } == Variant::BlobHdr
    }

    // --- extraction ---

    /// Requires `is_fixint`.
    #[must_use]
    pub fn fixint_value(&self) -> isize {
        self.word().fixint_value()
    }

    /// Word 0 of a 2-word cell: the head of a kons, the init-seq of a snok.
    /// Requires `is_kons` or `is_snok`.
    #[must_use]
    pub fn seq_car(&self) -> Handle<'s> {
        self.derived(unsafe { crate::layout::word_at(self.cell(), 0) })
    }

    /// Word 1 of a 2-word cell: the remaining seq of a kons, the last
    /// element of a snok. Requires `is_kons` or `is_snok`.
    #[must_use]
    pub fn seq_cdr(&self) -> Handle<'s> {
        self.derived(unsafe { crate::layout::word_at(self.cell(), 1) })
    }

    fn cell(&self) -> NonNull<Word> {
        let w = self.word();
        assert!(
            w.is_kons() || w.is_snok(),
            "seq accessor on non-cell {w:?}"
        );
        w.addr()
    }

    // --- headered pair ---

    fn pair_obj(&self) -> Obj {
        let w = self.word();
        assert!(w.is_valref(), "pair accessor on {w:?}");
        let obj = unsafe { Obj::resolve(w.addr()) };
        let ok = unsafe { obj.kind() == Variant::VecHdr && obj.nym() == nym::PR };
        assert!(ok, "pair accessor on non-pair {w:?}");
        obj
    }

    #[must_use]
    pub fn pair_car(&self) -> Handle<'s> {
        let obj = self.pair_obj();
        self.derived(unsafe { obj.vec_slot(0).as_ptr().read() })
    }

    #[must_use]
    pub fn pair_cdr(&self) -> Handle<'s> {
        let obj = self.pair_obj();
        self.derived(unsafe { obj.vec_slot(1).as_ptr().read() })
    }

    pub fn pair_setcar(&self, v: impl ToWord) {
        let obj = self.pair_obj();
        unsafe { obj.vec_slot(0).as_ptr().write(v.to_word()) }
    }

    pub fn pair_setcdr(&self, v: impl ToWord) {
        let obj = self.pair_obj();
        unsafe { obj.vec_slot(1).as_ptr().write(v.to_word()) }
    }

    // --- vector-like ---

    fn vec_obj(&self) -> Obj {
        let w = self.word();
        assert!(w.is_valref(), "vec accessor on {w:?}");
        let obj = unsafe { Obj::resolve(w.addr()) };
        assert!(
            unsafe { obj.kind() } == Variant::VecHdr,
            "vec accessor on non-vec {w:?}"
        );
        obj
    }

    /// Number of tagged slots.
    #[must_use]
    pub fn vec_value_capacity(&self) -> usize {
        unsafe { self.vec_obj().vec_capacity() }
    }

    /// Requires `i < vec_value_capacity`.
    #[must_use]
    pub fn vec_fetch(&self, i: usize) -> Handle<'s> {
        let obj = self.vec_obj();
        let cap = unsafe { obj.vec_capacity() };
        assert!(i < cap, "vec index {i} out of range {cap}");
        self.derived(unsafe { obj.vec_slot(i).as_ptr().read() })
    }

    /// Requires `i < vec_value_capacity`.
    pub fn vec_store(&self, i: usize, v: impl ToWord) {
        let obj = self.vec_obj();
        let cap = unsafe { obj.vec_capacity() };
        assert!(i < cap, "vec index {i} out of range {cap}");
        unsafe { obj.vec_slot(i).as_ptr().write(v.to_word()) }
    }

    // --- byte-vector-like ---

    fn bvl_obj(&self) -> Obj {
        let w = self.word();
        assert!(w.is_valref(), "bvl accessor on {w:?}");
        let obj = unsafe { Obj::resolve(w.addr()) };
        assert!(
            unsafe { obj.kind() } == Variant::BvlHdr,
            "bvl accessor on non-bvl {w:?}"
        );
        obj
    }

    /// Number of raw bytes.
    #[must_use]
    pub fn bvl_byte_capacity(&self) -> usize {
        unsafe { self.bvl_obj().bvl_capacity() }
    }

    /// Requires `i < bvl_byte_capacity`.
    #[must_use]
    pub fn bvl_get(&self, i: usize) -> u8 {
        let obj = self.bvl_obj();
        let cap = unsafe { obj.bvl_capacity() };
        assert!(i < cap, "bvl index {i} out of range {cap}");
        unsafe { obj.bvl_byte(i).as_ptr().read() }
    }

    /// Requires `i < bvl_byte_capacity`.
    pub fn bvl_set(&self, i: usize, x: u8) {
        let obj = self.bvl_obj();
        let cap = unsafe { obj.bvl_capacity() };
        assert!(i < cap, "bvl index {i} out of range {cap}");
        unsafe { obj.bvl_byte(i).as_ptr().write(x) }
    }

    // --- blob ---

    fn blob_obj(&self) -> Obj {
        let w = self.word();
        assert!(w.is_valref(), "blob accessor on {w:?}");
        let obj = unsafe { Obj::resolve(w.addr()) };
        assert!(
            unsafe { obj.kind() } == Variant::BlobHdr,
            "blob accessor on non-blob {w:?}"
        );
        obj
    }

    /// Number of tagged slots.
    #[must_use]
    pub fn blob_val_capacity(&self) -> usize {
        unsafe { self.blob_obj().blob_capacities() }.0
    }

    /// Number of raw bytes.
    #[must_use]
    pub fn blob_raw_capacity(&self) -> usize {
        unsafe { self.blob_obj().blob_capacities() }.1
    }

    /// Requires `i < blob_val_capacity`.
    #[must_use]
    pub fn blob_fetch(&self, i: usize) -> Handle<'s> {
        let obj = self.blob_obj();
        let cap = unsafe { obj.blob_capacities() }.0;
        assert!(i < cap, "blob slot {i} out of range {cap}");
        self.derived(unsafe { obj.blob_slot(i).as_ptr().read() })
    }

    /// Requires `i < blob_val_capacity`.
    pub fn blob_store(&self, i: usize, v: impl ToWord) {
        let obj = self.blob_obj();
        let cap = unsafe { obj.blob_capacities() }.0;
        assert!(i < cap, "blob slot {i} out of range {cap}");
        unsafe { obj.blob_slot(i).as_ptr().write(v.to_word()) }
    }

    /// Requires `i < blob_raw_capacity`.
    #[must_use]
    pub fn blob_get(&self, i: usize) -> u8 {
        let obj = self.blob_obj();
        let cap = unsafe { obj.blob_capacities() }.1;
        assert!(i < cap, "blob byte {i} out of range {cap}");
        unsafe { obj.blob_byte(i).as_ptr().read() }
    }

    /// Requires `i < blob_raw_capacity`.
    pub fn blob_set(&self, i: usize, x: u8) {
        let obj = self.blob_obj();
        let cap = unsafe { obj.blob_capacities() }.1;
        assert!(i < cap, "blob byte {i} out of range {cap}");
        unsafe { obj.blob_byte(i).as_ptr().write(x) }
    }

    /// The nym in this object's header. Requires a headered referent.
    #[must_use]
    pub fn header_nym(&self) -> Nym {
        let w = self.word();
        assert!(w.is_valref(), "header_nym of {w:?}");
        unsafe { Obj::resolve(w.addr()).nym() }
    }

    /// Total words of the referent's allocation, header (if any) included.
    /// Requires a heap-allocated referent.
    #[must_use]
    pub fn allocated_length(&self) -> usize {
        let w = self.word();
        if w.is_kons() || w.is_snok() {
            return 2;
        }
        assert!(w.is_valref(), "allocated_length of {w:?}");
        unsafe { Obj::resolve(w.addr()).allocated_words() }
    }
}

impl ToWord for Handle<'_> {
    fn to_word(&self) -> Word {
        self.word()
    }
}

impl Clone for Handle<'_> {
    /// The copy is spliced adjacent to the original and lives independently.
    fn clone(&self) -> Self {
        Handle {
            node: self.roots.link_after(self.node, self.word()),
            roots: self.roots,
        }
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        unsafe { RootList::unlink(self.node) }
    }
}

impl fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?})", self.word())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{FixInt, Lit};

    #[test]
    fn link_and_unlink() {
        let roots = RootList::new();
        assert_eq!(roots.len(), 0);
        {
            let a = Handle::link(&roots, FixInt::new(1).to_word());
            let b = Handle::link(&roots, FixInt::new(2).to_word());
            assert_eq!(roots.len(), 2);
            roots.validate();
            drop(a);
            assert_eq!(roots.len(), 1);
            roots.validate();
            assert_eq!(b.fixint_value(), 2);
        }
        assert_eq!(roots.len(), 0);
        roots.validate();
    }

    #[test]
    fn clone_shares_value_not_lifetime() {
        let roots = RootList::new();
        let a = Handle::link(&roots, Lit::Null.word());
        let b = a.clone();
        assert_eq!(roots.len(), 2);
        drop(a);
        assert!(b.is_null());
        assert_eq!(roots.len(), 1);
        roots.validate();
    }

    #[test]
    fn set_replaces_value_only() {
        let roots = RootList::new();
        let _pad = Handle::link(&roots, Lit::Void.word());
        let mut a = Handle::link(&roots, Lit::Null.word());
        a.set(FixInt::new(9));
        assert_eq!(a.fixint_value(), 9);
        assert_eq!(roots.len(), 2);
        roots.validate();
    }

    #[test]
    fn visit_rewrites_roots() {
        let roots = RootList::new();
        let a = Handle::link(&roots, FixInt::new(1).to_word());
        let b = Handle::link(&roots, FixInt::new(2).to_word());
        roots.visit(|w| Word::fixint(w.fixint_value() * 10));
        assert_eq!(a.fixint_value(), 10);
        assert_eq!(b.fixint_value(), 20);
    }

    #[test]
    fn interleaved_scopes_keep_the_list_sound() {
        let roots = RootList::new();
        let a = Handle::link(&roots, FixInt::new(1).to_word());
        let b = Handle::link(&roots, FixInt::new(2).to_word());
        let c = b.clone();
        let d = Handle::link(&roots, FixInt::new(3).to_word());
        drop(b);
        roots.validate();
        drop(d);
        drop(a);
        roots.validate();
        assert_eq!(roots.len(), 1);
        assert_eq!(c.fixint_value(), 2);
    }
}
