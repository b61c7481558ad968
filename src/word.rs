use std::ptr::NonNull;
use std::{error, fmt};

/// Bytes per machine word.
pub const WORD_BYTES: usize = std::mem::size_of::<usize>();

/// Heap objects are aligned to this many bytes, independent of word size.
pub const CELL_ALIGN: usize = 8;

/// Smallest encodable fixed-point integer.
pub const FIXINT_MIN: isize = -(1 << (usize::BITS - 3));
/// Largest encodable fixed-point integer.
pub const FIXINT_MAX: isize = (1 << (usize::BITS - 3)) - 1;

const PTR_MASK: usize = 0b111;
pub(crate) const TAG_KONS: usize = 0b001;
pub(crate) const TAG_SNOK: usize = 0b011;
pub(crate) const TAG_VAL: usize = 0b101;
pub(crate) const TAG_INTR: usize = 0b111;

const HDR_MASK: usize = 0b11111;
pub(crate) const HDR_VEC: usize = 0b00010;
pub(crate) const HDR_BLOB: usize = 0b00110;
pub(crate) const HDR_MDR: usize = 0b01010;
pub(crate) const HDR_BVL: usize = 0b01110;
pub(crate) const HDR_LIT: usize = 0b11010;

/// Number of low bits consumed by a header tag; literal and middler payloads
/// start above it.
pub(crate) const HDR_BITS: u32 = 5;

const LIT_TRUE: usize = HDR_LIT;
const LIT_FALSE: usize = (1 << HDR_BITS) | HDR_LIT;
const LIT_VOID: usize = (2 << HDR_BITS) | HDR_LIT;
const LIT_NULL: usize = (3 << HDR_BITS) | HDR_LIT;

/// A word whose low bits match no variant.
///
/// Three of the eight low-5 header patterns are unassigned; a word carrying
/// one of them decodes to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed(pub usize);

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed word encoding {:#x}", self.0)
    }
}

impl error::Error for Malformed {}

/// The kind of a word, determined by its low 3 then low 5 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Immediate signed integer, value in the upper bits
    Fixnum,
    /// Pointer to a 2-word `[head, tail]` cell; the tail is itself a seq
    KonsRef,
    /// Pointer to a 2-word `[init, last]` cell; the init is itself a seq
    SnokRef,
    /// Pointer to a header word (or to a blob middler)
    ValRef,
    /// Pointer into the tagged interior of an object
    IntrRef,
    /// Vector-like header
    VecHdr,
    /// Blob header
    BlobHdr,
    /// Blob interior marker; the header is `d` words above
    BlobMdr,
    /// Byte-vector-like header
    BvlHdr,
    /// Immediate literal constant
    Literal,
}

/// A tagged machine word.
///
/// Every observable value of the system, and every slot of every heap
/// object, is one of these. Words are plain bits; they carry no lifetime,
/// so a word extracted from a [`Handle`](crate::Handle) is only meaningful
/// while its space is alive.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Word(usize);

impl Word {
    pub(crate) const fn from_raw(w: usize) -> Self {
        Word(w)
    }

    /// The untyped bit pattern.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Decode the variant, or report a malformed encoding.
    pub fn try_variant(self) -> Result<Variant, Malformed> {
        match self.0 & PTR_MASK {
            0b000 | 0b100 => Ok(Variant::Fixnum),
            TAG_KONS => Ok(Variant::KonsRef),
            TAG_SNOK => Ok(Variant::SnokRef),
            TAG_VAL => Ok(Variant::ValRef),
            TAG_INTR => Ok(Variant::IntrRef),
            _ => match self.0 & HDR_MASK {
                HDR_VEC => Ok(Variant::VecHdr),
                HDR_BLOB => Ok(Variant::BlobHdr),
                HDR_MDR => Ok(Variant::BlobMdr),
                HDR_BVL => Ok(Variant::BvlHdr),
                HDR_LIT => Ok(Variant::Literal),
                _ => Err(Malformed(self.0)),
            },
        }
    }

    /// Decode the variant. Total on well-formed words; panics on a
    /// malformed encoding.
    #[must_use]
    pub fn variant(self) -> Variant {
        match self.try_variant() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    // --- immediates ---

    pub(crate) fn fixint(i: isize) -> Self {
        assert!(
            (FIXINT_MIN..=FIXINT_MAX).contains(&i),
            "fixint {i} out of range"
        );
        Word((i as usize) << 2)
    }

    #[must_use]
    pub fn is_fixint(self) -> bool {
        self.0 & 0b11 == 0
    }

    /// The signed value of a fixnum. Requires `is_fixint`.
    #[must_use]
    pub fn fixint_value(self) -> isize {
        assert!(self.is_fixint(), "fixint_value of {self:?}");
        (self.0 as isize) >> 2
    }

    pub(crate) const fn literal(payload: usize) -> Self {
        Word((payload << HDR_BITS) | HDR_LIT)
    }

    /// The payload of a literal word. Requires the literal variant.
    #[must_use]
    pub fn literal_payload(self) -> usize {
        assert!(
            self.0 & HDR_MASK == HDR_LIT,
            "literal_payload of {self:?}"
        );
        self.0 >> HDR_BITS
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == LIT_NULL
    }

    #[must_use]
    pub fn is_void(self) -> bool {
        self.0 == LIT_VOID
    }

    /// True exactly for the `#t` and `#f` words.
    #[must_use]
    pub fn is_bool(self) -> bool {
        self.0 == LIT_TRUE || self.0 == LIT_FALSE
    }

    /// Every word is truthy except `#f`.
    #[must_use]
    pub fn truth(self) -> bool {
        self.0 != LIT_FALSE
    }

    /// The boolean denoted by this word. Requires `is_bool`.
    #[must_use]
    pub fn bool_value(self) -> bool {
        assert!(self.is_bool(), "bool_value of {self:?}");
        self.0 == LIT_TRUE
    }

    // --- sequences ---

    #[must_use]
    pub fn is_kons(self) -> bool {
        self.0 & PTR_MASK == TAG_KONS
    }

    #[must_use]
    pub fn is_snok(self) -> bool {
        self.0 & PTR_MASK == TAG_SNOK
    }

    /// Null, or either flavor of 2-word list cell.
    #[must_use]
    pub fn is_seq(self) -> bool {
        self.is_null() || self.is_kons() || self.is_snok()
    }

    // --- pointers ---

    pub(crate) fn is_valref(self) -> bool {
        self.0 & PTR_MASK == TAG_VAL
    }

    /// Target address of a pointer-flavored word, with the tag stripped.
    pub(crate) fn addr(self) -> NonNull<Word> {
        debug_assert!(self.0 & 1 == 1, "addr of non-pointer {self:?}");
        NonNull::new((self.0 & !PTR_MASK) as *mut Word).expect("null object pointer")
    }

    pub(crate) fn tag_ptr(ptr: NonNull<Word>, tag: usize) -> Self {
        let addr = ptr.as_ptr() as usize;
        assert_eq!(
            addr & (CELL_ALIGN - 1),
            0,
            "object address {addr:#x} is not {CELL_ALIGN}-byte aligned"
        );
        Word(addr | tag)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_variant() {
            Ok(Variant::Fixnum) => write!(f, "Fixnum({})", (self.0 as isize) >> 2),
            Ok(Variant::Literal) => match self.0 {
                LIT_TRUE => f.write_str("#t"),
                LIT_FALSE => f.write_str("#f"),
                LIT_VOID => f.write_str("#void"),
                LIT_NULL => f.write_str("#null"),
                _ => write!(f, "Literal({})", self.0 >> HDR_BITS),
            },
            Ok(v) => write!(f, "{v:?}({:#x})", self.0),
            Err(_) => write!(f, "Malformed({:#x})", self.0),
        }
    }
}

#[test]
fn fixnum_round_trip() {
    for i in [0, 1, -1, 42, -42, FIXINT_MIN, FIXINT_MAX] {
        let w = Word::fixint(i);
        assert_eq!(w.variant(), Variant::Fixnum);
        assert!(w.is_fixint());
        assert_eq!(w.fixint_value(), i);
    }
}

#[test]
#[should_panic(expected = "out of range")]
fn fixnum_overflow() {
    let _ = Word::fixint(FIXINT_MAX + 1);
}

#[test]
fn pointer_tags() {
    let addr = 0x1000 as *mut Word;
    let p = NonNull::new(addr).unwrap();
    for (tag, variant) in [
        (TAG_KONS, Variant::KonsRef),
        (TAG_SNOK, Variant::SnokRef),
        (TAG_VAL, Variant::ValRef),
        (TAG_INTR, Variant::IntrRef),
    ] {
        let w = Word::tag_ptr(p, tag);
        assert_eq!(w.variant(), variant);
        assert_eq!(w.addr(), p);
        assert_eq!(w.raw() & !0b111, 0x1000);
    }
}

#[test]
fn literal_identity() {
    let t = Word::from_raw(LIT_TRUE);
    let f = Word::from_raw(LIT_FALSE);
    assert!(t.is_bool() && f.is_bool());
    assert!(t.truth());
    assert!(!f.truth());
    assert!(t.bool_value());
    assert!(!f.bool_value());
    assert!(Word::from_raw(LIT_NULL).is_null());
    assert!(Word::from_raw(LIT_VOID).is_void());
    // any non-#f word is truthy
    assert!(Word::fixint(0).truth());
    assert!(Word::from_raw(LIT_NULL).truth());
    assert!(!Word::fixint(7).is_bool());
}

#[test]
fn header_variants() {
    assert_eq!(Word::from_raw(0b00010).variant(), Variant::VecHdr);
    assert_eq!(Word::from_raw(0b00110).variant(), Variant::BlobHdr);
    assert_eq!(Word::from_raw(0b01010).variant(), Variant::BlobMdr);
    assert_eq!(Word::from_raw(0b01110).variant(), Variant::BvlHdr);
    assert_eq!(Word::from_raw(0b11010).variant(), Variant::Literal);
}

#[test]
fn malformed_headers() {
    for raw in [0b10010usize, 0b10110, 0b11110] {
        assert_eq!(Word::from_raw(raw).try_variant(), Err(Malformed(raw)));
        // upper bits do not rescue a bad tag
        assert!(Word::from_raw(raw | 0xbeef00).try_variant().is_err());
    }
}

#[test]
#[should_panic(expected = "malformed word")]
fn malformed_is_fatal() {
    let _ = Word::from_raw(0b10010).variant();
}

#[test]
fn seq_recognition_on_immediates() {
    assert!(Word::from_raw(LIT_NULL).is_seq());
    assert!(!Word::from_raw(LIT_TRUE).is_seq());
    assert!(!Word::fixint(3).is_seq());
}
