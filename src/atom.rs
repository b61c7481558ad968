use num_enum::TryFromPrimitive;

use crate::nym::Nym;
use crate::word::{FIXINT_MAX, FIXINT_MIN, Variant, Word};

/// The four literal constants, by payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Lit {
    /// `#t`, truth
    True = 0,
    /// `#f`, the sole falsy value
    False = 1,
    /// `#void`, the undisplayed value
    Void = 2,
    /// `#null`, the empty sequence
    Null = 3,
}

impl Lit {
    /// The tagged word for this literal.
    #[must_use]
    pub const fn word(self) -> Word {
        Word::literal(self as usize)
    }

    /// Recover the literal a word denotes, if it is one of the four.
    #[must_use]
    pub fn of_word(w: Word) -> Option<Lit> {
        if w.try_variant() == Ok(Variant::Literal) {
            u8::try_from(w.literal_payload())
                .ok()
                .and_then(|p| Lit::try_from(p).ok())
        } else {
            None
        }
    }
}

/// A fixed-point integer: a signed immediate with two tag bits to spare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixInt(Word);

impl FixInt {
    /// Encode `i`. Panics outside `[FIXINT_MIN, FIXINT_MAX]`.
    #[must_use]
    pub fn new(i: isize) -> Self {
        FixInt(Word::fixint(i))
    }

    /// Encode `i` if it fits.
    #[must_use]
    pub fn try_new(i: isize) -> Option<Self> {
        (FIXINT_MIN..=FIXINT_MAX).contains(&i).then(|| Self::new(i))
    }

    #[must_use]
    pub fn value(self) -> isize {
        self.0.fixint_value()
    }
}

/// Any tagged self-contained word-sized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom(Word);

impl From<FixInt> for Atom {
    fn from(x: FixInt) -> Self {
        Atom(x.0)
    }
}

impl From<Lit> for Atom {
    fn from(x: Lit) -> Self {
        Atom(x.word())
    }
}

impl From<Nym> for Atom {
    fn from(x: Nym) -> Self {
        Atom(x.word())
    }
}

/// Anything a [`Space`](crate::Space) constructor accepts in a value
/// position: a rooted handle, or an immediate that needs no rooting.
pub trait ToWord {
    fn to_word(&self) -> Word;
}

impl<T: ToWord> ToWord for &T {
    fn to_word(&self) -> Word {
        (**self).to_word()
    }
}

impl ToWord for Atom {
    fn to_word(&self) -> Word {
        self.0
    }
}

impl ToWord for FixInt {
    fn to_word(&self) -> Word {
        self.0
    }
}

impl ToWord for Lit {
    fn to_word(&self) -> Word {
        self.word()
    }
}

impl ToWord for Nym {
    fn to_word(&self) -> Word {
        self.word()
    }
}

#[test]
fn literal_payloads() {
    assert_eq!(Lit::True.word().literal_payload(), 0);
    assert_eq!(Lit::False.word().literal_payload(), 1);
    assert_eq!(Lit::Void.word().literal_payload(), 2);
    assert_eq!(Lit::Null.word().literal_payload(), 3);
    assert!(Lit::Null.word().is_null());
    assert_eq!(Lit::of_word(Lit::Void.word()), Some(Lit::Void));
    assert_eq!(Lit::of_word(Word::literal(9)), None);
    assert_eq!(Lit::of_word(FixInt::new(3).to_word()), None);
}

#[test]
fn fixint_limits() {
    assert_eq!(FixInt::new(-5).value(), -5);
    assert_eq!(FixInt::try_new(FIXINT_MAX).map(FixInt::value), Some(FIXINT_MAX));
    assert_eq!(FixInt::try_new(FIXINT_MAX + 1), None);
    assert_eq!(FixInt::try_new(FIXINT_MIN - 1), None);
}

#[test]
fn atoms_carry_their_word() {
    assert_eq!(Atom::from(Lit::Null).to_word(), Lit::Null.word());
    assert_eq!(Atom::from(FixInt::new(12)).to_word().fixint_value(), 12);
}
