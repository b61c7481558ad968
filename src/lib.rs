//! Tagged-word value representation for a Lisp-family runtime, with a
//! managed allocation space and stack-rooted handles.
//!
//! | Value | Representation |
//! |-------|----------------|
//! | Fixnums, literals, nyms | Immediate words, tag in the low 2/5 bits |
//! | Lists | Header-less 2-word cells, forward (kons) or reverse (snok), kind carried by the pointer tag |
//! | Pairs with a non-seq tail | 3-word `[_pr, car, cdr]` blocks |
//! | Vectors, byte vectors, blobs | Headered word runs, lengths inline or in overflow words |
//!
//! Values are created through a [`Space`], which roots every result in a
//! handle list that a future collector walks for liveness.

/// Allocator interface and the bump arena
pub mod alloc;
/// Immediate value constructors
pub mod atom;
/// Rooted references
pub mod handle;
/// Heap object headers and layout descriptors
pub mod layout;
/// Three-letter symbolic tags
pub mod nym;
/// Allocation façade
pub mod space;
/// Word variants and tagging
pub mod word;

pub use self::alloc::{AllocError, Allocator, Bump};
pub use self::atom::{Atom, FixInt, Lit, ToWord};
pub use self::handle::Handle;
pub use self::layout::{LayoutDesc, SlotKind};
pub use self::nym::Nym;
pub use self::space::Space;
pub use self::word::{Malformed, Variant, Word};
