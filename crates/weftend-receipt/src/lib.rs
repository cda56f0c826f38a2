//! Canonical receipt schemas, the zero-filled digest pattern, and structural
//! validators, grounded on the teacher's `xchecker-receipt` model/emit/writer
//! split.

pub mod digest;
pub mod model;
pub mod validate;
pub mod writer;

pub use digest::digest_with_zeroed_field;
pub use model::*;
