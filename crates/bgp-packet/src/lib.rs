pub mod afi;
pub use afi::*;

pub mod attrs;
pub use attrs::*;

pub mod error;
pub use error::*;

pub mod label;
pub use label::*;

pub mod parse_be;
pub use parse_be::{ParseBe, nlri_psize};
