pub mod error;
pub use error::*;

pub mod message;
pub use message::*;

pub mod dataplane;
pub use dataplane::*;

pub mod worker;
pub use worker::*;
