pub mod route;
pub use route::*;

pub mod installer;
pub use installer::*;

pub mod inst;
pub use inst::*;
