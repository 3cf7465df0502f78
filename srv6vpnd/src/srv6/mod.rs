pub mod behavior;
pub use behavior::*;

pub mod pool;
pub use pool::FunctionPool;

pub mod locator;
pub use locator::*;

pub mod sid;
pub use sid::*;

pub mod manager;
pub use manager::*;
