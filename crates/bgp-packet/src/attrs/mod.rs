pub mod attr;
pub use attr::*;

pub mod flags;
pub use flags::*;

pub mod emitter;
pub use emitter::*;

pub mod rd;
pub use rd::*;

pub mod nlri_vpn;
pub use nlri_vpn::*;

pub mod prefix_sid;
pub use prefix_sid::*;
