use bitfield_struct::bitfield;
use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttributeFlags: u8 {
        const OPTIONAL = 0x80;
        const TRANSITIVE = 0x40;
        const PARTIAL = 0x20;
        const EXTENDED = 0x10;
    }
}

impl AttributeFlags {
    pub fn is_extended(&self) -> bool {
        self.contains(AttributeFlags::EXTENDED)
    }

    pub fn is_optional_transitive(&self) -> bool {
        self.contains(AttributeFlags::OPTIONAL | AttributeFlags::TRANSITIVE)
    }
}

impl fmt::Display for AttributeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}

#[bitfield(u8, debug = true)]
#[derive(Serialize, PartialEq)]
pub struct AttrFlags {
    #[bits(4)]
    pub resvd: u8,
    pub extended: bool,
    pub partial: bool,
    pub transitive: bool,
    pub optional: bool,
}

impl AttrFlags {
    pub fn optional_transitive() -> Self {
        AttrFlags::new().with_optional(true).with_transitive(true)
    }
}
