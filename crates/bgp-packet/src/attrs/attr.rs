use nom::number::complete::{be_u8, be_u16};

use crate::{AttributeFlags, BgpParseError};

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AttrType {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MpReachNlri = 14,
    MpUnreachNlri = 15,
    ExtendedCom = 16,
    PrefixSid = 40,
    Unknown(u8),
}

impl From<u8> for AttrType {
    fn from(attr_type: u8) -> Self {
        use AttrType::*;
        match attr_type {
            1 => Origin,
            2 => AsPath,
            3 => NextHop,
            14 => MpReachNlri,
            15 => MpUnreachNlri,
            16 => ExtendedCom,
            40 => PrefixSid,
            v => Unknown(v),
        }
    }
}

impl From<AttrType> for u8 {
    fn from(attr_type: AttrType) -> Self {
        use AttrType::*;
        match attr_type {
            Origin => 1,
            AsPath => 2,
            NextHop => 3,
            MpReachNlri => 14,
            MpUnreachNlri => 15,
            ExtendedCom => 16,
            PrefixSid => 40,
            Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrHeader {
    pub flags: AttributeFlags,
    pub attr_type: AttrType,
    pub len: usize,
}

impl AttrHeader {
    /// Splits one path attribute off `input`. Returns the remaining input,
    /// the attribute value and its header.
    pub fn parse_attr(input: &[u8]) -> Result<(&[u8], &[u8], AttrHeader), BgpParseError> {
        let (input, flags_byte) = be_u8(input)?;
        let flags = AttributeFlags::from_bits_truncate(flags_byte);
        let (input, attr_type_byte) = be_u8(input)?;
        let attr_type: AttrType = attr_type_byte.into();

        let (input, len) = if flags.is_extended() {
            let (input, len) = be_u16(input)?;
            (input, len as usize)
        } else {
            let (input, len) = be_u8(input)?;
            (input, len as usize)
        };

        if input.len() < len {
            return Err(BgpParseError::IncompleteData {
                needed: len - input.len(),
            });
        }
        let (value, input) = input.split_at(len);
        let header = AttrHeader {
            flags,
            attr_type,
            len,
        };
        Ok((input, value, header))
    }
}
