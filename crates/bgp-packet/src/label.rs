use std::fmt;

use bytes::{BufMut, BytesMut};
use nom::{IResult, Parser};
use nom::bytes::complete::take;

use crate::ParseBe;

// Label field of a labeled VPN NLRI (RFC 8277), 3 octets:
// |                Label (20 bits)                | Exp |S|
//
// SRv6 L3VPN routes carry the label field as well. With no transposition
// it holds the implicit-null value and the service SID lives in the
// Prefix-SID attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub label: u32,
    pub exp: u8,
    pub bos: bool,
}

impl Label {
    pub const IMPLICIT_NULL: u32 = 3;

    pub fn new(label: u32, exp: u8, bos: bool) -> Self {
        Label {
            label: label & 0x000F_FFFF,
            exp: exp & 0x07,
            bos,
        }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        let v = (self.label << 4) | ((self.exp as u32) << 1) | (self.bos as u32);
        let b = v.to_be_bytes();
        [b[1], b[2], b[3]]
    }

    pub fn emit(&self, buf: &mut BytesMut) {
        buf.put(&self.to_bytes()[..]);
    }
}

impl ParseBe<Label> for Label {
    fn parse_be(input: &[u8]) -> IResult<&[u8], Label> {
        let (input, val) = take(3usize).parse(input)?;
        let v = u32::from_be_bytes([0, val[0], val[1], val[2]]);
        let label = Label {
            label: v >> 4,
            exp: ((v >> 1) & 0x07) as u8,
            bos: (v & 0x01) == 1,
        };
        Ok((input, label))
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new(Self::IMPLICIT_NULL, 0, true)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if self.bos {
            write!(f, "(BoS)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_bytes() {
        let label = Label::new(16001, 0, true);
        let bytes = label.to_bytes();
        assert_eq!(bytes, [0x03, 0xe8, 0x11]);

        let (rest, parsed) = Label::parse_be(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, label);
    }

    #[test]
    fn test_label_short_input() {
        assert!(Label::parse_be(&[0x00, 0x01]).is_err());
    }
}
