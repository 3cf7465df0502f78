use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::{IResult, Parser};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::ParseBe;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteDistinguisherType {
    ASN = 0,
    IP = 1,
    ASN4 = 2,
}

/// Route Distinguisher (RFC 4364 section 4.2). `val` holds the 6 octets
/// after the type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteDistinguisher {
    pub typ: RouteDistinguisherType,
    pub val: [u8; 6],
}

impl RouteDistinguisher {
    pub const LEN: usize = 8;

    pub fn asn(asn: u16, num: u32) -> Self {
        let mut val = [0u8; 6];
        val[..2].copy_from_slice(&asn.to_be_bytes());
        val[2..].copy_from_slice(&num.to_be_bytes());
        Self {
            typ: RouteDistinguisherType::ASN,
            val,
        }
    }

    pub fn ip(addr: Ipv4Addr, num: u16) -> Self {
        let mut val = [0u8; 6];
        val[..4].copy_from_slice(&addr.octets());
        val[4..].copy_from_slice(&num.to_be_bytes());
        Self {
            typ: RouteDistinguisherType::IP,
            val,
        }
    }

    pub fn asn4(asn: u32, num: u16) -> Self {
        let mut val = [0u8; 6];
        val[..4].copy_from_slice(&asn.to_be_bytes());
        val[4..].copy_from_slice(&num.to_be_bytes());
        Self {
            typ: RouteDistinguisherType::ASN4,
            val,
        }
    }

    pub fn emit(&self, buf: &mut BytesMut) {
        buf.put_u16(self.typ as u16);
        buf.put(&self.val[..]);
    }
}

impl ParseBe<RouteDistinguisher> for RouteDistinguisher {
    fn parse_be(input: &[u8]) -> IResult<&[u8], RouteDistinguisher> {
        let (input, typ) = be_u16(input)?;
        let typ = match typ {
            0 => RouteDistinguisherType::ASN,
            1 => RouteDistinguisherType::IP,
            2 => RouteDistinguisherType::ASN4,
            _ => {
                return Err(nom::Err::Error(nom::error::make_error(
                    input,
                    nom::error::ErrorKind::Tag,
                )));
            }
        };
        let (input, v) = take(6usize).parse(input)?;
        let mut val = [0u8; 6];
        val.copy_from_slice(v);
        Ok((input, RouteDistinguisher { typ, val }))
    }
}

impl fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.val;
        match self.typ {
            RouteDistinguisherType::ASN => {
                let asn = u16::from_be_bytes([v[0], v[1]]);
                let num = u32::from_be_bytes([v[2], v[3], v[4], v[5]]);
                write!(f, "{asn}:{num}")
            }
            RouteDistinguisherType::IP => {
                let addr = Ipv4Addr::new(v[0], v[1], v[2], v[3]);
                let num = u16::from_be_bytes([v[4], v[5]]);
                write!(f, "{addr}:{num}")
            }
            RouteDistinguisherType::ASN4 => {
                let asn = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
                let num = u16::from_be_bytes([v[4], v[5]]);
                write!(f, "{asn}:{num}")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid route distinguisher: {0}")]
pub struct RouteDistinguisherParseError(pub String);

impl FromStr for RouteDistinguisher {
    type Err = RouteDistinguisherParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RouteDistinguisherParseError(s.to_string());
        let (admin, assigned) = s.split_once(':').ok_or_else(err)?;

        if let Ok(addr) = admin.parse::<Ipv4Addr>() {
            let num: u16 = assigned.parse().map_err(|_| err())?;
            return Ok(Self::ip(addr, num));
        }
        let asn: u32 = admin.parse().map_err(|_| err())?;
        if asn > u16::MAX as u32 {
            let num: u16 = assigned.parse().map_err(|_| err())?;
            Ok(Self::asn4(asn, num))
        } else {
            let num: u32 = assigned.parse().map_err(|_| err())?;
            Ok(Self::asn(asn as u16, num))
        }
    }
}

impl Serialize for RouteDistinguisher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rd_from_str() {
        let rd: RouteDistinguisher = "1:1".parse().unwrap();
        assert_eq!(rd.typ, RouteDistinguisherType::ASN);
        assert_eq!(rd.val, [0, 1, 0, 0, 0, 1]);
        assert_eq!(rd.to_string(), "1:1");

        let rd: RouteDistinguisher = "10.0.0.1:5".parse().unwrap();
        assert_eq!(rd.typ, RouteDistinguisherType::IP);
        assert_eq!(rd.to_string(), "10.0.0.1:5");

        let rd: RouteDistinguisher = "4200000000:7".parse().unwrap();
        assert_eq!(rd.typ, RouteDistinguisherType::ASN4);
        assert_eq!(rd.to_string(), "4200000000:7");
    }

    #[test]
    fn test_rd_from_str_error() {
        assert!("1".parse::<RouteDistinguisher>().is_err());
        assert!("a:b".parse::<RouteDistinguisher>().is_err());
        assert!("10.0.0.1:70000".parse::<RouteDistinguisher>().is_err());
        let err = "65000".parse::<RouteDistinguisher>().unwrap_err();
        assert_eq!(err.to_string(), "invalid route distinguisher: 65000");
    }

    #[test]
    fn test_rd_parse() {
        let input = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0xff];
        let (rest, rd) = RouteDistinguisher::parse_be(&input).unwrap();
        assert_eq!(rest, &[0xff]);
        assert_eq!(rd, RouteDistinguisher::asn(1, 1));

        let mut buf = BytesMut::new();
        rd.emit(&mut buf);
        assert_eq!(&buf[..], &input[..8]);
    }

    #[test]
    fn test_rd_unknown_type() {
        let input = [0x00, 0x07, 0, 0, 0, 0, 0, 0];
        assert!(RouteDistinguisher::parse_be(&input).is_err());
    }
}
