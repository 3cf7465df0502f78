use std::net::{Ipv4Addr, Ipv6Addr};

use nom::IResult;
use nom::number::complete::{be_u32, be_u128};

pub trait ParseBe<T> {
    fn parse_be(input: &[u8]) -> IResult<&[u8], T>;
}

impl ParseBe<Ipv4Addr> for Ipv4Addr {
    fn parse_be(input: &[u8]) -> IResult<&[u8], Self> {
        if input.len() < 4 {
            return Err(nom::Err::Incomplete(nom::Needed::new(4)));
        }
        let (input, addr) = be_u32(input)?;
        Ok((input, Self::from(addr)))
    }
}

impl ParseBe<Ipv6Addr> for Ipv6Addr {
    fn parse_be(input: &[u8]) -> IResult<&[u8], Self> {
        if input.len() < 16 {
            return Err(nom::Err::Incomplete(nom::Needed::new(16)));
        }
        let (input, addr) = be_u128(input)?;
        Ok((input, Self::from(addr)))
    }
}

/// Number of octets carrying a prefix of `plen` bits.
pub fn nlri_psize(plen: u8) -> usize {
    plen.div_ceil(8).into()
}
