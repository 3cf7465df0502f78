use std::fmt;
use std::net::Ipv6Addr;

use bytes::{BufMut, BytesMut};
use nom::IResult;
use nom::number::complete::{be_u8, be_u16};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use strum_macros::Display;

use crate::{AttrEmitter, AttrFlags, AttrHeader, AttrType, BgpParseError, DecodeError, ParseBe};

// BGP Prefix-SID attribute (RFC 8669), SRv6 service TLVs (RFC 9252).
//
// SRv6 L3 VPN SID TLV:
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Type (4)    |        Length (19)            |   Reserved    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   SID Type    |    Flags      |   SID (16 octets) ...
//
// SRv6 L3 Service TLV:
// |   Type (5)    |        Length                 |   Reserved    |
// |   SID (16 octets) ...                                         |
// |  SID Flags    |   Endpoint Behavior           |   Reserved    |
// |  Sub-TLVs (SID Structure: type 1, length 6) ...
//
// SID Structure:
// | Block Len | Node Len | Func Len | Arg Len | Transp Len | Transp Offset |

const TLV_HEADER_LEN: usize = 3;
const L3VPN_SID_LEN: usize = 19;
const L3_SERVICE_FIXED_LEN: usize = 21;
const SID_STRUCTURE_LEN: usize = 6;
const SID_TYPE_SRV6: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Display)]
#[repr(u8)]
pub enum PrefixSidTlvType {
    #[strum(serialize = "Label-Index")]
    LabelIndex = 1,
    #[strum(serialize = "Originator SRGB")]
    OriginatorSrgb = 3,
    #[strum(serialize = "SRv6 L3 VPN SID")]
    Srv6L3Vpn = 4,
    #[strum(serialize = "SRv6 L3 Service")]
    Srv6L3Service = 5,
    #[strum(serialize = "SRv6 L2 Service")]
    Srv6L2Service = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Srv6SubTlvType {
    SidStructure = 1,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidStructure {
    pub locator_block_len: u8,
    pub locator_node_len: u8,
    pub function_len: u8,
    pub argument_len: u8,
}

impl SidStructure {
    pub fn new(locator_block_len: u8, locator_node_len: u8, function_len: u8, argument_len: u8) -> Self {
        Self {
            locator_block_len,
            locator_node_len,
            function_len,
            argument_len,
        }
    }

    pub fn total(&self) -> u16 {
        self.locator_block_len as u16
            + self.locator_node_len as u16
            + self.function_len as u16
            + self.argument_len as u16
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        let sum = self.total();
        if sum > 128 {
            return Err(DecodeError::InvalidStructure { sum });
        }
        Ok(())
    }

    fn parse(input: &[u8]) -> IResult<&[u8], SidStructure> {
        let (input, locator_block_len) = be_u8(input)?;
        let (input, locator_node_len) = be_u8(input)?;
        let (input, function_len) = be_u8(input)?;
        let (input, argument_len) = be_u8(input)?;
        // Transposition length and offset.
        let (input, _) = be_u16(input)?;
        Ok((
            input,
            SidStructure::new(locator_block_len, locator_node_len, function_len, argument_len),
        ))
    }

    fn emit(&self, buf: &mut BytesMut) {
        buf.put_u8(Srv6SubTlvType::SidStructure.into());
        buf.put_u16(SID_STRUCTURE_LEN as u16);
        buf.put_u8(self.locator_block_len);
        buf.put_u8(self.locator_node_len);
        buf.put_u8(self.function_len);
        buf.put_u8(self.argument_len);
        buf.put_u8(0);
        buf.put_u8(0);
    }
}

impl fmt::Display for SidStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.locator_block_len, self.locator_node_len, self.function_len, self.argument_len
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PrefixSid {
    Type4L3Vpn {
        sid: Ipv6Addr,
    },
    Type5Srv6L3Service {
        sid: Ipv6Addr,
        behavior: u16,
        structure: Option<SidStructure>,
    },
}

struct Tlv<'a> {
    typ: u8,
    value: &'a [u8],
}

fn split_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), DecodeError> {
    let Some((&typ, rest)) = input.split_first() else {
        return Err(DecodeError::truncated(0, TLV_HEADER_LEN, 0));
    };
    if rest.len() < 2 {
        return Err(DecodeError::truncated(typ, TLV_HEADER_LEN, input.len()));
    }
    let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    let rest = &rest[2..];
    if rest.len() < len {
        return Err(DecodeError::truncated(typ, len, rest.len()));
    }
    let (value, rest) = rest.split_at(len);
    Ok((Tlv { typ, value }, rest))
}

fn parse_l3_service(input: &[u8]) -> IResult<&[u8], (Ipv6Addr, u16)> {
    let (input, _resvd) = be_u8(input)?;
    let (input, sid) = Ipv6Addr::parse_be(input)?;
    let (input, _flags) = be_u8(input)?;
    let (input, behavior) = be_u16(input)?;
    let (input, _resvd) = be_u8(input)?;
    Ok((input, (sid, behavior)))
}

impl PrefixSid {
    /// Endpoint behavior value meaning "not signaled".
    pub const BEHAVIOR_OPAQUE: u16 = 0xffff;

    pub fn sid(&self) -> Ipv6Addr {
        match self {
            PrefixSid::Type4L3Vpn { sid } => *sid,
            PrefixSid::Type5Srv6L3Service { sid, .. } => *sid,
        }
    }

    pub fn structure(&self) -> Option<SidStructure> {
        match self {
            PrefixSid::Type4L3Vpn { .. } => None,
            PrefixSid::Type5Srv6L3Service { structure, .. } => *structure,
        }
    }

    pub fn tlv_type(&self) -> PrefixSidTlvType {
        match self {
            PrefixSid::Type4L3Vpn { .. } => PrefixSidTlvType::Srv6L3Vpn,
            PrefixSid::Type5Srv6L3Service { .. } => PrefixSidTlvType::Srv6L3Service,
        }
    }

    fn value_len(&self) -> usize {
        match self {
            PrefixSid::Type4L3Vpn { .. } => L3VPN_SID_LEN,
            PrefixSid::Type5Srv6L3Service { structure, .. } => {
                L3_SERVICE_FIXED_LEN
                    + structure.map_or(0, |_| TLV_HEADER_LEN + SID_STRUCTURE_LEN)
            }
        }
    }

    /// Encodes the TLV series carried in the attribute value.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(TLV_HEADER_LEN + self.value_len());
        self.emit(&mut buf);
        buf
    }

    /// Decodes the TLV series carried in the attribute value. The first TLV
    /// must be an SRv6 L3 VPN SID or SRv6 L3 Service TLV; TLVs after it are
    /// skipped.
    pub fn decode(input: &[u8]) -> Result<PrefixSid, DecodeError> {
        if let Some(&typ) = input.first() {
            match PrefixSidTlvType::try_from(typ) {
                Ok(PrefixSidTlvType::Srv6L3Vpn) | Ok(PrefixSidTlvType::Srv6L3Service) => {}
                _ => return Err(DecodeError::UnknownType(typ)),
            }
        }
        let (tlv, mut rest) = split_tlv(input)?;
        let prefix_sid = match PrefixSidTlvType::try_from(tlv.typ) {
            Ok(PrefixSidTlvType::Srv6L3Vpn) => Self::decode_l3vpn(tlv.value)?,
            Ok(PrefixSidTlvType::Srv6L3Service) => Self::decode_l3_service(tlv.value)?,
            _ => return Err(DecodeError::UnknownType(tlv.typ)),
        };
        while !rest.is_empty() {
            let (_, next) = split_tlv(rest)?;
            rest = next;
        }
        Ok(prefix_sid)
    }

    fn decode_l3vpn(value: &[u8]) -> Result<PrefixSid, DecodeError> {
        if value.len() != L3VPN_SID_LEN {
            return Err(DecodeError::InvalidLength {
                tlv_type: PrefixSidTlvType::Srv6L3Vpn.into(),
                expected: L3VPN_SID_LEN,
                actual: value.len(),
            });
        }
        // Reserved, SID type and flags precede the SID.
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&value[3..]);
        Ok(PrefixSid::Type4L3Vpn {
            sid: Ipv6Addr::from(octets),
        })
    }

    fn decode_l3_service(value: &[u8]) -> Result<PrefixSid, DecodeError> {
        let invalid_length = || DecodeError::InvalidLength {
            tlv_type: PrefixSidTlvType::Srv6L3Service.into(),
            expected: L3_SERVICE_FIXED_LEN,
            actual: value.len(),
        };
        if value.len() < L3_SERVICE_FIXED_LEN {
            return Err(invalid_length());
        }
        let (mut sub, (sid, behavior)) = parse_l3_service(value).map_err(|_| invalid_length())?;

        let mut structure = None;
        while !sub.is_empty() {
            let (tlv, next) = split_tlv(sub)?;
            if tlv.typ == u8::from(Srv6SubTlvType::SidStructure) && structure.is_none() {
                if tlv.value.len() != SID_STRUCTURE_LEN {
                    return Err(DecodeError::InvalidLength {
                        tlv_type: tlv.typ,
                        expected: SID_STRUCTURE_LEN,
                        actual: tlv.value.len(),
                    });
                }
                let (_, parsed) = SidStructure::parse(tlv.value).map_err(|_| {
                    DecodeError::truncated(tlv.typ, SID_STRUCTURE_LEN, tlv.value.len())
                })?;
                parsed.validate()?;
                structure = Some(parsed);
            }
            sub = next;
        }

        Ok(PrefixSid::Type5Srv6L3Service {
            sid,
            behavior,
            structure,
        })
    }

    /// Parses a complete path attribute (flags, type, length, value).
    pub fn parse_attr(input: &[u8]) -> Result<(&[u8], PrefixSid), BgpParseError> {
        let (input, value, header) = AttrHeader::parse_attr(input)?;
        if header.attr_type != AttrType::PrefixSid {
            return Err(BgpParseError::UnexpectedAttributeType {
                expected: AttrType::PrefixSid,
                actual: header.attr_type,
            });
        }
        let prefix_sid =
            PrefixSid::decode(value).map_err(|e| BgpParseError::AttributeParseError {
                attr_type: header.attr_type,
                source: Box::new(e),
            })?;
        Ok((input, prefix_sid))
    }
}

impl AttrEmitter for PrefixSid {
    fn attr_flags(&self) -> AttrFlags {
        AttrFlags::optional_transitive()
    }

    fn attr_type(&self) -> AttrType {
        AttrType::PrefixSid
    }

    fn len(&self) -> Option<usize> {
        Some(TLV_HEADER_LEN + self.value_len())
    }

    fn emit(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tlv_type().into());
        buf.put_u16(self.value_len() as u16);
        match self {
            PrefixSid::Type4L3Vpn { sid } => {
                buf.put_u8(0);
                buf.put_u8(SID_TYPE_SRV6);
                buf.put_u8(0);
                buf.put(&sid.octets()[..]);
            }
            PrefixSid::Type5Srv6L3Service {
                sid,
                behavior,
                structure,
            } => {
                buf.put_u8(0);
                buf.put(&sid.octets()[..]);
                buf.put_u8(0);
                buf.put_u16(*behavior);
                buf.put_u8(0);
                if let Some(structure) = structure {
                    structure.emit(buf);
                }
            }
        }
    }
}

impl fmt::Display for PrefixSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixSid::Type4L3Vpn { sid } => {
                write!(f, "{} {}", PrefixSidTlvType::Srv6L3Vpn, sid)
            }
            PrefixSid::Type5Srv6L3Service {
                sid,
                behavior,
                structure,
            } => {
                write!(
                    f,
                    "{} {} behavior 0x{:04x}",
                    PrefixSidTlvType::Srv6L3Service,
                    sid,
                    behavior
                )?;
                if let Some(structure) = structure {
                    write!(f, " structure {}", structure)?;
                }
                Ok(())
            }
        }
    }
}
