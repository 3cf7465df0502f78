use thiserror::Error;

use crate::AttrType;

#[derive(Error, Debug)]
pub enum BgpParseError {
    #[error("Failed to parse BGP attribute {attr_type:?}: {source}")]
    AttributeParseError {
        attr_type: AttrType,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unexpected attribute type: expected {expected:?}, got {actual:?}")]
    UnexpectedAttributeType { expected: AttrType, actual: AttrType },

    #[error("Nom parsing error: {0}")]
    NomError(String),

    #[error("Incomplete data: need {needed} more bytes")]
    IncompleteData { needed: usize },
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for BgpParseError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(needed) => {
                let needed_bytes = match needed {
                    nom::Needed::Unknown => 0,
                    nom::Needed::Size(size) => size.get(),
                };
                BgpParseError::IncompleteData {
                    needed: needed_bytes,
                }
            }
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                BgpParseError::NomError(format!("{:?}: {:?}", e.code, e.input))
            }
        }
    }
}

/// Errors from decoding the TLVs of a BGP Prefix-SID attribute.
///
/// Every malformed input maps to one of these variants. The caller keeps
/// the BGP session up and marks the route invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated TLV {tlv_type}: declared {declared} bytes, {available} available")]
    TruncatedTlv {
        tlv_type: u8,
        declared: usize,
        available: usize,
    },

    #[error("Unknown Prefix-SID TLV type {0}")]
    UnknownType(u8),

    #[error("Invalid length for TLV {tlv_type}: expected {expected}, got {actual}")]
    InvalidLength {
        tlv_type: u8,
        expected: usize,
        actual: usize,
    },

    #[error("SID structure lengths sum to {sum}, exceeding 128 bits")]
    InvalidStructure { sum: u16 },
}

impl DecodeError {
    pub fn truncated(tlv_type: u8, declared: usize, available: usize) -> Self {
        DecodeError::TruncatedTlv {
            tlv_type,
            declared,
            available,
        }
    }
}
