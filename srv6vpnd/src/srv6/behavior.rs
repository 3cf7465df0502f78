use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// SRv6 endpoint behaviors installed as local SIDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
pub enum Behavior {
    #[strum(serialize = "End")]
    #[serde(rename = "End")]
    End,
    #[strum(serialize = "End.DT4")]
    #[serde(rename = "End.DT4")]
    EndDT4,
    #[strum(serialize = "End.DT6")]
    #[serde(rename = "End.DT6")]
    EndDT6,
}

impl Behavior {
    /// DT behaviors look the inner packet up in a VRF table.
    pub fn requires_context(&self) -> bool {
        matches!(self, Behavior::EndDT4 | Behavior::EndDT6)
    }

    /// Endpoint behavior codepoint (RFC 8986 section 10.2).
    pub fn codepoint(&self) -> u16 {
        match self {
            Behavior::End => 1,
            Behavior::EndDT6 => 18,
            Behavior::EndDT4 => 19,
        }
    }

    pub fn from_codepoint(codepoint: u16) -> Option<Self> {
        match codepoint {
            1 => Some(Behavior::End),
            18 => Some(Behavior::EndDT6),
            19 => Some(Behavior::EndDT4),
            _ => None,
        }
    }
}
