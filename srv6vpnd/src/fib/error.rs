use std::net::Ipv6Addr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataplaneError {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("entry not found")]
    NotFound,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("dataplane rejected entry after {attempts} attempts: {reason}")]
    DataplaneRejected { attempts: u32, reason: String },
    #[error("FIB worker is not running")]
    WorkerGone,
    #[error("SID {0} is not allocated")]
    NotAllocated(Ipv6Addr),
}
