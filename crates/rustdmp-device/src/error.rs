use rustdmp_core::pdu::ReasonCode;
use rustdmp_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DmpError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("encode error: {0}")]
    Encode(#[from] rustdmp_core::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] rustdmp_core::DecodeError),
    #[error("map error: {0}")]
    Map(#[from] rustdmp_core::MapError),
    #[error("no property at address {0}")]
    UnknownAddress(u32),
    /// The data of a PDU can no longer be walked; the rest of the block is
    /// dropped.
    #[error("lost synchronization with block data")]
    LostSync,
    #[error("request timed out")]
    Timeout,
    #[error("remote failure at address {address}: {reason:?}")]
    RemoteFailure { address: u32, reason: ReasonCode },
}
