use crate::MemberHandle;
use rustdmp_core::block::DEFAULT_MAX_BLOCK_LEN;
use thiserror::Error;

/// Errors raised by a session carrier.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("block of {len} bytes exceeds session limit of {limit}")]
    BlockTooLarge { len: usize, limit: usize },
    #[error("member {0} is not reachable on this session")]
    UnknownMember(MemberHandle),
    #[error("session closed")]
    Closed,
}

/// Sending side of a session.
///
/// `send` never blocks: it either hands the block to the carrier or fails.
/// Dispatch runs synchronously inside the receive path, so this is the only
/// send the component layer needs.
pub trait Session: Send + Sync {
    /// Sends one complete block to `dest`.
    fn send(&self, dest: MemberHandle, block: &[u8]) -> Result<(), SessionError>;

    /// Largest block the carrier accepts.
    fn max_block_len(&self) -> usize {
        DEFAULT_MAX_BLOCK_LEN
    }
}

/// Receiving side of a session.
pub trait BlockSource: Send + Sync {
    /// Receives one block into `buf`, returning `(bytes_read, source)`.
    async fn recv_block(&self, buf: &mut [u8]) -> Result<(usize, MemberHandle), SessionError>;
}
