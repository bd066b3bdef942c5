//! In-process session for tests and tools.

use crate::{BlockSource, MemberHandle, Session, SessionError};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Delivery = (MemberHandle, Vec<u8>);

/// Records every block sent and, when paired, delivers it to the peer.
///
/// A session made with [`MemorySession::new`] accepts any destination and
/// only records. Sessions made with [`MemorySession::pair`] forward to each
/// other and refuse other destinations.
#[derive(Debug, Clone)]
pub struct MemorySession {
    local: MemberHandle,
    peer: Option<(MemberHandle, UnboundedSender<Delivery>)>,
    sent: Arc<Mutex<Vec<Delivery>>>,
    inbox_tx: UnboundedSender<Delivery>,
    inbox: Arc<tokio::sync::Mutex<UnboundedReceiver<Delivery>>>,
}

impl MemorySession {
    pub fn new(local: MemberHandle) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        Self {
            local,
            peer: None,
            sent: Arc::default(),
            inbox_tx,
            inbox: Arc::new(tokio::sync::Mutex::new(inbox)),
        }
    }

    /// Two sessions wired to each other.
    pub fn pair(a: MemberHandle, b: MemberHandle) -> (Self, Self) {
        let mut left = Self::new(a);
        let mut right = Self::new(b);
        left.peer = Some((b, right.inbox_tx.clone()));
        right.peer = Some((a, left.inbox_tx.clone()));
        (left, right)
    }

    pub fn local_member(&self) -> MemberHandle {
        self.local
    }

    /// Queues `block` as if `source` had sent it to this session.
    pub fn deliver(&self, source: MemberHandle, block: &[u8]) -> Result<(), SessionError> {
        self.inbox_tx
            .send((source, block.to_vec()))
            .map_err(|_| SessionError::Closed)
    }

    /// Blocks sent so far, oldest first.
    pub fn sent(&self) -> Vec<Delivery> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the record of sent blocks.
    pub fn take_sent(&self) -> Vec<Delivery> {
        core::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Session for MemorySession {
    fn send(&self, dest: MemberHandle, block: &[u8]) -> Result<(), SessionError> {
        if let Some((peer, tx)) = &self.peer {
            if *peer != dest {
                return Err(SessionError::UnknownMember(dest));
            }
            tx.send((self.local, block.to_vec()))
                .map_err(|_| SessionError::Closed)?;
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((dest, block.to_vec()));
        Ok(())
    }
}

impl BlockSource for MemorySession {
    async fn recv_block(&self, buf: &mut [u8]) -> Result<(usize, MemberHandle), SessionError> {
        let (source, block) = self
            .inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(SessionError::Closed)?;
        if block.len() > buf.len() {
            return Err(SessionError::BlockTooLarge {
                len: block.len(),
                limit: buf.len(),
            });
        }
        buf[..block.len()].copy_from_slice(&block);
        Ok((block.len(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_session_records_any_destination() {
        let s = MemorySession::new(MemberHandle::Local(0));
        s.send(MemberHandle::Local(7), &[1, 2]).unwrap();
        s.send(MemberHandle::Local(8), &[3]).unwrap();
        assert_eq!(
            s.take_sent(),
            vec![
                (MemberHandle::Local(7), vec![1, 2]),
                (MemberHandle::Local(8), vec![3])
            ]
        );
        assert!(s.sent().is_empty());
    }

    #[tokio::test]
    async fn paired_sessions_deliver_to_each_other() {
        let (a, b) = MemorySession::pair(MemberHandle::Local(1), MemberHandle::Local(2));
        a.send(MemberHandle::Local(2), &[9, 9]).unwrap();

        let mut buf = [0u8; 8];
        let (n, src) = b.recv_block(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[9, 9]);
        assert_eq!(src, MemberHandle::Local(1));

        assert!(matches!(
            a.send(MemberHandle::Local(3), &[0]),
            Err(SessionError::UnknownMember(MemberHandle::Local(3)))
        ));
    }

    #[tokio::test]
    async fn short_buffer_is_reported() {
        let s = MemorySession::new(MemberHandle::Local(0));
        s.deliver(MemberHandle::Local(1), &[0; 4]).unwrap();
        let mut buf = [0u8; 2];
        assert!(matches!(
            s.recv_block(&mut buf).await,
            Err(SessionError::BlockTooLarge { len: 4, limit: 2 })
        ));
    }
}
