use crate::{BlockSource, MemberHandle, Session, SessionError};
use rustdmp_core::block::DEFAULT_MAX_BLOCK_LEN;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

#[derive(Debug)]
enum Outgoing {
    Block(SocketAddr, Vec<u8>),
    /// Answered once everything queued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// Carries one block per UDP datagram.
///
/// There is no reliability layer; this is meant for tools and simulators on
/// a quiet local network. Sends are queued and written in order by a
/// background task, so a full socket buffer delays blocks instead of
/// dropping them.
#[derive(Debug, Clone)]
pub struct UdpSession {
    socket: Arc<UdpSocket>,
    outbox: UnboundedSender<Outgoing>,
    max_block_len: usize,
}

impl UdpSession {
    /// Binds the socket and starts its send task; must be called within a
    /// tokio runtime.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, SessionError> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let (outbox, queue) = mpsc::unbounded_channel();
        tokio::spawn(drain_outbox(socket.clone(), queue));
        Ok(Self {
            socket,
            outbox,
            max_block_len: DEFAULT_MAX_BLOCK_LEN,
        })
    }

    pub fn with_max_block_len(mut self, max_block_len: usize) -> Self {
        self.max_block_len = max_block_len;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SessionError> {
        self.socket.local_addr().map_err(SessionError::Io)
    }

    pub fn local_member(&self) -> Result<MemberHandle, SessionError> {
        self.local_addr().map(MemberHandle::Ip)
    }

    /// Waits until every block sent so far has been handed to the socket.
    pub async fn flush(&self) -> Result<(), SessionError> {
        let (done, written) = oneshot::channel();
        self.outbox
            .send(Outgoing::Flush(done))
            .map_err(|_| SessionError::Closed)?;
        written.await.map_err(|_| SessionError::Closed)
    }
}

/// Writes queued blocks until every session clone is gone.
async fn drain_outbox(socket: Arc<UdpSocket>, mut queue: UnboundedReceiver<Outgoing>) {
    while let Some(item) = queue.recv().await {
        let (addr, block) = match item {
            Outgoing::Block(addr, block) => (addr, block),
            Outgoing::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };
        match socket.send_to(&block, addr).await {
            Ok(sent) if sent == block.len() => {
                log::trace!("sent {} byte block to {addr}", block.len());
            }
            Ok(sent) => log::debug!("short datagram to {addr}: {sent} of {}", block.len()),
            Err(e) => log::debug!("udp send to {addr} failed: {e}"),
        }
    }
}

impl Session for UdpSession {
    fn send(&self, dest: MemberHandle, block: &[u8]) -> Result<(), SessionError> {
        let addr = dest
            .as_socket_addr()
            .ok_or(SessionError::UnknownMember(dest))?;
        if block.len() > self.max_block_len {
            return Err(SessionError::BlockTooLarge {
                len: block.len(),
                limit: self.max_block_len,
            });
        }
        self.outbox
            .send(Outgoing::Block(addr, block.to_vec()))
            .map_err(|_| SessionError::Closed)
    }

    fn max_block_len(&self) -> usize {
        self.max_block_len
    }
}

impl BlockSource for UdpSession {
    async fn recv_block(&self, buf: &mut [u8]) -> Result<(usize, MemberHandle), SessionError> {
        let (n, src) = self.socket.recv_from(buf).await?;
        Ok((n, MemberHandle::Ip(src)))
    }
}
