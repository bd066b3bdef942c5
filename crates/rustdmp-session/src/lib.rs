#![allow(async_fn_in_trait)]

//! The session seam between DMP components and whatever carries their blocks.
//!
//! DMP itself assumes a reliable, ordered session layer. This crate only
//! defines what the component side needs from it ([`Session`] to send a
//! block, [`BlockSource`] to receive one) plus two carriers: [`UdpSession`]
//! for tools and simulators on a local network and [`MemorySession`] for
//! tests.

pub mod member;
pub mod memory;
pub mod traits;
pub mod udp;

pub use member::MemberHandle;
pub use memory::MemorySession;
pub use traits::{BlockSource, Session, SessionError};
pub use udp::UdpSession;
