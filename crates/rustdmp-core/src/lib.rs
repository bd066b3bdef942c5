//! DMP property addressing and message encoding in pure Rust.
//!
//! `rustdmp-core` turns a device description's property table into an
//! address map, resolves wire addresses back to properties, and encodes and
//! decodes the PDUs that carry DMP messages inside a block. It has no I/O of
//! its own; sessions and component logic live in the sibling crates.
//!
//! # Feature flags
//!
//! - **`std`** (default) — enables `std::error::Error` implementations.
//! - **`alloc`** (default) — enables properties, address maps and the block writer.
//! - **`serde`** — derives `Serialize`/`Deserialize` on descriptor types.
//! - **`defmt`** — derives `defmt::Format` for embedded logging.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

/// Address fields: address specs, headers and the relative/absolute codec.
pub mod address;
/// Assembly of outgoing PDUs into size-limited blocks.
#[cfg(feature = "alloc")]
pub mod block;
/// Bounds-checked reader and writer over byte slices.
pub mod encoding;
/// Error types for encoding, decoding and map construction.
pub mod error;
/// Address maps built from property tables.
#[cfg(feature = "alloc")]
pub mod map;
/// PDU framing, vectors and reason codes.
pub mod pdu;
/// Property descriptors and validated property entries.
#[cfg(feature = "alloc")]
pub mod property;
/// Element sizes, encoding types and property flags.
pub mod types;
/// Iteration over the values carried by a PDU.
pub mod values;

pub use error::{DecodeError, EncodeError, MapError};
