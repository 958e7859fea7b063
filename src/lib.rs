//! Sans-io implementation of the USIS instrument control protocol.
//!
//! A device exposes named *properties*, each made of typed *attributes*, over
//! a byte stream (typically a serial link). A host reads and writes them with
//! short text frames, one per line:
//!
//! ```text
//! COMMAND[;PROPERTY[;VALUE1[;VALUE2]]][*CC]\n
//! ```
//!
//! The optional `*CC` trailer is the XOR of every byte before the `*`,
//! written as two upper case hex digits. Replies only carry a checksum when
//! the request did.
//!
//! The device side is [`Node`], which owns a [`Registry`] and a [`Framer`]
//! and is fed one byte at a time. The host side lives in [`master`].
//!
//! ```
//! use usis_proto::{Node, Property, Registry, Variant};
//!
//! let mut registry = Registry::new();
//! registry.add(Property::new("FOCUS", Variant::float(12.5))).unwrap();
//!
//! let mut node = Node::new(registry);
//! let mut out = Vec::new();
//! node.receive_data(b"GET;FOCUS;VALUE\n", 0, &mut out);
//! assert_eq!(out, b"M00;FOCUS;VALUE;OK;12.5000\n");
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod buffer;
pub mod dispatch;
pub mod framing;
pub mod introspection;
pub mod master;
pub mod node;
mod nom_parser;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

pub use framing::{FrameError, FrameEvent, Framer};
pub use node::{Node, NodeConfig};
pub use protocol::{ErrorCode, Request, Response};
pub use registry::{Attribute, Handler, Message, Property, Registry, RegistryError};
pub use transport::{Clock, Sink, Transport};
pub use types::{Input, Mode, Payload, SetError, State, Variant, VariantType};

/// Longest accepted frame, terminator excluded.
pub const MAX_FRAME_LEN: usize = 150;

/// A partial frame older than this is dropped with a `C01 TIMEOUT` reply.
pub const TIMEOUT_MS: u32 = 1000;

/// Name of the implicit first attribute of every property.
pub const DEFAULT_ATTRIBUTE: &str = "VALUE";

pub(crate) mod ascii {
    pub const SEPARATOR: u8 = b';';
    pub const CHECKSUM_MARK: u8 = b'*';
    pub const EOL: u8 = b'\n';
    pub const CR: u8 = b'\r';
}

/// XOR checksum over `data`.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, byte| crc ^ byte)
}

/// The two upper case hex digits of `crc`, high nibble first.
pub const fn checksum_digits(crc: u8) -> [u8; 2] {
    [hex_digit(crc >> 4), hex_digit(crc & 0x0f)]
}

const fn hex_digit(nibble: u8) -> u8 {
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'A' + nibble - 10
    }
}
