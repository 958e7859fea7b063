//! The device side of the protocol.
//!
//! A [`Node`] owns the [`Registry`] and the frame state. Feed it received
//! bytes with [`Node::receive_byte()`] or [`Node::receive_data()`], and call
//! [`Node::poll_idle()`] when nothing arrives so that stale partial frames
//! time out. Replies are written to the [`Sink`] passed along with the data.
//!
//! [`Node::poll()`] bundles the two for a [`Transport`] and a [`Clock`],
//! performing one step of a cooperative main loop.

use log::trace;

use crate::dispatch::process_request;
use crate::framing::{FrameEvent, Framer};
use crate::protocol::{ErrorCode, Response};
use crate::registry::Registry;
use crate::transport::{Clock, Sink, Transport};
use crate::TIMEOUT_MS;

/// Node settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// A partial frame older than this is dropped with `C01 TIMEOUT`.
    pub timeout_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT_MS,
        }
    }
}

/// Device side protocol engine.
///
/// # Example
///
/// ```
/// use usis_proto::{Node, Property, Registry, Variant};
/// # use std::io::Cursor;
/// use usis_proto::transport::{IoTransport, StdClock};
///
/// # fn main() -> Result<(), usis_proto::RegistryError> {
/// let mut registry = Registry::new();
/// registry.add(Property::new("GAIN", Variant::int(3)))?;
/// let mut node = Node::new(registry);
///
/// // Any Read + Write stream will do, a serial port for instance.
/// let mut serial = IoTransport::new(Cursor::new(b"SET;GAIN;VALUE;5\n".to_vec()));
/// let clock = StdClock::new();
/// while node.poll(&mut serial, &clock) {}
///
/// let written = serial.into_inner().into_inner();
/// assert!(written.ends_with(b"M00;GAIN;VALUE;OK;5\n"));
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Node {
    framer: Framer,
    registry: Registry,
}

impl Node {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, NodeConfig::default())
    }

    pub fn with_config(registry: Registry, config: NodeConfig) -> Self {
        Self {
            framer: Framer::with_timeout(config.timeout_ms),
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to update measured values
    /// between polls.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn into_registry(self) -> Registry {
        self.registry
    }

    /// True while a partial frame is buffered.
    pub fn in_frame(&self) -> bool {
        self.framer.in_frame()
    }

    /// Process one byte received at `now` (milliseconds).
    ///
    /// Returns `None` while the frame is incomplete. When the byte completes
    /// a frame, the reply has been written to `out` and the outcome is
    /// returned.
    pub fn receive_byte(&mut self, byte: u8, now: u32, out: &mut dyn Sink) -> Option<Result<(), ErrorCode>> {
        let event = self.framer.push(byte, now)?;
        Some(handle_event(&mut self.registry, event, out))
    }

    /// Process a chunk of received bytes, same as calling
    /// [`receive_byte()`](Self::receive_byte()) for each of them.
    ///
    /// Returns the number of completed frames.
    pub fn receive_data(&mut self, data: &[u8], now: u32, out: &mut dyn Sink) -> usize {
        let mut frames = 0;
        for &byte in data {
            if self.receive_byte(byte, now, out).is_some() {
                frames += 1;
            }
        }
        frames
    }

    /// Time out a stale partial frame. Call this when no byte is available.
    pub fn poll_idle(&mut self, now: u32, out: &mut dyn Sink) -> Option<Result<(), ErrorCode>> {
        let event = self.framer.poll_idle(now)?;
        Some(handle_event(&mut self.registry, event, out))
    }

    /// Read at most one byte from `transport` and process it, or check the
    /// timeout if none is available.
    ///
    /// Returns whether a byte was read. Never blocks unless the transport does.
    pub fn poll<T, C>(&mut self, transport: &mut T, clock: &C) -> bool
    where
        T: Transport,
        C: Clock + ?Sized,
    {
        let now = clock.millis();
        match transport.read_byte() {
            Some(byte) => {
                self.receive_byte(byte, now, transport);
                true
            }
            None => {
                self.poll_idle(now, transport);
                false
            }
        }
    }
}

fn handle_event(registry: &mut Registry, event: FrameEvent<'_>, out: &mut dyn Sink) -> Result<(), ErrorCode> {
    match event {
        FrameEvent::Request(request) => {
            let mut response = Response::new(out, request.has_checksum());
            process_request(registry, &request, &mut response)
        }
        FrameEvent::Error { error, checksum } => {
            let code = ErrorCode::from(error);
            trace!("Replying to dropped frame with {}", code);
            Response::new(out, checksum).send_error(code);
            Err(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Property;
    use crate::types::Variant;
    use crate::{checksum, checksum_digits};
    use alloc::string::String;
    use alloc::vec::Vec;

    fn node() -> Node {
        let registry = Registry::new()
            .with(Property::new("FOCUS", Variant::float(12.5)))
            .unwrap()
            .with(Property::new("MODE", Variant::enumeration(["AUTO", "MANUAL"], 0)))
            .unwrap();
        Node::new(registry)
    }

    fn with_checksum(body: &str) -> Vec<u8> {
        let mut frame = body.as_bytes().to_vec();
        frame.push(b'*');
        frame.extend_from_slice(&checksum_digits(checksum(body.as_bytes())));
        frame.push(b'\n');
        frame
    }

    fn feed(node: &mut Node, data: &[u8]) -> String {
        let mut out = Vec::new();
        node.receive_data(data, 0, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_get_set() {
        let mut node = node();
        assert_eq!(feed(&mut node, b"GET;FOCUS;VALUE\n"), "M00;FOCUS;VALUE;OK;12.5000\n");
        assert_eq!(feed(&mut node, b"SET;FOCUS;VALUE;20\n"), "M00;FOCUS;VALUE;OK;20.0000\n");
        assert_eq!(feed(&mut node, b"GET;FOCUS;VALUE\r\n"), "M00;FOCUS;VALUE;OK;20.0000\n");
        assert_eq!(
            node.registry().get("FOCUS", "VALUE").and_then(Variant::as_float),
            Some(20.0)
        );
    }

    #[test]
    fn test_bad_request() {
        let mut node = node();
        assert_eq!(feed(&mut node, b";FOO\n"), "C02;BAD REQUEST\n");
        assert_eq!(feed(&mut node, b"\n\n\r\n"), "");
        assert_eq!(feed(&mut node, b"GET;FOCUS;VALUE\n"), "M00;FOCUS;VALUE;OK;12.5000\n");
    }

    #[test]
    fn test_checksum() {
        let mut node = node();
        let frame = with_checksum("GET;MODE;VALUE");
        assert_eq!(feed(&mut node, &frame), String::from_utf8(with_checksum("M00;MODE;VALUE;OK;AUTO")).unwrap());

        let mut bad = frame.clone();
        let len = bad.len();
        bad[len - 2] ^= 0x01;
        assert_eq!(feed(&mut node, &bad), String::from_utf8(with_checksum("C03;BAD CHECKSUM")).unwrap());
    }

    #[test]
    fn test_overflow() {
        let mut node = node();
        let mut frame = b"GET;".to_vec();
        frame.resize(crate::MAX_FRAME_LEN + 1, b'X');
        frame.push(b'\n');
        assert_eq!(feed(&mut node, &frame), "C04;OVERFLOW\n");
        assert_eq!(feed(&mut node, b"GET;MODE;VALUE\n"), "M00;MODE;VALUE;OK;AUTO\n");
    }

    #[test]
    fn test_timeout() {
        let mut node = Node::with_config(Registry::new(), NodeConfig { timeout_ms: 50 });
        let mut out = Vec::new();
        assert_eq!(node.receive_data(b"GET;FO", 100, &mut out), 0);
        assert!(node.in_frame());
        assert_eq!(node.poll_idle(150, &mut out), None);
        assert_eq!(node.poll_idle(151, &mut out), Some(Err(ErrorCode::Timeout)));
        assert_eq!(out, b"C01;TIMEOUT\n");
        assert!(!node.in_frame());
        assert_eq!(node.poll_idle(500, &mut out), None);
    }

    #[test]
    fn test_bulk_equals_bytewise() {
        let stream: &[u8] = b"GET;FOCUS;VALUE\nSET;MODE;VALUE;MANUAL\n;X\nINFO;PROPERTY_COUNT\nSET;MODE;VALUE;OFF\nGET;MODE;VALUE";

        let mut bulk = node();
        let mut bulk_out = Vec::new();
        let frames = bulk.receive_data(stream, 0, &mut bulk_out);

        let mut single = node();
        let mut single_out = Vec::new();
        let mut results = Vec::new();
        for &byte in stream {
            if let Some(result) = single.receive_byte(byte, 0, &mut single_out) {
                results.push(result);
            }
        }

        assert_eq!(frames, 5);
        assert_eq!(bulk_out, single_out);
        assert_eq!(
            results,
            [
                Ok(()),
                Ok(()),
                Err(ErrorCode::BadRequest),
                Ok(()),
                Err(ErrorCode::BadValue)
            ]
        );
        assert!(bulk.in_frame() && single.in_frame());
    }

    #[test]
    fn test_poll() {
        struct Script {
            input: Vec<u8>,
            output: Vec<u8>,
        }
        impl Sink for Script {
            fn write_byte(&mut self, byte: u8) {
                self.output.push(byte);
            }
        }
        impl Transport for Script {
            fn read_byte(&mut self) -> Option<u8> {
                if self.input.is_empty() {
                    None
                } else {
                    Some(self.input.remove(0))
                }
            }
        }

        let mut node = node();
        let mut script = Script {
            input: b"GET;MODE;VALUE\nGET;MO".to_vec(),
            output: Vec::new(),
        };
        let mut now: u32 = 0;
        while node.poll(&mut script, &|| now) {}
        assert_eq!(script.output, b"M00;MODE;VALUE;OK;AUTO\n");

        now = 2000;
        assert!(!node.poll(&mut script, &|| now));
        assert_eq!(script.output, b"M00;MODE;VALUE;OK;AUTO\nC01;TIMEOUT\n");
    }
}
