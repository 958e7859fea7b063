//! Request framing: splits the incoming byte stream into frames, checks the
//! optional checksum and hands out decoded [`Request`]s.
//!
//! The [`Framer`] is fed one byte at a time with [`Framer::push()`]. Each
//! byte either continues the current frame (`None`), or completes it with a
//! [`FrameEvent`]: a request to dispatch, or a framing error to report. When
//! no byte is available, [`Framer::poll_idle()`] drops a partial frame that
//! has been pending for too long.
//!
//! ```
//! use usis_proto::{FrameEvent, Framer};
//!
//! let mut framer = Framer::new();
//! let mut event = None;
//! for &byte in b"GET;FOCUS;VALUE\n" {
//!     if let Some(ev) = framer.push(byte, 0) {
//!         event = Some(format!("{:?}", ev));
//!     }
//! }
//! assert!(event.unwrap().starts_with("Request"));
//! ```

use core::str;

use log::{debug, trace};
use snafu::Snafu;

use crate::ascii::{CHECKSUM_MARK, CR, EOL, SEPARATOR};
use crate::buffer::Buffer;
use crate::protocol::{ErrorCode, Request};
use crate::{checksum_digits, TIMEOUT_MS};

/// Framing errors. All of them are reported to the host and the framer
/// starts over with the next byte.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// A partial frame was pending for longer than the timeout.
    #[snafu(display("Frame timed out"))]
    Timeout,
    /// The command field is missing or empty, or the frame isn't UTF-8.
    #[snafu(display("Bad request"))]
    BadRequest,
    /// The checksum field doesn't match the frame contents.
    #[snafu(display("Bad checksum"))]
    BadChecksum,
    /// The frame is too long or has too many fields.
    #[snafu(display("Frame overflow"))]
    Overflow,
}

impl From<FrameError> for ErrorCode {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Timeout => ErrorCode::Timeout,
            FrameError::BadRequest => ErrorCode::BadRequest,
            FrameError::BadChecksum => ErrorCode::BadChecksum,
            FrameError::Overflow => ErrorCode::Overflow,
        }
    }
}

/// Outcome of a completed frame.
#[derive(Debug, PartialEq)]
pub enum FrameEvent<'a> {
    /// A valid request, borrowing the receive buffer.
    Request(Request<'a>),
    /// The frame was dropped. `checksum` tells whether it had a checksum
    /// field, and so whether the error reply should carry one.
    Error { error: FrameError, checksum: bool },
}

/// The framing state machine.
#[derive(Debug)]
pub struct Framer {
    buffer: Buffer,
    timeout_ms: u32,
    started_at: u32,
    crc: u8,
    error: bool,
    complete: bool,
}

impl Framer {
    /// A framer with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(TIMEOUT_MS)
    }

    pub fn with_timeout(timeout_ms: u32) -> Self {
        Self {
            buffer: Buffer::new(),
            timeout_ms,
            started_at: 0,
            crc: 0,
            error: false,
            complete: false,
        }
    }

    /// True while a partial frame is buffered.
    pub fn in_frame(&self) -> bool {
        !self.complete && !self.buffer.is_empty()
    }

    /// Feed one byte received at time `now` (milliseconds).
    pub fn push(&mut self, byte: u8, now: u32) -> Option<FrameEvent<'_>> {
        if byte == CR {
            return None;
        }
        if self.complete {
            self.reset();
        }
        if self.buffer.is_empty() {
            if byte == EOL {
                // empty line
                return None;
            }
            self.reset();
            self.started_at = now;
        }

        if byte == EOL {
            return Some(self.close());
        }
        if self.error {
            // skip everything up to the end of the frame
            return None;
        }

        match byte {
            SEPARATOR => {
                if self.buffer.has_checksum() || !self.buffer.push(byte) || !self.buffer.open_field() {
                    self.error = true;
                    return None;
                }
                self.crc ^= byte;
            }
            CHECKSUM_MARK => {
                if self.buffer.has_checksum() || !self.buffer.push(byte) {
                    self.error = true;
                    return None;
                }
                self.buffer.open_checksum();
            }
            _ => {
                if !self.buffer.push(byte) {
                    self.error = true;
                    return None;
                }
                if !self.buffer.has_checksum() {
                    self.crc ^= byte;
                }
            }
        }
        None
    }

    /// Check for a timed out partial frame. Call this when no byte is
    /// available.
    pub fn poll_idle(&mut self, now: u32) -> Option<FrameEvent<'static>> {
        if !self.in_frame() || now.wrapping_sub(self.started_at) <= self.timeout_ms {
            return None;
        }
        let checksum = self.buffer.has_checksum();
        debug!(
            "Dropping partial frame of {} bytes after {} ms",
            self.buffer.len(),
            now.wrapping_sub(self.started_at)
        );
        self.reset();
        Some(FrameEvent::Error {
            error: FrameError::Timeout,
            checksum,
        })
    }

    fn close(&mut self) -> FrameEvent<'_> {
        self.complete = true;
        let checksum = self.buffer.has_checksum();

        match self.validate() {
            Ok(()) => {}
            Err(error) => {
                debug!("Dropping frame: {}", error);
                return FrameEvent::Error { error, checksum };
            }
        }

        let buffer = &self.buffer;
        let field = move |i| str::from_utf8(buffer.field(i));
        match (field(0), field(1), field(2), field(3)) {
            (Ok(command), Ok(property), Ok(value1), Ok(value2)) => {
                let request =
                    Request::new(command, property, value1, value2).with_checksum(checksum);
                trace!("Received {}", request);
                FrameEvent::Request(request)
            }
            _ => {
                debug!("Dropping frame: not UTF-8");
                FrameEvent::Error {
                    error: FrameError::BadRequest,
                    checksum,
                }
            }
        }
    }

    fn validate(&self) -> Result<(), FrameError> {
        if self.error {
            return OverflowSnafu.fail();
        }
        if self.buffer.field(0).is_empty() {
            return BadRequestSnafu.fail();
        }
        if let Some(received) = self.buffer.checksum_field() {
            if received != checksum_digits(self.crc) {
                return BadChecksumSnafu.fail();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.crc = 0;
        self.error = false;
        self.complete = false;
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
