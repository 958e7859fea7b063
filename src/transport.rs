//! Interfaces to the hardware: a byte sink for replies, a non-blocking byte
//! source, and a millisecond clock.
//!
//! With the `std` feature, [`IoTransport`] adapts any `Read + Write` stream
//! (a serial port, stdin/stdout, a socket) and [`StdClock`] counts
//! milliseconds from its creation.

use alloc::vec::Vec;

/// Destination for reply bytes.
pub trait Sink {
    fn write_byte(&mut self, byte: u8);

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Called after each complete reply.
    fn flush(&mut self) {}
}

/// A byte stream to the host.
pub trait Transport: Sink {
    /// Return the next received byte, or `None` if nothing is available.
    /// Must not block.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Monotonic millisecond counter. Wrapping around is fine.
pub trait Clock {
    fn millis(&self) -> u32;
}

impl<F> Clock for F
where
    F: Fn() -> u32,
{
    fn millis(&self) -> u32 {
        self()
    }
}

impl Sink for Vec<u8> {
    fn write_byte(&mut self, byte: u8) {
        self.push(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

#[cfg(feature = "std")]
pub use self::std_io::{IoTransport, StdClock};

#[cfg(feature = "std")]
mod std_io {
    use std::io::{self, ErrorKind, Read, Write};
    use std::time::Instant;

    use log::{error, warn};

    use super::{Clock, Sink, Transport};

    /// [`Transport`] over a `std::io` stream.
    ///
    /// Reads that time out, would block or return zero bytes count as "no
    /// byte available". Other I/O errors are logged and kept until
    /// [`take_error()`](Self::take_error()) is called.
    #[derive(Debug)]
    pub struct IoTransport<IO> {
        io: IO,
        error: Option<io::Error>,
    }

    impl<IO> IoTransport<IO> {
        pub fn new(io: IO) -> Self {
            Self { io, error: None }
        }

        /// The last I/O error, if any.
        pub fn take_error(&mut self) -> Option<io::Error> {
            self.error.take()
        }

        pub fn get_mut(&mut self) -> &mut IO {
            &mut self.io
        }

        pub fn into_inner(self) -> IO {
            self.io
        }
    }

    impl<IO: Write> Sink for IoTransport<IO> {
        fn write_byte(&mut self, byte: u8) {
            self.write_bytes(&[byte]);
        }

        fn write_bytes(&mut self, bytes: &[u8]) {
            if let Err(e) = self.io.write_all(bytes) {
                warn!("Write to transport failed: {}", e);
                self.error = Some(e);
            }
        }

        fn flush(&mut self) {
            if let Err(e) = self.io.flush() {
                warn!("Flushing transport failed: {}", e);
                self.error = Some(e);
            }
        }
    }

    impl<IO: Read + Write> Transport for IoTransport<IO> {
        fn read_byte(&mut self) -> Option<u8> {
            let mut buf = [0; 1];
            match self.io.read(&mut buf) {
                Ok(1) => Some(buf[0]),
                Ok(_) => None,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    None
                }
                Err(e) => {
                    error!("Read from transport failed: {}", e);
                    self.error = Some(e);
                    None
                }
            }
        }
    }

    /// Milliseconds since the clock was created.
    #[derive(Debug, Clone, Copy)]
    pub struct StdClock {
        start: Instant,
    }

    impl StdClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
            }
        }
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for StdClock {
        fn millis(&self) -> u32 {
            self.start.elapsed().as_millis() as u32
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_io_transport() {
        let mut io = IoTransport::new(Cursor::new(b"AB".to_vec()));
        assert_eq!(io.read_byte(), Some(b'A'));
        assert_eq!(io.read_byte(), Some(b'B'));
        assert_eq!(io.read_byte(), None);
        assert!(io.take_error().is_none());
    }

    #[test]
    fn test_clock_closure() {
        let clock = || 42u32;
        assert_eq!(clock.millis(), 42);
        assert!(StdClock::new().millis() < 1000);
    }
}
