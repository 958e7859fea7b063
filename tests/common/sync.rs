use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Write};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

type RxT = Mutex<VecDeque<u8>>;

/// Point to point serial line between a host and a device.
#[derive(Default)]
pub struct SerialLink {
    host_rx: RxT,
    device_rx: RxT,
    host_data_available: Condvar,
    device_data_available: Condvar,
    eof: AtomicBool,
}

impl SerialLink {
    pub fn new() -> Arc<SerialLink> {
        Default::default()
    }

    /// Make blocked and future reads on both ends return end of file once
    /// their buffers are drained.
    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        self.device_data_available.notify_all();
        self.host_data_available.notify_all();
    }

    pub fn host_interface(self: &Arc<Self>) -> LinkInterface {
        LinkInterface::new(Arc::clone(self), true)
    }

    pub fn device_interface(self: &Arc<Self>) -> LinkInterface {
        LinkInterface::new(Arc::clone(self), false)
    }

    fn rx(&self, host: bool) -> (&RxT, &Condvar) {
        if host {
            (&self.host_rx, &self.host_data_available)
        } else {
            (&self.device_rx, &self.device_data_available)
        }
    }
}

pub struct LinkInterface {
    link: Arc<SerialLink>,
    is_host: bool,
    pub blocking_read: bool,
    pub timeout: Duration,
    pub do_read_error: bool,
    pub do_write_error: bool,
}

impl LinkInterface {
    fn new(link: Arc<SerialLink>, is_host: bool) -> LinkInterface {
        LinkInterface {
            link,
            is_host,
            blocking_read: true,
            timeout: Duration::from_millis(100),
            do_read_error: false,
            do_write_error: false,
        }
    }

    pub fn putc(&mut self, byte: u8) {
        self.write_all(&[byte]).unwrap();
    }
}

impl std::io::Read for LinkInterface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            panic!("Testsuite called read with zero length buffer.")
        }
        if self.do_read_error {
            self.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO read error"));
        }

        let (rx, condvar) = self.link.rx(self.is_host);
        let mut rx = if self.blocking_read {
            rx.lock().expect("Read mutex is poisoned")
        } else {
            rx.try_lock()
                .map_err(|_| Error::new(ErrorKind::WouldBlock, "IO read error: would block"))?
        };

        if let Some(byte) = rx.pop_front() {
            buf[0] = byte;
            return Ok(1);
        }

        if self.blocking_read && !self.link.eof.load(SeqCst) {
            let mut rx = condvar
                .wait_timeout(rx, self.timeout)
                .expect("Mutex lock failed")
                .0;
            if let Some(byte) = rx.pop_front() {
                buf[0] = byte;
                Ok(1)
            } else if self.link.eof.load(SeqCst) {
                Ok(0)
            } else {
                Err(Error::new(ErrorKind::TimedOut, "IO read timeout"))
            }
        } else {
            Ok(0)
        }
    }
}

impl std::io::Write for LinkInterface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.do_write_error {
            self.do_write_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO write error"));
        }
        let (rx, condvar) = self.link.rx(!self.is_host);
        rx.lock().unwrap().extend(buf.iter().copied());
        condvar.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
