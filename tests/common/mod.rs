#![allow(dead_code)]

mod sync;

use std::cell::{Cell, RefCell};
use std::cmp::min;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

use usis_proto::{Clock, Message, Property, Registry, State, Variant};

#[allow(unused_imports)]
pub use self::sync::{LinkInterface, SerialLink};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The registry of a small motorized filter/focus unit.
pub fn demo_registry() -> Registry {
    Registry::new()
        .with(
            Property::new("FOCUS", Variant::float(12.5))
                .attribute("MIN", Variant::float(0.0).read_only())
                .attribute("MAX", Variant::float(50.0).read_only())
                .attribute("UNIT", Variant::text("mm").read_only()),
        )
        .unwrap()
        .with(Property::new("SPEED", Variant::int(10)))
        .unwrap()
        .with(Property::new(
            "FILTER",
            Variant::enumeration(["RED", "GREEN", "BLUE"], 0),
        ))
        .unwrap()
        .with(
            Property::command("PARK").action("NOW", |_, _, rsp, _| {
                rsp.send("PARK", "NOW", Some(State::Busy.as_str()), None)
            }),
        )
        .unwrap()
        .with(Property::command("HOME").handler(|msg, _, rsp, _| {
            if msg == Message::Cmd {
                rsp.send("HOME", "", Some("OK"), None)
            }
        }))
        .unwrap()
}

/// Scripted serial port: reads come from a fixed buffer, writes are kept.
pub struct SerialInterface {
    rx: Vec<u8>,
    rx_pos: usize,
    pub tx: Vec<u8>,
    do_read_error: bool,
    do_write_error: bool,
}

pub struct SerialIOPlane(Rc<RefCell<SerialInterface>>);

impl SerialIOPlane {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> SerialIOPlane {
        SerialIOPlane(serial_if.clone())
    }
}

impl SerialInterface {
    pub fn new(rx: &[u8]) -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface {
            rx: rx.to_vec(),
            tx: Vec::new(),
            rx_pos: 0,
            do_read_error: false,
            do_write_error: false,
        }))
    }

    pub fn push_rx(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }

    pub fn take_tx(&mut self) -> String {
        String::from_utf8(std::mem::take(&mut self.tx)).unwrap()
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }
}

impl std::io::Read for SerialIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_read_error {
            inner.do_read_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "IO read error"))
        } else {
            let old_pos = inner.rx_pos;
            inner.rx_pos = min(old_pos + buf.len(), inner.rx.len());
            let len = inner.rx_pos - old_pos;
            buf[..len].copy_from_slice(&inner.rx[old_pos..inner.rx_pos]);
            Ok(len)
        }
    }
}

impl std::io::Write for SerialIOPlane {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "IO write error"))
        } else {
            inner.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Clock advanced by hand.
#[derive(Default)]
pub struct ManualClock(Cell<u32>);

impl ManualClock {
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.0.get()
    }
}
