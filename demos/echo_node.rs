//! A demo device speaking USIS on stdin/stdout.
//!
//! Try `printf 'GET;FOCUS;VALUE\nINFO;PROPERTY_COUNT\n' | cargo run --example echo_node`.
//! Log output goes to stderr, set `RUST_LOG=debug` to see it.

use std::error::Error;
use std::io::{self, Read, Write};

use log::info;
use usis_proto::transport::{IoTransport, StdClock};
use usis_proto::{Message, Node, Property, Registry, State, Variant};

struct Stdio {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl Read for Stdio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf)
    }
}

impl Write for Stdio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

fn registry() -> Result<Registry, Box<dyn Error>> {
    let mut registry = Registry::new();
    registry.add(
        Property::new("FOCUS", Variant::float(12.5))
            .attribute("MIN", Variant::float(0.0).read_only())
            .attribute("MAX", Variant::float(50.0).read_only())
            .handler(|msg, req, _, value| {
                if msg == Message::Set {
                    info!("Moving focus to {}", req.value(1));
                    if let Some(v) = value {
                        v.set_state(State::Busy);
                    }
                }
            }),
    )?;
    registry.add(Property::new("TEMP", Variant::float(21.3).read_only()).attribute("UNIT", Variant::text("C").read_only()))?;
    registry.add(Property::new(
        "FILTER",
        Variant::enumeration(["CLEAR", "RED", "GREEN", "BLUE"], 0),
    ))?;
    registry.add(Property::command("PARK").action("NOW", |_, _, rsp, _| {
        info!("Parking");
        rsp.send("PARK", "NOW", Some(State::Ready.as_str()), None)
    }))?;
    Ok(registry)
}

fn node_main_loop() -> Result<(), Box<dyn Error>> {
    let mut node = Node::new(registry()?);
    let mut serial = IoTransport::new(Stdio {
        stdin: io::stdin(),
        stdout: io::stdout(),
    });
    let clock = StdClock::new();

    // stdin blocks, so no byte means end of input
    while node.poll(&mut serial, &clock) {
        if let Some(e) = serial.take_error() {
            return Err(e.into());
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    node_main_loop()
}
