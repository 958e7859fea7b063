//! Interactive USIS host over a serial port.
//!
//! `cargo run --example usis_repl -- /dev/ttyUSB0 115200`

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};
use std::sync::mpsc;

use usis_proto::master::io::Master;

fn cmd_get<IO: Read + Write>(args: &mut CmdScanner, usis: &mut Master<IO>) -> Result<()> {
    let property = args.next()?;
    let attribute = args.next().unwrap_or("VALUE");
    let status = usis.get(property, attribute)?;
    println!(
        "{} [{}]",
        status.value.unwrap_or_default(),
        status.status.unwrap_or_default()
    );
    Ok(())
}

fn cmd_set<IO: Read + Write>(args: &mut CmdScanner, usis: &mut Master<IO>) -> Result<()> {
    let property = args.next()?;
    let attribute = args.next()?;
    let value = args.next()?;
    let status = usis.set(property, attribute, value)?;
    println!("{}", status.value.unwrap_or_default());
    Ok(())
}

fn cmd_poll<IO: Read + Write>(args: &mut CmdScanner, usis: &mut Master<IO>) -> Result<()> {
    let property = args.next()?.to_string();
    let delay = std::time::Duration::from_secs_f32(args.parse_next()?);

    println!("Press enter to stop polling.");
    // check that the first read is ok before starting the poll stop thread
    println!("{:?}", usis.get(&property, "VALUE")?.value);
    let (io_tx, io_rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        let _ch = io_tx;
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
    });
    loop {
        if io_rx.recv_timeout(delay) == Err(mpsc::RecvTimeoutError::Disconnected) {
            break;
        }
        println!("{:?}", usis.get(&property, "VALUE")?.value);
    }
    Ok(())
}

fn cmd_info<IO: Read + Write>(usis: &mut Master<IO>) -> Result<()> {
    for property in usis.discover()? {
        println!(
            "{} {} {}",
            property.name,
            property.variant_type.as_str(),
            property.state.as_str()
        );
        for attr in property.attributes {
            println!("    {} {}", attr.name, attr.mode.as_str());
        }
        if !property.labels.is_empty() {
            println!("    labels: {}", property.labels.join(", "));
        }
    }
    Ok(())
}

fn cmd_run<IO: Read + Write>(command: &str, args: &mut CmdScanner, usis: &mut Master<IO>) -> Result<()> {
    let action = args.next().unwrap_or("");
    let status = usis.command(command, action)?;
    println!("{:?}", status);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud = match args.next() {
        Some(baud) => baud.parse().context("Invalid baud rate")?,
        None => 115_200,
    };

    let serial = serialport::new(&port, baud)
        .timeout(std::time::Duration::from_millis(1000))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut stdout = std::io::stdout();

    let mut usis = Master::new(serial);
    loop {
        print!(">> ");
        stdout.flush()?;
        let mut cmd = String::new();
        let mut scan = CmdScanner::read_stdin(&mut cmd)?;
        if let Err(err) = match scan.next() {
            Err(_) => continue,
            Ok("get") | Ok("g") => cmd_get(&mut scan, &mut usis),
            Ok("set") | Ok("s") => cmd_set(&mut scan, &mut usis),
            Ok("poll") => cmd_poll(&mut scan, &mut usis),
            Ok("info") => cmd_info(&mut usis),
            Ok("quit") | Ok("q") => break,
            Ok(cmd) => {
                let cmd = cmd.to_string();
                cmd_run(&cmd, &mut scan, &mut usis)
            }
        } {
            println!("{:?}", err)
        }
    }
    Ok(())
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Result<Self> {
        buf.clear();
        std::io::stdin().read_line(buf)?;
        let splt = buf.split_whitespace().peekable();
        Ok(Self { splt })
    }
    fn next(&mut self) -> Result<&'a str> {
        self.splt.next().context("End of stream")
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
}
