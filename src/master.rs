//! The host side of the protocol.
//!
//! [`Master`] encodes requests into [`SendData`]. Once the bytes are
//! written, [`SendData::data_sent()`] gives a [`ReceiveReply`] which is fed
//! the received bytes until it yields a decoded [`Reply`].
//!
//! ```
//! use usis_proto::master::{Master, Reply};
//!
//! let master = Master::new().with_checksum(false);
//! let send = master.get("FOCUS", "VALUE").unwrap();
//! assert_eq!(send.as_slice(), b"GET;FOCUS;VALUE\n");
//!
//! let mut recv = send.data_sent();
//! let (used, reply) = recv.receive_data(b"M00;FOCUS;VALUE;OK;12.5000\n");
//! assert_eq!(used, 27);
//! match reply {
//!     Some(Ok(Reply::Ok(status))) => assert_eq!(status.value.as_deref(), Some("12.5000")),
//!     _ => unreachable!(),
//! }
//! ```
//!
//! With the `std` feature, [`io::Master`] wraps a blocking `Read + Write`
//! stream.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str;

use log::{debug, trace};
use snafu::{ensure, OptionExt, Snafu};

use crate::ascii::{CHECKSUM_MARK, CR, EOL, SEPARATOR};
use crate::nom_parser::master::parse_reply_line;
use crate::protocol::{ErrorCode, REPLY_OK};
use crate::types::State;
use crate::{checksum, checksum_digits};

/// Longest reply line accepted, terminator excluded.
pub const MAX_REPLY_LEN: usize = 255;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A request field contains a byte with a meaning on the wire.
    #[snafu(display("Request field {:?} contains a reserved character", field))]
    InvalidField { field: String },
    #[snafu(display("Malformed reply"))]
    Malformed,
    #[snafu(display("Reply checksum mismatch"))]
    BadChecksum,
    #[snafu(display("Reply longer than {} bytes", MAX_REPLY_LEN))]
    TooLong,
}

/// Fields of a successful (`M00`) reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub property: String,
    pub attribute: String,
    pub status: Option<String>,
    pub value: Option<String>,
}

impl Status {
    /// The status field as a [`State`], if it is a known one.
    pub fn state(&self) -> Option<State> {
        self.status.as_deref().and_then(State::from_name)
    }
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(Status),
    Error { code: String, description: String },
}

impl Reply {
    /// The protocol error of an error reply, unless it's an application
    /// defined code.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } => ErrorCode::from_code(code),
            Self::Ok(_) => None,
        }
    }
}

/// Decode one reply line, without the line terminator.
///
/// A `*CC` trailer is verified when present. With `need_checksum`, a missing
/// trailer is an error as well.
pub fn parse_reply(line: &str, need_checksum: bool) -> Result<Reply, Error> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let parsed = parse_reply_line(line).context(MalformedSnafu)?;

    match parsed.checksum {
        Some(cc) => ensure!(
            cc.as_bytes() == checksum_digits(checksum(parsed.body.as_bytes())),
            BadChecksumSnafu
        ),
        None => ensure!(!need_checksum, BadChecksumSnafu),
    }

    let fields = parsed.fields;
    let field = |i: usize| fields.get(i).map(|s| s.to_string());
    if fields[0] == REPLY_OK {
        ensure!((3..=5).contains(&fields.len()), MalformedSnafu);
        Ok(Reply::Ok(Status {
            property: fields[1].to_string(),
            attribute: fields[2].to_string(),
            status: field(3),
            value: field(4),
        }))
    } else {
        ensure!(fields.len() == 2 && !fields[0].is_empty(), MalformedSnafu);
        Ok(Reply::Error {
            code: fields[0].to_string(),
            description: fields[1].to_string(),
        })
    }
}

/// Request encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Master {
    checksum: bool,
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

impl Master {
    /// A master sending checksummed requests.
    pub const fn new() -> Self {
        Self { checksum: true }
    }

    /// Choose whether requests carry a `*CC` trailer. The device only adds
    /// one to its reply when the request had it.
    #[must_use]
    pub const fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Encode `command;field;...`. Empty trailing fields are kept.
    pub fn request(&self, command: &str, fields: &[&str]) -> Result<SendData, Error> {
        let mut data = Vec::new();
        for (i, field) in core::iter::once(&command).chain(fields).enumerate() {
            ensure!(
                !field.bytes().any(|b| matches!(b, SEPARATOR | CHECKSUM_MARK | EOL | CR)),
                InvalidFieldSnafu { field: *field }
            );
            if i > 0 {
                data.push(SEPARATOR);
            }
            data.extend_from_slice(field.as_bytes());
        }
        if self.checksum {
            let cc = checksum_digits(checksum(&data));
            data.push(CHECKSUM_MARK);
            data.extend_from_slice(&cc);
        }
        data.push(EOL);
        trace!("Request {:?}", str::from_utf8(&data));
        Ok(SendData {
            data,
            checksum: self.checksum,
        })
    }

    pub fn get(&self, property: &str, attribute: &str) -> Result<SendData, Error> {
        self.request("GET", &[property, attribute])
    }

    pub fn set(&self, property: &str, attribute: &str, value: &str) -> Result<SendData, Error> {
        self.request("SET", &[property, attribute, value])
    }

    /// `INFO;<verb>[;i[;j]]`
    pub fn info(&self, verb: &str, indices: &[usize]) -> Result<SendData, Error> {
        let indices: Vec<String> = indices.iter().map(ToString::to_string).collect();
        let mut fields = Vec::with_capacity(indices.len() + 1);
        fields.push(verb);
        fields.extend(indices.iter().map(String::as_str));
        self.request("INFO", &fields)
    }

    /// Invoke command `command`, optionally naming one of its actions.
    pub fn command(&self, command: &str, action: &str) -> Result<SendData, Error> {
        if action.is_empty() {
            self.request(command, &[])
        } else {
            self.request(command, &[action])
        }
    }
}

/// An encoded request waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendData {
    data: Vec<u8>,
    checksum: bool,
}

impl SendData {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The request has been written, start waiting for the reply.
    pub fn data_sent(self) -> ReceiveReply {
        ReceiveReply::new(self.checksum)
    }
}

/// Collects reply bytes until a full line has been received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReply {
    buffer: Vec<u8>,
    checksum: bool,
    overflow: bool,
}

impl ReceiveReply {
    /// `checksum` tells whether the reply must carry a `*CC` trailer.
    pub fn new(checksum: bool) -> Self {
        Self {
            buffer: Vec::new(),
            checksum,
            overflow: false,
        }
    }

    /// Consume bytes up to and including the end of a reply line.
    ///
    /// Returns the number of bytes used, and the decoded reply once the line
    /// is complete. Bytes after the line are left to the caller. Empty lines
    /// are skipped.
    pub fn receive_data(&mut self, data: &[u8]) -> (usize, Option<Result<Reply, Error>>) {
        for (i, &byte) in data.iter().enumerate() {
            match byte {
                EOL if self.buffer.is_empty() && !self.overflow => {}
                EOL => return (i + 1, Some(self.finish())),
                _ if self.overflow => {}
                _ if self.buffer.len() >= MAX_REPLY_LEN => {
                    debug!("Reply exceeds {} bytes", MAX_REPLY_LEN);
                    self.overflow = true;
                    self.buffer.clear();
                }
                _ => self.buffer.push(byte),
            }
        }
        (data.len(), None)
    }

    fn finish(&mut self) -> Result<Reply, Error> {
        let overflow = core::mem::replace(&mut self.overflow, false);
        let line = core::mem::take(&mut self.buffer);
        ensure!(!overflow, TooLongSnafu);
        let line = str::from_utf8(&line).ok().context(MalformedSnafu)?;
        let reply = parse_reply(line, self.checksum);
        trace!("Reply {:?}: {:?}", line, reply);
        reply
    }
}

#[cfg(feature = "std")]
pub mod io {
    //! Blocking host client over a `std::io` stream.

    use std::io::{self, Read, Write};

    use log::{debug, info};
    use snafu::{ResultExt, Snafu};

    use super::{Reply, SendData, Status};
    use crate::introspection::*;
    use crate::types::{Mode, State, VariantType};

    #[derive(Debug, Snafu)]
    #[non_exhaustive]
    pub enum Error {
        #[snafu(display("I/O error: {}", source))]
        Io { source: io::Error },
        #[snafu(display("Connection closed"))]
        Closed,
        /// The device replied with an error code.
        #[snafu(display("Device error {} {}", code, description))]
        Device { code: String, description: String },
        #[snafu(display("Could not decode reply: {}", source))]
        Reply { source: super::Error },
        #[snafu(display("Unexpected reply {:?}", reply))]
        UnexpectedReply { reply: String },
    }

    impl Error {
        /// The protocol error code of a device error.
        pub fn error_code(&self) -> Option<crate::ErrorCode> {
            match self {
                Self::Device { code, .. } => crate::ErrorCode::from_code(code),
                _ => None,
            }
        }
    }

    type Result<T, E = Error> = std::result::Result<T, E>;

    /// Schema of one attribute as reported by introspection.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AttributeSchema {
        pub name: String,
        pub mode: Mode,
        /// Label count, for enum attributes.
        pub enum_count: Option<usize>,
    }

    /// Schema of one property as reported by introspection.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PropertySchema {
        pub name: String,
        pub variant_type: VariantType,
        pub state: State,
        pub attributes: Vec<AttributeSchema>,
        /// Labels of the default attribute, if it is an enum.
        pub labels: Vec<String>,
    }

    /// Blocking request/reply client.
    #[derive(Debug)]
    pub struct Master<IO> {
        io: IO,
        proto: super::Master,
    }

    impl<IO> Master<IO>
    where
        IO: Read + Write,
    {
        pub fn new(io: IO) -> Self {
            Self {
                io,
                proto: super::Master::new(),
            }
        }

        #[must_use]
        pub fn with_checksum(mut self, checksum: bool) -> Self {
            self.proto = self.proto.with_checksum(checksum);
            self
        }

        pub fn get_mut(&mut self) -> &mut IO {
            &mut self.io
        }

        pub fn into_inner(self) -> IO {
            self.io
        }

        /// Send a request and wait for its reply. Error replies are
        /// returned as `Ok(Reply::Error { .. })`.
        pub fn transact(&mut self, send: SendData) -> Result<Reply> {
            self.io.write_all(send.as_slice()).context(IoSnafu)?;
            self.io.flush().context(IoSnafu)?;
            let mut recv = send.data_sent();
            let mut byte = [0];
            loop {
                match self.io.read(&mut byte) {
                    Ok(0) => return ClosedSnafu.fail(),
                    Ok(_) => {
                        if let (_, Some(reply)) = recv.receive_data(&byte) {
                            return reply.context(ReplySnafu);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e).context(IoSnafu),
                }
            }
        }

        fn status(&mut self, send: std::result::Result<SendData, super::Error>) -> Result<Status> {
            match self.transact(send.context(ReplySnafu)?)? {
                Reply::Ok(status) => Ok(status),
                Reply::Error { code, description } => {
                    debug!("Device replied {} {}", code, description);
                    DeviceSnafu { code, description }.fail()
                }
            }
        }

        pub fn get(&mut self, property: &str, attribute: &str) -> Result<Status> {
            let send = self.proto.get(property, attribute);
            self.status(send)
        }

        pub fn set(&mut self, property: &str, attribute: &str, value: &str) -> Result<Status> {
            let send = self.proto.set(property, attribute, value);
            self.status(send)
        }

        pub fn command(&mut self, command: &str, action: &str) -> Result<Status> {
            let send = self.proto.command(command, action);
            self.status(send)
        }

        /// Run an `INFO` query and return the value field.
        pub fn info(&mut self, verb: &str, indices: &[usize]) -> Result<String> {
            let send = self.proto.info(verb, indices);
            let status = self.status(send)?;
            match status.value {
                Some(value) => Ok(value),
                None => UnexpectedReplySnafu {
                    reply: format!("{:?}", status),
                }
                .fail(),
            }
        }

        fn info_parsed<T>(
            &mut self,
            verb: &str,
            indices: &[usize],
            parse: impl FnOnce(&str) -> Option<T>,
        ) -> Result<T> {
            let value = self.info(verb, indices)?;
            match parse(&value) {
                Some(v) => Ok(v),
                None => UnexpectedReplySnafu { reply: value }.fail(),
            }
        }

        pub fn property_count(&mut self) -> Result<usize> {
            self.info_parsed(PROPERTY_COUNT, &[], |s| s.parse().ok())
        }

        /// Walk the introspection verbs and collect the device's schema.
        pub fn discover(&mut self) -> Result<Vec<PropertySchema>> {
            let count = self.property_count()?;
            info!("Discovering {} properties", count);
            (0..count).map(|i| self.discover_property(i)).collect()
        }

        fn discover_property(&mut self, i: usize) -> Result<PropertySchema> {
            let name = self.info(PROPERTY_NAME, &[i])?;
            let variant_type = self.info_parsed(PROPERTY_TYPE, &[i], VariantType::from_name)?;
            let state = self.info_parsed(PROPERTY_STATE, &[i], State::from_name)?;
            let attr_count: usize = self.info_parsed(PROPERTY_ATTR_COUNT, &[i], |s| s.parse().ok())?;

            let mut attributes = Vec::with_capacity(attr_count);
            for j in 0..attr_count {
                let name = self.info(PROPERTY_ATTR_NAME, &[i, j])?;
                let mode = self.info_parsed(PROPERTY_ATTR_MODE, &[i, j], Mode::from_name)?;
                let enum_count = match self.info_parsed(PROPERTY_ATTR_ENUM_COUNT, &[i, j], |s| s.parse().ok()) {
                    Ok(n) => Some(n),
                    Err(e) if e.error_code() == Some(crate::ErrorCode::BadIndex) => None,
                    Err(e) => return Err(e),
                };
                attributes.push(AttributeSchema {
                    name,
                    mode,
                    enum_count,
                });
            }

            let label_count = match variant_type {
                VariantType::Enum => attributes.first().and_then(|a| a.enum_count).unwrap_or(0),
                _ => 0,
            };
            let labels = (0..label_count)
                .map(|k| self.info(PROPERTY_ATTR_ENUM_VALUE, &[i, k]))
                .collect::<Result<Vec<_>>>()?;

            Ok(PropertySchema {
                name,
                variant_type,
                state,
                attributes,
                labels,
            })
        }
    }
}
