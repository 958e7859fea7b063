//! Decoded requests, the reply writer and the wire error codes.

use core::fmt;

use log::{trace, warn};

use crate::ascii::{CHECKSUM_MARK, EOL, SEPARATOR};
use crate::nom_parser;
use crate::transport::Sink;
use crate::types::{SetError, Variant};
use crate::{checksum_digits, DEFAULT_ATTRIBUTE};

/// Status code of a successful reply.
pub const REPLY_OK: &str = "M00";

/// Error replies, with their wire code and description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Timeout,
    BadRequest,
    BadChecksum,
    Overflow,
    UnknownProperty,
    UnknownAttribute,
    ReadOnly,
    BadValueType,
    NoValueGiven,
    UnknownCommand,
    BadValue,
    BadIndex,
}

impl ErrorCode {
    pub const fn code(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Timeout => "C01",
            BadRequest => "C02",
            BadChecksum => "C03",
            Overflow => "C04",
            UnknownProperty => "M01",
            UnknownAttribute => "M02",
            ReadOnly => "M03",
            BadValueType => "M04",
            NoValueGiven => "M05",
            UnknownCommand => "M06",
            BadValue => "M08",
            BadIndex => "M09",
        }
    }

    pub const fn description(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Timeout => "TIMEOUT",
            BadRequest => "BAD REQUEST",
            BadChecksum => "BAD CHECKSUM",
            Overflow => "OVERFLOW",
            UnknownProperty => "UNKNOWN PROPERTY",
            UnknownAttribute => "UNKNOWN ATTRIBUTE",
            ReadOnly => "READONLY",
            BadValueType => "BAD VALUE TYPE",
            NoValueGiven => "NO VALUE GIVEN",
            UnknownCommand => "UNKNOWN COMMAND",
            BadValue => "BAD VALUE",
            BadIndex => "BAD INDEX",
        }
    }

    /// Look up an error by its wire code, e.g. `"M03"`.
    pub fn from_code(code: &str) -> Option<Self> {
        use ErrorCode::*;
        [
            Timeout,
            BadRequest,
            BadChecksum,
            Overflow,
            UnknownProperty,
            UnknownAttribute,
            ReadOnly,
            BadValueType,
            NoValueGiven,
            UnknownCommand,
            BadValue,
            BadIndex,
        ]
        .iter()
        .copied()
        .find(|e| e.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.description())
    }
}

impl From<SetError> for ErrorCode {
    fn from(e: SetError) -> Self {
        match e {
            SetError::ReadOnly => ErrorCode::ReadOnly,
            SetError::BadType => ErrorCode::BadValueType,
            SetError::BadValue => ErrorCode::BadValue,
        }
    }
}

/// A decoded request frame.
///
/// The fields borrow the receive buffer, so a `Request` only lives until the
/// next byte is fed to the framer. Missing fields are empty strings.
///
/// Every field must be valid UTF-8. Frames with other bytes are answered
/// with `C02 BAD REQUEST` and never reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    command: &'a str,
    property: &'a str,
    value1: &'a str,
    value2: &'a str,
    checksum: bool,
}

impl<'a> Request<'a> {
    pub const fn new(command: &'a str, property: &'a str, value1: &'a str, value2: &'a str) -> Self {
        Self {
            command,
            property,
            value1,
            value2,
            checksum: false,
        }
    }

    pub(crate) const fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub const fn command(&self) -> &'a str {
        self.command
    }

    pub const fn property(&self) -> &'a str {
        self.property
    }

    /// The attribute name of GET and SET requests, i.e. the first value field.
    pub const fn attribute(&self) -> &'a str {
        self.value1
    }

    /// Value field `index`: 0 is the field after the property, 1 the one after that.
    pub const fn value(&self, index: usize) -> &'a str {
        match index {
            0 => self.value1,
            1 => self.value2,
            _ => "",
        }
    }

    /// Value field `index` as an integer, if it has integer syntax.
    pub fn int_value(&self, index: usize) -> Option<i32> {
        nom_parser::parse_int(self.value(index))
    }

    /// Whether the request frame carried a checksum.
    pub const fn has_checksum(&self) -> bool {
        self.checksum
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    pub fn is_property(&self, command: &str, property: &str) -> bool {
        self.command == command && self.property == property
    }
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.command, self.property, self.value1, self.value2
        )
    }
}

/// Reply writer for a single request.
///
/// Only the first `send*` call writes a reply, later ones are dropped. When
/// the request carried a checksum the reply ends with `*CC` as well.
pub struct Response<'a> {
    sink: &'a mut dyn Sink,
    crc: u8,
    need_crc: bool,
    done: bool,
}

impl<'a> Response<'a> {
    pub fn new(sink: &'a mut dyn Sink, need_crc: bool) -> Self {
        Self {
            sink,
            crc: 0,
            need_crc,
            done: false,
        }
    }

    /// Send a success reply: `M00;PROPERTY;ATTRIBUTE[;STATUS[;VALUE]]`.
    ///
    /// `value` is only written when `status` is given.
    pub fn send(&mut self, property: &str, attribute: &str, status: Option<&str>, value: Option<&str>) {
        if !self.start() {
            return;
        }
        self.write(REPLY_OK.as_bytes());
        self.write(&[SEPARATOR]);
        self.write(property.as_bytes());
        self.write(&[SEPARATOR]);
        self.write(attribute.as_bytes());
        if let Some(status) = status {
            self.write(&[SEPARATOR]);
            self.write(status.as_bytes());
            if let Some(value) = value {
                self.write(&[SEPARATOR]);
                self.write(value.as_bytes());
            }
        }
        self.end();
    }

    /// Send the state and rendered value of `variant` as a success reply.
    pub fn send_value(&mut self, property: &str, attribute: &str, variant: &Variant) {
        let value = variant.render();
        self.send(property, attribute, Some(variant.state().as_str()), Some(&value));
    }

    /// Send the state and value of a property's default attribute.
    pub fn send_default(&mut self, property: &str, variant: &Variant) {
        self.send_value(property, DEFAULT_ATTRIBUTE, variant);
    }

    pub fn send_error(&mut self, error: ErrorCode) {
        self.send_custom_error(error.code(), error.description());
    }

    /// Send an application defined error reply: `CODE;DESCRIPTION`.
    pub fn send_custom_error(&mut self, code: &str, description: &str) {
        if !self.start() {
            return;
        }
        self.write(code.as_bytes());
        self.write(&[SEPARATOR]);
        self.write(description.as_bytes());
        self.end();
    }

    /// Whether a reply has been sent.
    pub const fn is_done(&self) -> bool {
        self.done
    }

    fn start(&mut self) -> bool {
        if self.done {
            warn!("Reply already sent, dropping another one");
            return false;
        }
        self.crc = 0;
        true
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.crc ^= byte;
            self.sink.write_byte(byte);
        }
    }

    fn end(&mut self) {
        if self.need_crc {
            let digits = checksum_digits(self.crc);
            self.sink.write_byte(CHECKSUM_MARK);
            self.sink.write_bytes(&digits);
        }
        self.sink.write_byte(EOL);
        self.sink.flush();
        self.done = true;
        trace!("Reply sent (checksum: {})", self.need_crc);
    }
}

impl fmt::Debug for Response<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("need_crc", &self.need_crc)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_send() {
        let mut out = Vec::new();
        let mut rsp = Response::new(&mut out, false);
        rsp.send("FOCUS", "VALUE", Some("OK"), Some("12.5000"));
        assert!(rsp.is_done());
        assert_eq!(out, b"M00;FOCUS;VALUE;OK;12.5000\n");
    }

    #[test]
    fn test_send_partial() {
        let mut out = Vec::new();
        Response::new(&mut out, false).send("P", "A", None, Some("ignored"));
        assert_eq!(out, b"M00;P;A\n");

        let mut out = Vec::new();
        Response::new(&mut out, false).send("P", "A", Some("BUSY"), None);
        assert_eq!(out, b"M00;P;A;BUSY\n");
    }

    #[test]
    fn test_send_with_checksum() {
        let mut out = Vec::new();
        Response::new(&mut out, true).send_error(ErrorCode::ReadOnly);
        let body = b"M03;READONLY";
        let mut expected = body.to_vec();
        expected.push(b'*');
        expected.extend_from_slice(&checksum_digits(crate::checksum(body)));
        expected.push(b'\n');
        assert_eq!(out, expected);
    }

    #[test]
    fn test_single_reply() {
        let mut out = Vec::new();
        let mut rsp = Response::new(&mut out, false);
        rsp.send_error(ErrorCode::UnknownCommand);
        rsp.send("P", "A", Some("OK"), Some("1"));
        rsp.send_custom_error("X01", "LATE");
        assert_eq!(out, b"M06;UNKNOWN COMMAND\n");
    }

    #[test]
    fn test_request_fields() {
        let req = Request::new("INFO", "PROPERTY_ATTR_NAME", "2", "x");
        assert!(req.is("INFO"));
        assert!(req.is_property("INFO", "PROPERTY_ATTR_NAME"));
        assert!(!req.is("INF"));
        assert_eq!(req.attribute(), "2");
        assert_eq!(req.int_value(0), Some(2));
        assert_eq!(req.int_value(1), None);
        assert_eq!(req.value(2), "");
        assert!(!req.has_checksum());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::from_code("M09"), Some(ErrorCode::BadIndex));
        assert_eq!(ErrorCode::from_code("M07"), None);
        assert_eq!(ErrorCode::from(SetError::BadValue), ErrorCode::BadValue);
        assert_eq!(ErrorCode::Timeout.to_string(), "C01 TIMEOUT");
    }
}
