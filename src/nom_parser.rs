use nom::branch::alt;
use nom::bytes::complete::{take_till, take_while_m_n};
use nom::character::complete::{char, digit0, digit1};
use nom::combinator::{all_consuming, consumed, opt, recognize};
use nom::multi::separated_list1;
use nom::sequence::{pair, preceded};
use nom::IResult;

use alloc::vec::Vec;

/// `-?[0-9]+`
fn int_syntax(s: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(s)
}

/// `-?([0-9]+(\.[0-9]*)?|\.[0-9]+)`
fn float_syntax(s: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(char('-')),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(s)
}

/// Parse an integer field, rejecting anything but an optional minus sign
/// followed by digits.
pub(crate) fn parse_int(s: &str) -> Option<i32> {
    all_consuming(int_syntax)(s).ok()?;
    s.parse().ok()
}

/// Parse a float field: optional minus sign, digits and at most one decimal
/// point. No exponent, no `inf` or `nan`.
pub(crate) fn parse_float(s: &str) -> Option<f32> {
    all_consuming(float_syntax)(s).ok()?;
    s.parse().ok()
}

pub(crate) mod master {
    use super::*;

    /// A reply line split into fields, `*CC` and line end removed.
    #[derive(Debug, PartialEq)]
    pub(crate) struct ReplyLine<'a> {
        pub fields: Vec<&'a str>,
        /// The bytes covered by the checksum.
        pub body: &'a str,
        pub checksum: Option<&'a str>,
    }

    type Fields<'a> = ((&'a str, Vec<&'a str>), Option<&'a str>);

    fn reply_line(s: &str) -> IResult<&str, Fields<'_>> {
        all_consuming(pair(
            consumed(separated_list1(
                char(';'),
                take_till(|c: char| c == ';' || c == '*'),
            )),
            opt(preceded(
                char('*'),
                take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
            )),
        ))(s)
    }

    pub(crate) fn parse_reply_line(line: &str) -> Option<ReplyLine<'_>> {
        let (_, ((body, fields), checksum)) = reply_line(line).ok()?;
        Some(ReplyLine {
            fields,
            body,
            checksum,
        })
    }
}
