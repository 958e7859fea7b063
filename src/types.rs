//! Value types for USIS attributes: the [`Variant`] container, its type tag,
//! operational state and the validated setter.

use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::convert::TryFrom;
use core::fmt;

use snafu::{ensure, Snafu};

/// Error type for [`Variant::set()`].
#[derive(Debug, Snafu, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum SetError {
    /// The attribute is read-only.
    #[snafu(display("Attribute is read-only"))]
    ReadOnly,
    /// The input can't be stored in an attribute of this type.
    #[snafu(display("Bad value type"))]
    BadType,
    /// The input has the right type, but isn't an accepted value.
    #[snafu(display("Bad value"))]
    BadValue,
}

/// Type tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    /// Signed 32 bit integer.
    Int,
    /// 32 bit float.
    Float,
    /// Index into a list of labels.
    Enum,
    /// Free text.
    Text,
    /// No value, the attribute is invoked rather than read or written.
    Command,
}

impl VariantType {
    /// The type name used by the introspection replies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Enum => "ENUM",
            Self::Text => "TEXT",
            Self::Command => "COMMAND",
        }
    }

    /// Inverse of [`as_str()`](Self::as_str()).
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Int, Self::Float, Self::Enum, Self::Text, Self::Command]
            .iter()
            .copied()
            .find(|t| t.as_str() == name)
    }
}

/// Operational state of an attribute, reported as the status field of replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Ready,
    Busy,
    Alert,
    Idle,
    NotApplicable,
}

impl Default for State {
    fn default() -> Self {
        Self::Ready
    }
}

impl State {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "OK",
            Self::Busy => "BUSY",
            Self::Alert => "ALERT",
            Self::Idle => "IDLE",
            Self::NotApplicable => "NA",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Ready, Self::Busy, Self::Alert, Self::Idle, Self::NotApplicable]
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
    }
}

/// Access mode of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "RO",
            Self::ReadWrite => "RW",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RO" => Some(Self::ReadOnly),
            "RW" => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

/// The stored value of a [`Variant`]. The variant decides the type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(i32),
    Float(f32),
    /// `index` is not range checked against `labels` when written as a number.
    Enum { index: i32, labels: Vec<String> },
    Text(String),
    Command,
}

/// Source value for [`Variant::set()`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input<'a> {
    Int(i32),
    Float(f32),
    Text(&'a str),
}

impl From<i32> for Input<'_> {
    fn from(v: i32) -> Self {
        Input::Int(v)
    }
}

impl From<f32> for Input<'_> {
    fn from(v: f32) -> Self {
        Input::Float(v)
    }
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(v: &'a str) -> Self {
        Input::Text(v)
    }
}

/// Value container behind every attribute: a typed payload, a state and a
/// read-only flag.
///
/// ## Example
/// ```
/// use usis_proto::{Input, SetError, Variant};
///
/// let mut speed = Variant::float(1.5);
/// speed.set(Input::Int(3)).unwrap();
/// assert_eq!(speed.render(), "3.0000");
///
/// let mut color = Variant::enumeration(["RED", "GREEN"], 0);
/// assert_eq!(color.set(Input::Text("PURPLE")), Err(SetError::BadValue));
/// assert_eq!(color.render(), "RED");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    payload: Payload,
    state: State,
    read_only: bool,
}

impl Variant {
    const fn from_payload(payload: Payload) -> Self {
        Self {
            payload,
            state: State::Ready,
            read_only: false,
        }
    }

    pub const fn int(value: i32) -> Self {
        Self::from_payload(Payload::Int(value))
    }

    pub const fn float(value: f32) -> Self {
        Self::from_payload(Payload::Float(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::from_payload(Payload::Text(value.into()))
    }

    /// An enumerated value with the given labels, currently at `index`.
    pub fn enumeration<I, S>(labels: I, index: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_payload(Payload::Enum {
            index,
            labels: labels.into_iter().map(Into::into).collect(),
        })
    }

    pub const fn command() -> Self {
        Self::from_payload(Payload::Command)
    }

    /// Mark the variant read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the initial state.
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub const fn variant_type(&self) -> VariantType {
        match self.payload {
            Payload::Int(_) => VariantType::Int,
            Payload::Float(_) => VariantType::Float,
            Payload::Enum { .. } => VariantType::Enum,
            Payload::Text(_) => VariantType::Text,
            Payload::Command => VariantType::Command,
        }
    }

    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub const fn mode(&self) -> Mode {
        if self.read_only {
            Mode::ReadOnly
        } else {
            Mode::ReadWrite
        }
    }

    pub const fn is_command(&self) -> bool {
        matches!(self.payload, Payload::Command)
    }

    pub const fn as_int(&self) -> Option<i32> {
        match self.payload {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f32> {
        match self.payload {
            Payload::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub const fn enum_index(&self) -> Option<i32> {
        match self.payload {
            Payload::Enum { index, .. } => Some(index),
            _ => None,
        }
    }

    /// The enum labels, empty for any other type.
    pub fn enum_labels(&self) -> &[String] {
        match &self.payload {
            Payload::Enum { labels, .. } => labels,
            _ => &[],
        }
    }

    /// The label at the current enum index, if the index is in range.
    pub fn enum_label(&self) -> Option<&str> {
        match &self.payload {
            Payload::Enum { index, labels } => usize::try_from(*index)
                .ok()
                .and_then(|i| labels.get(i))
                .map(String::as_str),
            _ => None,
        }
    }

    /// Store `input`, converting it to the type of this variant.
    ///
    /// The type never changes. Numbers given to an enum are stored as the
    /// index without a range check, text given to an enum must match one of
    /// the labels exactly.
    ///
    /// # Errors
    /// * [`SetError::ReadOnly`] if the variant is read-only.
    /// * [`SetError::BadType`] if `input` can't be converted.
    /// * [`SetError::BadValue`] if text doesn't match any enum label, or
    ///   contains a field separator, `*` or a line break.
    pub fn set(&mut self, input: Input<'_>) -> Result<(), SetError> {
        ensure!(!self.read_only, ReadOnlySnafu);

        match (&mut self.payload, input) {
            (Payload::Float(v), Input::Float(new)) => *v = new,
            (Payload::Float(v), Input::Int(new)) => *v = new as f32,

            (Payload::Int(v), Input::Int(new)) => *v = new,
            // precision loss is accepted
            (Payload::Int(v), Input::Float(new)) => *v = new as i32,

            (Payload::Text(v), Input::Text(new)) => {
                ensure!(!new.contains(&[';', '*', '\n', '\r'][..]), BadValueSnafu);
                *v = new.to_string()
            }
            (Payload::Text(v), Input::Int(new)) => *v = new.to_string(),
            (Payload::Text(v), Input::Float(new)) => *v = format_float(new),

            (Payload::Enum { index, labels }, Input::Text(new)) => {
                match labels.iter().position(|label| label == new) {
                    Some(i) => *index = i as i32,
                    None => return BadValueSnafu.fail(),
                }
            }
            (Payload::Enum { index, .. }, Input::Int(new)) => *index = new,
            (Payload::Enum { index, .. }, Input::Float(new)) => *index = new as i32,

            _ => return BadTypeSnafu.fail(),
        }
        Ok(())
    }

    /// Change the state, leaving the type, read-only flag and payload alone.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// Text form of the value as sent in replies.
    ///
    /// An enum whose index is out of range renders as an empty string.
    pub fn render(&self) -> Cow<'_, str> {
        match &self.payload {
            Payload::Int(v) => Cow::Owned(v.to_string()),
            Payload::Float(v) => Cow::Owned(format_float(*v)),
            Payload::Enum { .. } => Cow::Borrowed(self.enum_label().unwrap_or("")),
            Payload::Text(s) => Cow::Borrowed(s),
            Payload::Command => Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Floats are always sent with four fraction digits.
pub(crate) fn format_float(v: f32) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        "Inf".to_string()
    } else if v == 0.0 {
        "0.0000".to_string()
    } else {
        alloc::format!("{:.4}", v)
    }
}
