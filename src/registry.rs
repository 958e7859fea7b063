//! The property registry: an ordered, append-only list of [`Property`]
//! definitions, each holding one or more typed [`Attribute`]s.
//!
//! The registry is built once at startup and then handed to a
//! [`Node`](crate::Node). Only values and states change afterwards.
//!
//! ```
//! use usis_proto::{Input, Property, Registry, Variant};
//!
//! let mut registry = Registry::new();
//! registry
//!     .add(
//!         Property::new("TEMP", Variant::float(21.0).read_only())
//!             .attribute("UNIT", Variant::text("C").read_only()),
//!     )
//!     .unwrap();
//!
//! // Firmware may update read-only values through the variant itself.
//! if let Some(temp) = registry.find_attribute_mut("TEMP", "VALUE") {
//!     *temp = Variant::float(22.5).read_only();
//! }
//! assert_eq!(registry.get("TEMP", "VALUE").unwrap().render(), "22.5000");
//! assert!(registry.set("TEMP", "VALUE", Input::Float(1.0)).is_err());
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::protocol::{Request, Response};
use crate::types::{Input, SetError, State, Variant};
use crate::DEFAULT_ATTRIBUTE;

/// Why a handler is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    Get,
    Set,
    Cmd,
}

/// Application callback attached to a property or a command attribute.
///
/// A handler may reply through `response` (at most once). If it doesn't,
/// the dispatcher sends the default reply. `value` is the targeted variant
/// for [`Message::Get`] and [`Message::Set`], and `None` for commands.
///
/// Any `FnMut` closure with a matching signature is a handler.
pub trait Handler: Send {
    fn handle(
        &mut self,
        message: Message,
        request: &Request<'_>,
        response: &mut Response<'_>,
        value: Option<&mut Variant>,
    );
}

impl<F> Handler for F
where
    F: FnMut(Message, &Request<'_>, &mut Response<'_>, Option<&mut Variant>) + Send,
{
    fn handle(
        &mut self,
        message: Message,
        request: &Request<'_>,
        response: &mut Response<'_>,
        value: Option<&mut Variant>,
    ) {
        self(message, request, response, value)
    }
}

/// Error type for registry construction and the by-name setters.
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum RegistryError {
    #[snafu(display("Property {} is already registered", name))]
    DuplicateProperty { name: String },
    #[snafu(display("Property {} has attribute {} twice", property, name))]
    DuplicateAttribute { property: String, name: String },
    #[snafu(display("No property named {}", name))]
    UnknownProperty { name: String },
    #[snafu(display("Property {} has no attribute {}", property, name))]
    UnknownAttribute { property: String, name: String },
    #[snafu(display("Could not set value"))]
    Set { source: SetError },
}

/// A named, typed sub-value of a [`Property`].
pub struct Attribute {
    name: String,
    id: usize,
    value: Variant,
    handler: Option<Box<dyn Handler>>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within the property. The default attribute is 0.
    pub const fn id(&self) -> usize {
        self.id
    }

    pub const fn value(&self) -> &Variant {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Variant {
        &mut self.value
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("value", &self.value)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// A controllable parameter of the device.
///
/// Built with [`Property::new()`] (a value property whose first attribute is
/// `VALUE`) or [`Property::command()`] (an action without a value), then
/// extended with the builder methods.
pub struct Property {
    name: String,
    handler: Option<Box<dyn Handler>>,
    attributes: Vec<Attribute>,
}

impl Property {
    /// A property with `value` as its default attribute.
    pub fn new(name: impl Into<String>, value: Variant) -> Self {
        Self {
            name: name.into(),
            handler: None,
            attributes: Vec::new(),
        }
        .attribute(DEFAULT_ATTRIBUTE, value)
    }

    /// A command property. Commands are excluded from introspection and are
    /// invoked by sending their name as the request command.
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: Variant) -> Self {
        let id = self.attributes.len();
        self.attributes.push(Attribute {
            name: name.into(),
            id,
            value,
            handler: None,
        });
        self
    }

    /// Append a command attribute calling `handler` when invoked as
    /// `COMMAND;NAME`.
    #[must_use]
    pub fn action<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(Message, &Request<'_>, &mut Response<'_>, Option<&mut Variant>) + Send + 'static,
    {
        self.with_action(name, handler)
    }

    /// Like [`action()`](Self::action()), for a [`Handler`] implementation.
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self = self.attribute(name, Variant::command());
        if let Some(attr) = self.attributes.last_mut() {
            attr.handler = Some(Box::new(handler));
        }
        self
    }

    /// Set the property handler. It is called for GET and SET of the default
    /// attribute, and for commands.
    #[must_use]
    pub fn handler<F>(self, handler: F) -> Self
    where
        F: FnMut(Message, &Request<'_>, &mut Response<'_>, Option<&mut Variant>) + Send + 'static,
    {
        self.with_handler(handler)
    }

    /// Like [`handler()`](Self::handler()), for a [`Handler`] implementation.
    #[must_use]
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut [Attribute] {
        &mut self.attributes
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn find_attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }

    pub fn attribute_at(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    /// The first attribute's value, if there is one.
    pub fn value(&self) -> Option<&Variant> {
        self.attributes.first().map(|a| &a.value)
    }

    /// A property is a command when its first attribute is a command, or
    /// when it has no attributes at all.
    pub fn is_command(&self) -> bool {
        self.value().map_or(true, Variant::is_command)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Call the property handler for attribute `index`.
    ///
    /// Only the default attribute (id 0) is routed to the property handler.
    /// Returns whether a handler ran.
    pub(crate) fn call_handler(
        &mut self,
        index: usize,
        message: Message,
        request: &Request<'_>,
        response: &mut Response<'_>,
    ) -> bool {
        let Self {
            handler,
            attributes,
            ..
        } = self;
        match (handler, attributes.get_mut(index)) {
            (Some(handler), Some(attr)) if attr.id == 0 => {
                handler.handle(message, request, response, Some(&mut attr.value));
                true
            }
            _ => false,
        }
    }

    /// Run a command on this property: the property handler if there is one,
    /// otherwise the handler of the attribute named `target`.
    pub(crate) fn call_command(
        &mut self,
        target: &str,
        request: &Request<'_>,
        response: &mut Response<'_>,
    ) -> bool {
        if let Some(handler) = self.handler.as_mut() {
            handler.handle(Message::Cmd, request, response, None);
            return true;
        }
        let handler = self
            .attributes
            .iter_mut()
            .find(|a| a.name == target)
            .and_then(|a| a.handler.as_mut());
        match handler {
            Some(handler) => {
                handler.handle(Message::Cmd, request, response, None);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("handler", &self.handler.is_some())
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// Ordered collection of properties.
#[derive(Debug, Default)]
pub struct Registry {
    properties: Vec<Property>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateProperty`] if the name is taken,
    /// [`RegistryError::DuplicateAttribute`] if the property repeats an
    /// attribute name.
    pub fn add(&mut self, property: Property) -> Result<(), RegistryError> {
        ensure!(
            self.find_property(&property.name).is_none(),
            DuplicatePropertySnafu {
                name: property.name.as_str()
            }
        );
        for (i, attr) in property.attributes.iter().enumerate() {
            ensure!(
                property.attributes[..i].iter().all(|a| a.name != attr.name),
                DuplicateAttributeSnafu {
                    property: property.name.as_str(),
                    name: attr.name.as_str(),
                }
            );
        }
        self.properties.push(property);
        Ok(())
    }

    /// Builder form of [`add()`](Self::add()).
    pub fn with(mut self, property: Property) -> Result<Self, RegistryError> {
        self.add(property)?;
        Ok(self)
    }

    /// All properties in registration order, commands included.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn find_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn find_attribute(&self, property: &str, attribute: &str) -> Option<&Attribute> {
        self.find_property(property)?.find_attribute(attribute)
    }

    /// Mutable access to an attribute's variant, bypassing the read-only flag.
    pub fn find_attribute_mut(&mut self, property: &str, attribute: &str) -> Option<&mut Variant> {
        self.find_property_mut(property)?
            .find_attribute_mut(attribute)
            .map(Attribute::value_mut)
    }

    /// The value of `property;attribute`.
    pub fn get(&self, property: &str, attribute: &str) -> Option<&Variant> {
        self.find_attribute(property, attribute).map(Attribute::value)
    }

    fn lookup_mut(&mut self, property: &str, attribute: &str) -> Result<&mut Variant, RegistryError> {
        let prop = self
            .find_property_mut(property)
            .context(UnknownPropertySnafu { name: property })?;
        let attr = prop
            .find_attribute_mut(attribute)
            .context(UnknownAttributeSnafu {
                property,
                name: attribute,
            })?;
        Ok(&mut attr.value)
    }

    /// Store `input` in `property;attribute` with the same conversions and
    /// checks as a `SET` request.
    pub fn set(&mut self, property: &str, attribute: &str, input: Input<'_>) -> Result<(), RegistryError> {
        self.lookup_mut(property, attribute)?
            .set(input)
            .context(SetSnafu)
    }

    /// Change the state of `property;attribute`.
    pub fn set_state(&mut self, property: &str, attribute: &str, state: State) -> Result<(), RegistryError> {
        self.lookup_mut(property, attribute)?.set_state(state);
        Ok(())
    }

    /// Properties listed by introspection, i.e. all but commands.
    pub fn visible_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| !p.is_command())
    }

    /// The `index`-th property listed by introspection.
    pub fn visible_property(&self, index: usize) -> Option<&Property> {
        self.visible_properties().nth(index)
    }

    pub fn visible_count(&self) -> usize {
        self.visible_properties().count()
    }
}
