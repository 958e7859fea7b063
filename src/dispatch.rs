//! Request routing: `GET`, `SET`, `INFO` and application commands.

use log::debug;

use crate::introspection::process_introspection;
use crate::nom_parser::{parse_float, parse_int};
use crate::protocol::{ErrorCode, Request, Response};
use crate::registry::{Message, Property, Registry};
use crate::types::{Input, VariantType};

/// Handle one decoded request and reply through `response`.
///
/// Errors are sent as error replies before being returned, so the caller
/// only needs the result for logging or bookkeeping.
pub fn process_request(
    registry: &mut Registry,
    request: &Request<'_>,
    response: &mut Response<'_>,
) -> Result<(), ErrorCode> {
    let result = match request.command() {
        "GET" => get(registry, request, response),
        "SET" => set(registry, request, response),
        "INFO" => process_introspection(registry, request, response),
        _ => command(registry, request, response),
    };
    if let Err(error) = result {
        debug!("Request {} failed: {}", request, error);
        response.send_error(error);
    }
    result
}

fn lookup<'r>(
    registry: &'r mut Registry,
    request: &Request<'_>,
) -> Result<(&'r mut Property, usize), ErrorCode> {
    let property = registry
        .find_property_mut(request.property())
        .ok_or(ErrorCode::UnknownProperty)?;
    let index = property
        .attribute_index(request.attribute())
        .ok_or(ErrorCode::UnknownAttribute)?;
    Ok((property, index))
}

/// Default reply, unless a handler already answered.
fn reply(property: &Property, index: usize, response: &mut Response<'_>) {
    if response.is_done() {
        return;
    }
    if let Some(attr) = property.attribute_at(index) {
        response.send_value(property.name(), attr.name(), attr.value());
    }
}

fn get(registry: &mut Registry, request: &Request<'_>, response: &mut Response<'_>) -> Result<(), ErrorCode> {
    let (property, index) = lookup(registry, request)?;
    property.call_handler(index, Message::Get, request, response);
    reply(property, index, response);
    Ok(())
}

fn set(registry: &mut Registry, request: &Request<'_>, response: &mut Response<'_>) -> Result<(), ErrorCode> {
    let (property, index) = lookup(registry, request)?;
    let text = request.value(1);
    if text.is_empty() {
        return Err(ErrorCode::NoValueGiven);
    }

    let variant = property.attributes_mut()[index].value_mut();
    if variant.is_read_only() {
        return Err(ErrorCode::ReadOnly);
    }
    let input = match variant.variant_type() {
        VariantType::Int => parse_int(text).map(Input::Int),
        VariantType::Float => parse_float(text).map(Input::Float),
        VariantType::Enum | VariantType::Text => Some(Input::Text(text)),
        VariantType::Command => None,
    }
    .ok_or(ErrorCode::BadValueType)?;
    variant.set(input)?;

    property.call_handler(index, Message::Set, request, response);
    reply(property, index, response);
    Ok(())
}

fn command(registry: &mut Registry, request: &Request<'_>, response: &mut Response<'_>) -> Result<(), ErrorCode> {
    if let Some(property) = registry.find_property_mut(request.command()) {
        property.call_command(request.property(), request, response);
    }
    if response.is_done() {
        Ok(())
    } else {
        Err(ErrorCode::UnknownCommand)
    }
}
