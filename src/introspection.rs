//! `INFO` requests: read-only schema queries over the registry.
//!
//! Indices are 0-based positions among the non-command properties, in
//! registration order. Every verb replies `M00;<VERB>;;OK;<value>`, except
//! `PROPERTY_ATTR_ENUM_VALUE` which names the `VALUE` attribute.

use alloc::string::ToString;
use core::convert::TryFrom;

use crate::protocol::{ErrorCode, Request, Response};
use crate::registry::{Attribute, Property, Registry};
use crate::types::Payload;
use crate::DEFAULT_ATTRIBUTE;

pub const PROPERTY_COUNT: &str = "PROPERTY_COUNT";
pub const PROPERTY_NAME: &str = "PROPERTY_NAME";
pub const PROPERTY_TYPE: &str = "PROPERTY_TYPE";
pub const PROPERTY_STATE: &str = "PROPERTY_STATE";
pub const PROPERTY_ATTR_COUNT: &str = "PROPERTY_ATTR_COUNT";
pub const PROPERTY_ATTR_NAME: &str = "PROPERTY_ATTR_NAME";
pub const PROPERTY_ATTR_MODE: &str = "PROPERTY_ATTR_MODE";
pub const PROPERTY_ATTR_ENUM_COUNT: &str = "PROPERTY_ATTR_ENUM_COUNT";
pub const PROPERTY_ATTR_ENUM_VALUE: &str = "PROPERTY_ATTR_ENUM_VALUE";

/// Answer an `INFO;<VERB>[;i[;j]]` request.
///
/// On success the reply has been sent. Errors are returned without a reply,
/// [`process_request()`](crate::dispatch::process_request()) sends them.
///
/// # Errors
/// [`ErrorCode::BadIndex`] for missing, malformed or out of range indices
/// and for enum queries on non-enum attributes,
/// [`ErrorCode::UnknownProperty`] for an unknown verb.
pub fn process_introspection(
    registry: &Registry,
    request: &Request<'_>,
    response: &mut Response<'_>,
) -> Result<(), ErrorCode> {
    let verb = request.property();
    let ok = |response: &mut Response<'_>, value: &str| response.send(verb, "", Some("OK"), Some(value));

    match verb {
        PROPERTY_COUNT => ok(response, &registry.visible_count().to_string()),
        PROPERTY_NAME => ok(response, property(registry, request)?.name()),
        PROPERTY_TYPE => {
            let attr = first_attribute(property(registry, request)?)?;
            ok(response, attr.value().variant_type().as_str())
        }
        PROPERTY_STATE => {
            let attr = first_attribute(property(registry, request)?)?;
            ok(response, attr.value().state().as_str())
        }
        PROPERTY_ATTR_COUNT => {
            let count = property(registry, request)?.attributes().len();
            ok(response, &count.to_string())
        }
        PROPERTY_ATTR_NAME => ok(response, attribute(registry, request)?.name()),
        PROPERTY_ATTR_MODE => ok(response, attribute(registry, request)?.value().mode().as_str()),
        PROPERTY_ATTR_ENUM_COUNT => match attribute(registry, request)?.value().payload() {
            Payload::Enum { labels, .. } => ok(response, &labels.len().to_string()),
            _ => return Err(ErrorCode::BadIndex),
        },
        PROPERTY_ATTR_ENUM_VALUE => {
            let attr = first_attribute(property(registry, request)?)?;
            let label = match attr.value().payload() {
                Payload::Enum { labels, .. } => labels.get(index(request, 1)?),
                _ => None,
            }
            .ok_or(ErrorCode::BadIndex)?;
            response.send(verb, DEFAULT_ATTRIBUTE, Some("OK"), Some(label.as_str()));
        }
        _ => return Err(ErrorCode::UnknownProperty),
    }
    Ok(())
}

/// Value field `field` as a non-negative index.
fn index(request: &Request<'_>, field: usize) -> Result<usize, ErrorCode> {
    request
        .int_value(field)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or(ErrorCode::BadIndex)
}

fn property<'r>(registry: &'r Registry, request: &Request<'_>) -> Result<&'r Property, ErrorCode> {
    registry
        .visible_property(index(request, 0)?)
        .ok_or(ErrorCode::BadIndex)
}

fn first_attribute(property: &Property) -> Result<&Attribute, ErrorCode> {
    property.attribute_at(0).ok_or(ErrorCode::BadIndex)
}

fn attribute<'r>(registry: &'r Registry, request: &Request<'_>) -> Result<&'r Attribute, ErrorCode> {
    let j = index(request, 1)?;
    property(registry, request)?
        .attribute_at(j)
        .ok_or(ErrorCode::BadIndex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::process_request;
    use crate::types::{State, Variant};
    use alloc::string::String;
    use alloc::vec::Vec;

    fn registry() -> Registry {
        Registry::new()
            .with(
                Property::new("FOCUS", Variant::float(12.5))
                    .attribute("MIN", Variant::float(0.0).read_only()),
            )
            .unwrap()
            .with(Property::command("PARK").action("NOW", |_, _, _, _| {}))
            .unwrap()
            .with(Property::new("COLOR", Variant::enumeration(["RED", "GREEN"], 0).with_state(State::Idle)))
            .unwrap()
            .with(Property::new("LABEL", Variant::text("x")).attribute("MODE", Variant::enumeration(["A"], 0)))
            .unwrap()
    }

    fn info(registry: &mut Registry, verb: &str, i: &str, j: &str) -> String {
        let mut out = Vec::new();
        let req = Request::new("INFO", verb, i, j);
        let _ = process_request(registry, &req, &mut Response::new(&mut out, false));
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_property_list() {
        let mut reg = registry();
        assert_eq!(info(&mut reg, "PROPERTY_COUNT", "", ""), "M00;PROPERTY_COUNT;;OK;3\n");
        let names: Vec<_> = (0..3)
            .map(|i| info(&mut reg, "PROPERTY_NAME", &i.to_string(), ""))
            .collect();
        assert_eq!(
            names,
            [
                "M00;PROPERTY_NAME;;OK;FOCUS\n",
                "M00;PROPERTY_NAME;;OK;COLOR\n",
                "M00;PROPERTY_NAME;;OK;LABEL\n"
            ]
        );
        assert_eq!(info(&mut reg, "PROPERTY_NAME", "3", ""), "M09;BAD INDEX\n");
    }

    #[test]
    fn test_property_details() {
        let mut reg = registry();
        assert_eq!(info(&mut reg, "PROPERTY_TYPE", "0", ""), "M00;PROPERTY_TYPE;;OK;FLOAT\n");
        assert_eq!(info(&mut reg, "PROPERTY_TYPE", "2", ""), "M00;PROPERTY_TYPE;;OK;TEXT\n");
        assert_eq!(info(&mut reg, "PROPERTY_STATE", "1", ""), "M00;PROPERTY_STATE;;OK;IDLE\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_COUNT", "0", ""), "M00;PROPERTY_ATTR_COUNT;;OK;2\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_NAME", "0", "1"), "M00;PROPERTY_ATTR_NAME;;OK;MIN\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_MODE", "0", "1"), "M00;PROPERTY_ATTR_MODE;;OK;RO\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_MODE", "0", "0"), "M00;PROPERTY_ATTR_MODE;;OK;RW\n");
    }

    #[test]
    fn test_enums() {
        let mut reg = registry();
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_COUNT", "1", "0"), "M00;PROPERTY_ATTR_ENUM_COUNT;;OK;2\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_COUNT", "2", "1"), "M00;PROPERTY_ATTR_ENUM_COUNT;;OK;1\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_COUNT", "0", "0"), "M09;BAD INDEX\n");
        assert_eq!(
            info(&mut reg, "PROPERTY_ATTR_ENUM_VALUE", "1", "1"),
            "M00;PROPERTY_ATTR_ENUM_VALUE;VALUE;OK;GREEN\n"
        );
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_VALUE", "1", "2"), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_VALUE", "1", "-1"), "M09;BAD INDEX\n");
        // only the first attribute is considered
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_ENUM_VALUE", "2", "0"), "M09;BAD INDEX\n");
    }

    #[test]
    fn test_bad_input() {
        let mut reg = registry();
        assert_eq!(info(&mut reg, "PROPERTY_NAME", "", ""), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_NAME", "x", ""), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_NAME", "-1", ""), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_NAME", "0", ""), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_ATTR_NAME", "0", "2"), "M09;BAD INDEX\n");
        assert_eq!(info(&mut reg, "PROPERTY_LIST", "", ""), "M01;UNKNOWN PROPERTY\n");
    }
}
