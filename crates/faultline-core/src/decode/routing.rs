//! Safe decoding of the routing side channel.
//!
//! Notifiers smuggle the routing parameters (project, tracker, api key, ...)
//! through the protocol's api-key field as a serialized YAML mapping, often
//! with Ruby-symbol keys:
//!
//! ```yaml
//! ---
//! :api_key: secret
//! :project: shop
//! :tracker: Bug
//! :priority: 5
//! ```
//!
//! Only plain scalars, sequences and mappings are accepted. A type tag
//! anywhere in the document fails the whole request.

use serde_json::Value;

use super::{DecodeError, yaml_to_value};
use crate::model::notice::{Params, Routing};

/// Parse the routing mapping from its serialized text.
///
/// Blank text yields empty routing (the request is then refused by the api
/// key check, not by the decoder).
///
/// # Errors
///
/// Returns [`DecodeError::UnsafeRouting`] for tagged values,
/// [`DecodeError::Syntax`] for unparseable YAML and [`DecodeError::Shape`]
/// when the document is not a mapping.
pub fn parse_routing(text: &str) -> Result<Routing, DecodeError> {
    if text.trim().is_empty() {
        return Ok(Routing::default());
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| DecodeError::Syntax(format!("routing parameters: {e}")))?;
    routing_from_value(yaml_to_value(yaml, DecodeError::UnsafeRouting)?)
}

/// Build routing from an already-decoded value.
///
/// Used directly by the legacy decoder when a notifier sends the routing
/// mapping inline instead of as a string.
///
/// # Errors
///
/// Returns [`DecodeError::Shape`] when the value is not a mapping.
pub fn routing_from_value(value: Value) -> Result<Routing, DecodeError> {
    match value {
        Value::Null => Ok(Routing::default()),
        Value::Object(map) => Ok(Routing::from_params(&normalize_keys(map))),
        other => Err(DecodeError::Shape(format!(
            "routing parameters must be a mapping, got {}",
            super::value_kind(&other)
        ))),
    }
}

/// Strip the leading `:` of Ruby-symbol keys.
fn normalize_keys(map: Params) -> Params {
    map.into_iter()
        .map(|(key, value)| match key.strip_prefix(':') {
            Some(stripped) => (stripped.to_string(), value),
            None => (key, value),
        })
        .collect()
}
