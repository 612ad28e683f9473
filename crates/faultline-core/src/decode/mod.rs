//! Wire decoders.
//!
//! Two notifier protocols reach the server, each on its own route:
//!
//! - [`v2`]: the Hoptoad v2 XML document (current protocol)
//! - [`legacy`]: the older flat YAML mapping with string backtrace lines
//!
//! Both produce the same canonical [`Notice`]. The decoder is picked by the
//! route, never by sniffing the body.

pub mod legacy;
pub mod routing;
pub mod v2;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;
use crate::model::notice::{Notice, Params};

/// Reasons a body is rejected before any store access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("request body is not valid UTF-8")]
    NotUtf8,

    #[error("could not parse document: {0}")]
    Syntax(String),

    #[error("unexpected document shape: {0}")]
    Shape(String),

    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),

    /// A YAML tag (`!ruby/object:...` and friends) inside the routing
    /// mapping. Tags are never resolved to types.
    #[error("routing parameters carry forbidden tag {0}")]
    UnsafeRouting(String),

    /// A YAML tag anywhere else in a legacy body.
    #[error("document carries forbidden tag {0}")]
    UnsafeTag(String),
}

impl From<DecodeError> for IngestError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnsafeRouting(_) => Self::UnsafeRoutingParams(err.to_string()),
            other => Self::MalformedNotice(other.to_string()),
        }
    }
}

/// Turns a raw request body into a canonical notice.
pub trait Decoder: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the document cannot be parsed, the
    /// routing mapping cannot be decoded safely, or the error class is
    /// missing.
    fn decode(&self, body: &[u8]) -> Result<Notice, DecodeError>;
}

/// Inbound route, one per wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Hoptoad v2 XML (`POST /notifier_api/v2/notices`).
    V2,
    /// Flat YAML (`POST /notices`).
    Legacy,
}

impl WireFormat {
    #[must_use]
    pub fn decoder(self) -> &'static dyn Decoder {
        match self {
            Self::V2 => &v2::V2Decoder,
            Self::Legacy => &legacy::LegacyDecoder,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2 => "v2",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "xml" => Ok(Self::V2),
            "legacy" | "v1" | "yaml" => Ok(Self::Legacy),
            other => Err(DecodeError::Shape(format!(
                "unknown wire format '{other}': expected v2 or legacy"
            ))),
        }
    }
}

pub(crate) fn body_text(body: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(body).map_err(|_| DecodeError::NotUtf8)
}

/// Convert a YAML value into the opaque JSON form used by [`Params`].
///
/// Only null, booleans, numbers, strings, sequences and mappings survive.
/// Any tag is reported through `on_tag` and aborts the conversion.
pub(crate) fn yaml_to_value(
    value: serde_yaml::Value,
    on_tag: fn(String) -> DecodeError,
) -> Result<Value, DecodeError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => yaml_number(&n),
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(|item| yaml_to_value(item, on_tag))
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Params::new();
            for (key, value) in mapping {
                let key = yaml_key(key, on_tag)?;
                map.insert(key, yaml_to_value(value, on_tag)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => return Err(on_tag(tagged.tag.to_string())),
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(n.to_string()), Value::Number)
    }
}

fn yaml_key(key: serde_yaml::Value, on_tag: fn(String) -> DecodeError) -> Result<String, DecodeError> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok(String::new()),
        Yaml::Tagged(tagged) => Err(on_tag(tagged.tag.to_string())),
        Yaml::Sequence(_) | Yaml::Mapping(_) => {
            Err(DecodeError::Shape("mapping keys must be scalars".into()))
        }
    }
}

/// Mapping value as [`Params`]; absent, null and non-mapping values become
/// an empty mapping.
pub(crate) fn take_params(map: &mut Params, key: &str) -> Params {
    match map.remove(key) {
        Some(Value::Object(params)) => params,
        Some(Value::Null) | None => Params::new(),
        Some(other) => {
            tracing::warn!(field = key, kind = value_kind(&other), "ignoring non-mapping notice field");
            Params::new()
        }
    }
}

pub(crate) const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
