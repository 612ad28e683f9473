use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque key-ordered mapping carried verbatim from the wire (request,
/// session and environment info). Never interpreted, only rendered.
pub type Params = serde_json::Map<String, Value>;

/// One stack-trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub method: String,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32, method: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            method: method.into(),
        }
    }

    /// A frame without a usable file path cannot be filtered or linked.
    #[must_use]
    pub fn has_file(&self) -> bool {
        !self.file.trim().is_empty()
    }
}

/// `file:line[:in method]`, the line format used in rendered backtraces.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if !self.method.is_empty() {
            write!(f, ":in {}", self.method)?;
        }
        Ok(())
    }
}

/// Routing parameters sent alongside the notice in its api-key side channel.
///
/// All fields are optional on the wire; resolution against the directories
/// decides what a missing value means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routing {
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub tracker: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i64>,
    pub assigned_to: Option<String>,
    pub author: Option<String>,
    pub repository_root: Option<String>,
    pub environment: Option<String>,
}

impl Routing {
    /// Build routing fields from a decoded key/value mapping.
    ///
    /// Keys are expected to be normalized already (no leading `:`). Unknown
    /// keys are ignored. Scalars are accepted for every string field;
    /// `priority` must be an integer or a string holding one.
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        let text = |key: &str| params.get(key).and_then(scalar_text);
        Self {
            api_key: text("api_key"),
            project: text("project"),
            tracker: text("tracker"),
            category: text("category"),
            priority: params.get("priority").and_then(|value| match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }),
            assigned_to: text("assigned_to"),
            author: text("author"),
            repository_root: text("repository_root"),
            environment: text("environment"),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Canonical error report, identical no matter which wire format carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub error_class: String,
    pub error_message: String,
    /// Full backtrace in wire order.
    pub backtrace: Vec<Frame>,
    pub request: Params,
    pub session: Params,
    pub server_environment: Params,
    /// Plain environment mapping sent by notifiers that do not report a
    /// server environment.
    pub environment: Params,
    /// Deployment environment tag such as `staging`; may be empty.
    pub environment_name: String,
    pub routing: Routing,
}

impl Notice {
    /// Environment info to render: the server environment wins when both
    /// are present.
    #[must_use]
    pub fn environment_info(&self) -> &Params {
        if self.server_environment.is_empty() {
            &self.environment
        } else {
            &self.server_environment
        }
    }
}
