//! Legacy flat YAML notices.
//!
//! ```yaml
//! notice:
//!   api_key: "--- \n:project: shop\n:tracker: Bug\n:api_key: secret\n"
//!   error_class: RuntimeError
//!   error_message: "RuntimeError: boom"
//!   backtrace:
//!     - "[PROJECT_ROOT]/app/x.rb:6:in `index'"
//!     - "script/server:3"
//!   request: {url: "https://shop.example/"}
//!   session: {}
//!   server_environment: {hostname: web-1}
//! ```
//!
//! Backtrace lines are `file:line[:in 'method']` strings. A line that does
//! not match is dropped with a warning rather than defaulted.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

use super::routing::{parse_routing, routing_from_value};
use super::{DecodeError, Decoder, body_text, take_params, value_kind, yaml_to_value};
use crate::model::notice::{Frame, Notice, Params, Routing};

static BACKTRACE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+)(?::in [`'](.+)')?").ok());

/// Decoder for the legacy YAML protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyDecoder;

impl Decoder for LegacyDecoder {
    fn decode(&self, body: &[u8]) -> Result<Notice, DecodeError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(body_text(body)?)
            .map_err(|e| DecodeError::Syntax(e.to_string()))?;

        let mut document = match yaml_to_value(yaml, DecodeError::UnsafeTag)? {
            Value::Object(map) => map,
            other => {
                return Err(DecodeError::Shape(format!(
                    "expected a mapping at the top level, got {}",
                    value_kind(&other)
                )));
            }
        };

        let notice = match document.remove("notice") {
            Some(Value::Object(notice)) => notice,
            _ => return Err(DecodeError::MissingField("notice")),
        };
        notice_from_mapping(notice)
    }
}

fn notice_from_mapping(mut notice: Params) -> Result<Notice, DecodeError> {
    let routing = match notice.remove("api_key") {
        Some(Value::String(text)) => parse_routing(&text)?,
        Some(value) => routing_from_value(value)?,
        None => Routing::default(),
    };

    let error_class = notice
        .get("error_class")
        .map(scalar_string)
        .unwrap_or_default();
    let error_class = error_class.trim();
    if error_class.is_empty() {
        return Err(DecodeError::MissingField("error_class"));
    }
    let error_message = notice
        .get("error_message")
        .map(scalar_string)
        .unwrap_or_default();

    // `back` wins over `backtrace` when the notifier filled it in.
    let lines = match notice.remove("back") {
        Some(back) if !is_blank(&back) => back,
        _ => notice.remove("backtrace").unwrap_or(Value::Null),
    };

    Ok(Notice {
        error_class: error_class.to_string(),
        error_message,
        backtrace: parse_backtrace(&lines),
        request: take_params(&mut notice, "request"),
        session: take_params(&mut notice, "session"),
        server_environment: take_params(&mut notice, "server_environment"),
        environment: take_params(&mut notice, "environment"),
        environment_name: routing.environment.clone().unwrap_or_default(),
        routing,
    })
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn parse_backtrace(lines: &Value) -> Vec<Frame> {
    match lines {
        Value::Null => Vec::new(),
        Value::String(line) => parse_backtrace_line(line).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(line) => parse_backtrace_line(line),
                other => {
                    warn!(kind = value_kind(other), "dropping non-string backtrace line");
                    None
                }
            })
            .collect(),
        other => {
            warn!(kind = value_kind(other), "ignoring backtrace that is not a sequence");
            Vec::new()
        }
    }
}

/// Parse one `file:line[:in 'method']` backtrace line.
///
/// Both `'method'` and the older `` `method' `` quoting are accepted.
#[must_use]
pub fn parse_backtrace_line(line: &str) -> Option<Frame> {
    let captures = BACKTRACE_LINE
        .as_ref()
        .and_then(|re| re.captures(line.trim()));
    let Some(captures) = captures else {
        warn!(line, "could not parse backtrace line");
        return None;
    };

    let file = captures.get(1).map_or("", |m| m.as_str());
    let number = captures.get(2).map_or("", |m| m.as_str());
    let Ok(number) = number.parse::<u32>() else {
        warn!(line, "dropping backtrace line with out-of-range line number");
        return None;
    };
    let method = captures.get(3).map_or("", |m| m.as_str());
    Some(Frame::new(file, number, method))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTICE: &str = r#"
notice:
  api_key: "--- \n:api_key: secret\n:project: shop\n:tracker: Bug\n:environment: staging\n"
  error_class: RuntimeError
  error_message: "RuntimeError: boom"
  backtrace:
    - "[PROJECT_ROOT]/app/models/user.rb:53:in `authenticate'"
    - "not a backtrace line"
    - "script/server:3"
  request:
    url: "https://shop.example/login"
    params:
      action: create
  session:
    user_id: "7"
  environment:
    RAILS_ENV: production
"#;

    fn decode(yaml: &str) -> Result<Notice, DecodeError> {
        LegacyDecoder.decode(yaml.as_bytes())
    }

    #[test]
    fn parses_line_with_quoted_method() {
        assert_eq!(
            parse_backtrace_line("script/server:3:in 'main'"),
            Some(Frame::new("script/server", 3, "main"))
        );
    }

    #[test]
    fn parses_line_with_backtick_method() {
        assert_eq!(
            parse_backtrace_line("app/x.rb:12:in `block in index'"),
            Some(Frame::new("app/x.rb", 12, "block in index"))
        );
    }

    #[test]
    fn line_without_in_clause_has_empty_method() {
        assert_eq!(
            parse_backtrace_line("script/server:3"),
            Some(Frame::new("script/server", 3, ""))
        );
    }

    #[test]
    fn non_matching_line_is_dropped() {
        assert_eq!(parse_backtrace_line("no line number here"), None);
        assert_eq!(parse_backtrace_line("file.rb:"), None);
    }

    #[test]
    fn overflowing_line_number_is_dropped_not_zeroed() {
        assert_eq!(parse_backtrace_line("file.rb:99999999999999999999"), None);
    }

    #[test]
    fn decodes_full_notice() {
        let notice = decode(NOTICE).expect("decode");
        assert_eq!(notice.error_class, "RuntimeError");
        assert_eq!(notice.error_message, "RuntimeError: boom");
        assert_eq!(notice.environment_name, "staging");
        assert_eq!(notice.routing.project.as_deref(), Some("shop"));
        assert_eq!(notice.routing.api_key.as_deref(), Some("secret"));
        assert_eq!(
            notice.backtrace,
            vec![
                Frame::new("[PROJECT_ROOT]/app/models/user.rb", 53, "authenticate"),
                Frame::new("script/server", 3, ""),
            ]
        );
        assert_eq!(notice.request["params"]["action"], "create");
        assert_eq!(notice.session["user_id"], "7");
        assert_eq!(notice.environment["RAILS_ENV"], "production");
        assert!(notice.server_environment.is_empty());
    }

    #[test]
    fn back_field_wins_when_present() {
        let yaml = "notice:\n  error_class: E\n  back: ['a.rb:1']\n  backtrace: ['b.rb:2']\n";
        let notice = decode(yaml).expect("decode");
        assert_eq!(notice.backtrace, vec![Frame::new("a.rb", 1, "")]);

        let yaml = "notice:\n  error_class: E\n  back: []\n  backtrace: ['b.rb:2']\n";
        let notice = decode(yaml).expect("decode");
        assert_eq!(notice.backtrace, vec![Frame::new("b.rb", 2, "")]);
    }

    #[test]
    fn inline_routing_mapping_is_accepted() {
        let yaml = "notice:\n  error_class: E\n  api_key:\n    ':project': shop\n    tracker: Bug\n";
        let notice = decode(yaml).expect("decode");
        assert_eq!(notice.routing.project.as_deref(), Some("shop"));
        assert_eq!(notice.routing.tracker.as_deref(), Some("Bug"));
    }

    #[test]
    fn missing_notice_is_malformed() {
        let err = decode("error_class: E\n").expect_err("notice required");
        assert_eq!(err, DecodeError::MissingField("notice"));
    }

    #[test]
    fn missing_error_class_is_malformed() {
        let err = decode("notice:\n  error_message: boom\n").expect_err("class required");
        assert_eq!(err, DecodeError::MissingField("error_class"));
    }

    #[test]
    fn unparseable_body_is_malformed() {
        let err = decode("notice: [unterminated\n").expect_err("syntax");
        assert!(matches!(err, DecodeError::Syntax(_)));
    }

    #[test]
    fn tags_in_body_fail_closed() {
        let yaml = "notice:\n  error_class: E\n  request: !ruby/object:OpenStruct\n    url: x\n";
        let err = decode(yaml).expect_err("tag must be rejected");
        assert!(matches!(err, DecodeError::UnsafeTag(_)));
    }

    #[test]
    fn tags_in_routing_string_are_unsafe_routing() {
        let yaml = "notice:\n  error_class: E\n  api_key: \"--- !ruby/object:Foo\\nx: 1\\n\"\n";
        let err = decode(yaml).expect_err("tag must be rejected");
        assert!(matches!(err, DecodeError::UnsafeRouting(_)));
    }
}
