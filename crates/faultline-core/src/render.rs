//! Journal text rendering.
//!
//! Both dialects share one section schema. Sections appear in a fixed order
//! and only when their content is non-empty:
//!
//! 1. Error message
//! 2. Filtered backtrace
//! 3. Request
//! 4. Session
//! 5. Environment (server environment preferred)
//! 6. Full backtrace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::notice::{Frame, Notice, Params};

/// Markup flavour of the host tracker. Set once in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `h4.` headings, bodies wrapped in `<pre>`.
    #[default]
    Textile,
    /// `####` headings, bodies indented four spaces.
    Markdown,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Textile => "textile",
            Self::Markdown => "markdown",
        }
    }

    fn section(self, title: &str, body: &str) -> String {
        match self {
            Self::Textile => format!("h4. {title}\n\n<pre>{body}</pre>"),
            Self::Markdown => {
                let indented = body
                    .lines()
                    .map(|line| format!("    {line}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("#### {title}\n\n{indented}\n")
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "textile" => Ok(Self::Textile),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!(
                "unknown text formatting '{other}': expected textile or markdown"
            )),
        }
    }
}

/// Render the journal entry for one notice.
///
/// Pure and deterministic: mappings are key-ordered, so identical inputs
/// always produce byte-identical text.
#[must_use]
pub fn render(
    dialect: Dialect,
    error_message: &str,
    filtered: &[Frame],
    notice: &Notice,
    full: &[Frame],
) -> String {
    let mut sections = Vec::with_capacity(6);

    if !error_message.is_empty() {
        sections.push(dialect.section("Error message", error_message));
    }
    if !filtered.is_empty() {
        sections.push(dialect.section("Filtered backtrace", &format_backtrace(filtered)));
    }
    if !notice.request.is_empty() {
        sections.push(dialect.section("Request", &format_params(&notice.request)));
    }
    if !notice.session.is_empty() {
        sections.push(dialect.section("Session", &format_params(&notice.session)));
    }
    let environment = notice.environment_info();
    if !environment.is_empty() {
        sections.push(dialect.section("Environment", &format_params(environment)));
    }
    if !full.is_empty() {
        sections.push(dialect.section("Full backtrace", &format_backtrace(full)));
    }

    sections.join("\n\n")
}

fn format_backtrace(frames: &[Frame]) -> String {
    frames
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_params(params: &Params) -> String {
    serde_json::to_string_pretty(params).unwrap_or_else(|_| format!("{params:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notice() -> Notice {
        let mut notice = Notice {
            error_class: "RuntimeError".into(),
            error_message: "RuntimeError: boom".into(),
            backtrace: vec![
                Frame::new("[GEM_ROOT]/lib/a.rb", 1, ""),
                Frame::new("[PROJECT_ROOT]/app/x.rb", 6, "index"),
            ],
            ..Notice::default()
        };
        notice
            .request
            .insert("url".into(), json!("https://shop.example/"));
        notice
    }

    #[test]
    fn textile_wraps_sections_in_pre() {
        let n = notice();
        let text = render(
            Dialect::Textile,
            &n.error_message,
            &n.backtrace[1..],
            &n,
            &n.backtrace,
        );
        assert_eq!(
            text,
            "h4. Error message\n\n<pre>RuntimeError: boom</pre>\n\n\
             h4. Filtered backtrace\n\n<pre>[PROJECT_ROOT]/app/x.rb:6:in index</pre>\n\n\
             h4. Request\n\n<pre>{\n  \"url\": \"https://shop.example/\"\n}</pre>\n\n\
             h4. Full backtrace\n\n<pre>[GEM_ROOT]/lib/a.rb:1\n[PROJECT_ROOT]/app/x.rb:6:in index</pre>"
        );
    }

    #[test]
    fn markdown_indents_every_line() {
        let n = notice();
        let text = render(Dialect::Markdown, &n.error_message, &[], &n, &n.backtrace);
        assert_eq!(
            text,
            "#### Error message\n\n    RuntimeError: boom\n\n\n\
             #### Request\n\n    {\n      \"url\": \"https://shop.example/\"\n    }\n\n\n\
             #### Full backtrace\n\n    [GEM_ROOT]/lib/a.rb:1\n    [PROJECT_ROOT]/app/x.rb:6:in index\n"
        );
    }

    #[test]
    fn empty_sections_are_omitted() {
        let n = Notice::default();
        assert_eq!(render(Dialect::Textile, "", &[], &n, &[]), "");
        assert_eq!(render(Dialect::Markdown, "", &[], &n, &[]), "");
    }

    #[test]
    fn environment_prefers_server_environment() {
        let mut n = Notice::default();
        n.environment.insert("RAILS_ENV".into(), json!("production"));
        n.server_environment.insert("hostname".into(), json!("web-1"));
        let text = render(Dialect::Textile, "", &[], &n, &[]);
        assert!(text.contains("hostname"));
        assert!(!text.contains("RAILS_ENV"));
    }

    #[test]
    fn dialect_parses_from_config_strings() {
        assert_eq!("Markdown".parse::<Dialect>(), Ok(Dialect::Markdown));
        assert_eq!("textile".parse::<Dialect>(), Ok(Dialect::Textile));
        assert!("rst".parse::<Dialect>().is_err());
    }
}
