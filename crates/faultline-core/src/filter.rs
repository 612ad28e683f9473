//! Backtrace noise filtering.
//!
//! A frame is noise when its file path contains a match for any pattern,
//! built-in ones first, then the project's own. The surviving frames keep
//! their wire order; the first of them is the error line used for the
//! subject and the source link.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::model::notice::Frame;

/// Patterns applied to every project: interpreter noise such as
/// `On line #3 of ...` template frames and bare `12:` prefixes.
pub const BUILTIN_PATTERNS: &[&str] = &[r"^On\sline\s#\d+\sof", r"^\d+:"];

static BUILTIN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BUILTIN_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Ordered set of noise patterns.
#[derive(Debug, Clone)]
pub struct BacktraceFilter {
    patterns: Vec<Regex>,
}

/// Result of [`BacktraceFilter::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredBacktrace {
    pub frames: Vec<Frame>,
    /// Frames dropped because they had no usable file.
    pub anomalies: usize,
}

impl FilteredBacktrace {
    /// First relevant frame, if any survived.
    #[must_use]
    pub fn error_line(&self) -> Option<&Frame> {
        self.frames.first()
    }
}

impl Default for BacktraceFilter {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BacktraceFilter {
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            patterns: BUILTIN.clone(),
        }
    }

    /// Built-in patterns followed by the project's.
    ///
    /// Blank patterns are skipped. A pattern that is not a valid regular
    /// expression is matched literally.
    #[must_use]
    pub fn with_project_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut filter = Self::builtin();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(pattern).or_else(|err| {
                warn!(pattern, error = %err, "invalid backtrace filter, matching it literally");
                Regex::new(&regex::escape(pattern))
            });
            match regex {
                Ok(regex) => filter.patterns.push(regex),
                Err(err) => warn!(pattern, error = %err, "skipping backtrace filter"),
            }
        }
        filter
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn is_noise(&self, file: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(file))
    }

    #[must_use]
    pub fn apply(&self, backtrace: &[Frame]) -> FilteredBacktrace {
        let mut anomalies = 0;
        let frames = backtrace
            .iter()
            .filter(|frame| {
                if !frame.has_file() {
                    anomalies += 1;
                    warn!(line = frame.line, method = %frame.method, "invalid backtrace element without file");
                    return false;
                }
                !self.is_noise(&frame.file)
            })
            .cloned()
            .collect();
        FilteredBacktrace { frames, anomalies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Vec<Frame> {
        vec![
            Frame::new("On line #3 of app/views/x.erb", 3, ""),
            Frame::new("12:in something", 1, ""),
            Frame::new("[GEM_ROOT]/gems/actionpack/lib/base.rb", 10, "process"),
            Frame::new("[PROJECT_ROOT]/app/controllers/x.rb", 6, "index"),
            Frame::new("", 9, "ghost"),
            Frame::new("[PROJECT_ROOT]/lib/y.rb", 2, ""),
        ]
    }

    #[test]
    fn builtin_patterns_drop_template_noise() {
        let filtered = BacktraceFilter::builtin().apply(&trace());
        assert_eq!(filtered.frames.len(), 3);
        assert_eq!(filtered.anomalies, 1);
        assert_eq!(filtered.frames[0].file, "[GEM_ROOT]/gems/actionpack/lib/base.rb");
    }

    #[test]
    fn project_patterns_match_anywhere_in_path() {
        let filtered = BacktraceFilter::with_project_patterns(&["GEM_ROOT"]).apply(&trace());
        let error_line = filtered.error_line().expect("error line");
        assert_eq!(error_line.file, "[PROJECT_ROOT]/app/controllers/x.rb");
        assert_eq!(error_line.line, 6);
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let filter = BacktraceFilter::with_project_patterns(&["", "   "]);
        assert_eq!(filter.len(), BUILTIN_PATTERNS.len());
    }

    #[test]
    fn invalid_regex_is_matched_literally() {
        let filter = BacktraceFilter::with_project_patterns(&["vendor/[broken"]);
        assert!(filter.is_noise("app/vendor/[broken/x.rb"));
        assert!(!filter.is_noise("app/vendor/b/x.rb"));
    }

    #[test]
    fn filtering_everything_leaves_no_error_line() {
        let filtered = BacktraceFilter::with_project_patterns(&["."]).apply(&trace());
        assert!(filtered.frames.is_empty());
        assert!(filtered.error_line().is_none());
    }
}
