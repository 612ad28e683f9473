use std::fmt;

use crate::store::StoreError;

/// Machine-readable error codes for operators and client notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedNotice,
    UnsafeRoutingParams,
    AccessDenied,
    ProjectNotFound,
    TrackerNotFound,
    RecordNotFound,
    WriteConflict,
    StoreTimeout,
    StoreFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MalformedNotice => "E2001",
            Self::UnsafeRoutingParams => "E2002",
            Self::AccessDenied => "E3001",
            Self::ProjectNotFound => "E4001",
            Self::TrackerNotFound => "E4002",
            Self::RecordNotFound => "E4003",
            Self::WriteConflict => "E5001",
            Self::StoreTimeout => "E5002",
            Self::StoreFailure => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedNotice => "Malformed notice",
            Self::UnsafeRoutingParams => "Routing parameters could not be decoded safely",
            Self::AccessDenied => "Access denied",
            Self::ProjectNotFound => "Project not found",
            Self::TrackerNotFound => "Tracker not found",
            Self::RecordNotFound => "Tracking record not found",
            Self::WriteConflict => "Tracking record changed concurrently",
            Self::StoreTimeout => "Tracking store timed out",
            Self::StoreFailure => "Tracking store failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .faultline/config.toml and retry."),
            Self::MalformedNotice => Some("Check the notifier version matches the endpoint route."),
            Self::UnsafeRoutingParams => {
                Some("Send routing parameters as a plain YAML mapping without type tags.")
            }
            Self::AccessDenied => Some("Configure the notifier with the server api_key."),
            Self::ProjectNotFound => Some("Add the project identifier to [[projects]]."),
            Self::TrackerNotFound => Some("Add the tracker name to the project's trackers list."),
            Self::RecordNotFound => Some("Check the record id with `fl list`."),
            Self::WriteConflict => None,
            Self::StoreTimeout => Some("Retry later; the occurrence may already be recorded."),
            Self::StoreFailure => Some("Check disk space and database permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of one ingest request.
///
/// Every variant is local to the request that produced it.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The body could not be decoded into a notice.
    #[error("malformed notice: {0}")]
    MalformedNotice(String),

    /// The routing mapping contained something other than plain scalars,
    /// sequences and mappings.
    #[error("unsafe routing parameters: {0}")]
    UnsafeRoutingParams(String),

    /// Missing or wrong api key.
    #[error("Access denied. Notice API is disabled or key is invalid.")]
    AccessDenied,

    #[error("could not log error, project {0} not found.")]
    ProjectNotFound(String),

    #[error("could not log error, tracker {0} not found.")]
    TrackerNotFound(String),

    /// Store unreachable, timed out, or failed for a reason other than a
    /// write conflict.
    #[error("could not log error: {0}")]
    Persistence(#[from] StoreError),
}

impl IngestError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedNotice(_) => ErrorCode::MalformedNotice,
            Self::UnsafeRoutingParams(_) => ErrorCode::UnsafeRoutingParams,
            Self::AccessDenied => ErrorCode::AccessDenied,
            Self::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            Self::TrackerNotFound(_) => ErrorCode::TrackerNotFound,
            Self::Persistence(err) => err.code(),
        }
    }

    /// `true` for errors that mean the body itself was rejected.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedNotice(_) | Self::UnsafeRoutingParams(_))
    }

    /// `true` for unknown project or tracker.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ProjectNotFound(_) | Self::TrackerNotFound(_))
    }

    /// HTTP-equivalent status for the inbound request.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::MalformedNotice(_) | Self::UnsafeRoutingParams(_) => 400,
            Self::AccessDenied => 403,
            Self::ProjectNotFound(_) | Self::TrackerNotFound(_) => 404,
            Self::Persistence(StoreError::Timeout(_)) => 503,
            Self::Persistence(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, IngestError};
    use crate::store::StoreError;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::MalformedNotice,
            ErrorCode::UnsafeRoutingParams,
            ErrorCode::AccessDenied,
            ErrorCode::ProjectNotFound,
            ErrorCode::TrackerNotFound,
            ErrorCode::RecordNotFound,
            ErrorCode::WriteConflict,
            ErrorCode::StoreTimeout,
            ErrorCode::StoreFailure,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::TrackerNotFound.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(IngestError::MalformedNotice("x".into()).status(), 400);
        assert_eq!(IngestError::UnsafeRoutingParams("x".into()).status(), 400);
        assert_eq!(IngestError::AccessDenied.status(), 403);
        assert_eq!(IngestError::ProjectNotFound("p".into()).status(), 404);
        assert_eq!(IngestError::TrackerNotFound("t".into()).status(), 404);
        assert_eq!(
            IngestError::Persistence(StoreError::Timeout(Duration::from_secs(1))).status(),
            503
        );
        assert_eq!(
            IngestError::Persistence(StoreError::Backend("disk full".into())).status(),
            500
        );
    }

    #[test]
    fn not_found_messages_name_the_identifier() {
        let err = IngestError::ProjectNotFound("ops".into());
        assert_eq!(err.to_string(), "could not log error, project ops not found.");
        assert!(err.is_not_found());
        assert!(!err.is_malformed());
    }
}
