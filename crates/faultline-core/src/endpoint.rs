//! Transport-neutral request handling for the two inbound routes.
//!
//! A transport hands over the route and the raw body and writes back the
//! returned status and plain-text body. Decoding happens before the api key
//! check, so a malformed body is rejected as malformed even without a key.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::decode::WireFormat;
use crate::directory::LookupContext;
use crate::error::{ErrorCode, IngestError};
use crate::model::notice::Notice;
use crate::model::record::RecordId;
use crate::reconcile::{Reconciler, Reconciliation};

/// Inbound route. The route alone picks the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `POST /notifier_api/v2/notices`
    V2Notices,
    /// `POST /notices`
    LegacyNotices,
}

impl Route {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::V2Notices => "/notifier_api/v2/notices",
            Self::LegacyNotices => "/notices",
        }
    }

    #[must_use]
    pub const fn wire_format(self) -> WireFormat {
        match self {
            Self::V2Notices => WireFormat::V2,
            Self::LegacyNotices => WireFormat::Legacy,
        }
    }
}

impl From<WireFormat> for Route {
    fn from(format: WireFormat) -> Self {
        match format {
            WireFormat::V2 => Self::V2Notices,
            WireFormat::Legacy => Self::LegacyNotices,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.split('?').next().unwrap_or_default().trim_end_matches('/');
        match path {
            "/notifier_api/v2/notices" => Ok(Self::V2Notices),
            "/notices" => Ok(Self::LegacyNotices),
            other => Err(format!("no route for '{other}'")),
        }
    }
}

/// Plain-text reply for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub record_id: Option<RecordId>,
    pub error_code: Option<ErrorCode>,
}

impl Response {
    #[must_use]
    pub fn received(id: RecordId) -> Self {
        Self {
            status: 200,
            body: format!("Received bug report.\n<error-id>{id}</error-id>\n<id>{id}</id>"),
            record_id: Some(id),
            error_code: None,
        }
    }

    #[must_use]
    pub fn from_error(err: &IngestError) -> Self {
        Self {
            status: err.status(),
            body: err.to_string(),
            record_id: None,
            error_code: Some(err.code()),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub struct Endpoint {
    api_key: Option<String>,
    reconciler: Reconciler,
    next_request: AtomicU64,
}

impl Endpoint {
    /// `api_key` of `None` disables ingestion: every notice is refused.
    pub fn new(api_key: Option<String>, reconciler: Reconciler) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
            reconciler,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn handle(&self, route: Route, body: &[u8]) -> Response {
        let seq = self.next_request.fetch_add(1, Ordering::Relaxed);
        let ctx = LookupContext::new(format!("req-{seq}"));
        self.handle_with_context(&ctx, route, body)
    }

    pub fn handle_with_context(&self, ctx: &LookupContext, route: Route, body: &[u8]) -> Response {
        debug!(request_id = %ctx, %route, bytes = body.len(), "notice received");

        match self.ingest(ctx, route, body) {
            Ok(outcome) => Response::received(outcome.record_id),
            Err(err) => {
                match err.status() {
                    500.. => error!(request_id = %ctx, %route, code = %err.code(), error = %err, "notice failed"),
                    _ => warn!(request_id = %ctx, %route, code = %err.code(), error = %err, "notice rejected"),
                }
                Response::from_error(&err)
            }
        }
    }

    /// Decode, authenticate and reconcile one notice.
    ///
    /// # Errors
    ///
    /// Returns the [`IngestError`] the transport should translate into a
    /// status code.
    pub fn ingest(
        &self,
        ctx: &LookupContext,
        route: Route,
        body: &[u8],
    ) -> Result<Reconciliation, IngestError> {
        let notice = route.wire_format().decoder().decode(body)?;
        self.authorize(&notice)?;
        let outcome = self.reconciler.reconcile(ctx, &notice)?;
        info!(
            request_id = %ctx,
            record_id = %outcome.record_id,
            occurrences = outcome.occurrences,
            "notice reconciled"
        );
        Ok(outcome)
    }

    fn authorize(&self, notice: &Notice) -> Result<(), IngestError> {
        match (&self.api_key, &notice.routing.api_key) {
            (Some(expected), Some(given)) if keys_match(expected, given) => Ok(()),
            _ => Err(IngestError::AccessDenied),
        }
    }
}

/// Constant-time key comparison. Only the length may leak.
fn keys_match(expected: &str, given: &str) -> bool {
    let (expected, given) = (expected.as_bytes(), given.as_bytes());
    expected.len() == given.len() && bool::from(expected.ct_eq(given))
}
