//! Canonical data model: the decoded [`notice::Notice`] and the
//! [`record::TrackingRecord`] it is reconciled into.

pub mod notice;
pub mod record;
