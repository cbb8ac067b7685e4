//! # Report Tracker Core
//!
//! Platform-agnostic logic for Report Tracker: the report entity, the
//! vote/verification rule engine, identifier allocation, and the store
//! abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or other I/O-bound
//! dependencies. Everything here is a pure state transition over a
//! [`models::Report`] or an async trait that the service crate implements.

pub mod error;
pub mod ids;
pub mod models;
pub mod rules;
pub mod store;

pub use error::ReportError;
pub use models::{
    Attachment, AttachmentKind, Author, IssueRef, MessageRef, Report, ReportKind, Severity,
    Status, UserId,
};
