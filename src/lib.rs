//! Approval-token lifecycle and request-state store for an equipment-request
//! workflow.
//!
//! A requester submits a form, the record is persisted with a single-use
//! time-limited approval token, and an approver later presents that token to
//! drive the request from `Pending` to `Approved` or `Rejected`. PDF rendering
//! and mail delivery are collaborator traits; the durable state change always
//! commits before any of them run.

pub mod error;
pub mod notify;
pub mod record;
pub mod service;
pub mod store;
pub mod token;
