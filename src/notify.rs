//! Collaborator seams for PDF rendering and mail delivery, plus the message
//! composition used by the lifecycle coordinator.
//!
//! Delivery is best effort by contract: nothing in this module may fail the
//! user-facing operation. Failures are returned to the coordinator, which
//! logs and swallows them, because the durable state change has already
//! committed by the time any mail is composed.
use std::sync::Arc;

use tracing::warn;

use crate::record::{ApprovalStatus, RequestRecord};

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/pdf".to_string(),
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

/// Outbound mail transport. Implementations are expected to bound each
/// attempt with their own timeout.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutboundMail) -> anyhow::Result<()>;
}

/// Renders the request form (and decision fields, once present) to PDF
/// bytes. Deterministic for identical input.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, record: &RequestRecord) -> anyhow::Result<Vec<u8>>;
}

/// Tries each transport in order, returning on the first success.
///
/// Models the deployed 587-then-465 SMTP port preference; exhausting every
/// transport yields the last error, which the coordinator logs but never
/// propagates to the caller.
pub struct FallbackMailer {
    transports: Vec<Arc<dyn Mailer>>,
}

impl FallbackMailer {
    pub fn new(primary: Arc<dyn Mailer>, alternate: Arc<dyn Mailer>) -> Self {
        Self {
            transports: vec![primary, alternate],
        }
    }

    pub fn from_transports(transports: Vec<Arc<dyn Mailer>>) -> Self {
        Self { transports }
    }
}

impl Mailer for FallbackMailer {
    fn send(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        let mut last_err = None;
        for (idx, transport) in self.transports.iter().enumerate() {
            match transport.send(mail) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(transport = idx, error = %err, "mail transport failed, trying next");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no mail transports configured")))
    }
}

/// The tokenized link an approver follows to reach the decision form.
pub fn approval_link(base_url: &str, record: &RequestRecord) -> String {
    format!(
        "{}/approve/{}?token={}",
        base_url.trim_end_matches('/'),
        record.request_id,
        record.approval_token
    )
}

/// Mail sent to one approver when a request is submitted.
pub fn submission_mail(
    record: &RequestRecord,
    base_url: &str,
    recipient: &str,
    pdf: Option<Vec<u8>>,
) -> OutboundMail {
    let link = approval_link(base_url, record);
    let requester = record.requester_name().unwrap_or("Unknown requester");
    let department = record.form.department.as_deref().unwrap_or("-");

    let mut rows = String::new();
    for item in &record.form.items {
        rows.push_str(&format!(
            "<li>{} &times; {} &mdash; {}</li>",
            item.quantity, item.name, item.purpose
        ));
    }

    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h2>New Equipment Request</h2>\
         <p><strong>Request ID:</strong> {id}</p>\
         <p><strong>Requester:</strong> {requester}</p>\
         <p><strong>Department:</strong> {department}</p>\
         <ul>{rows}</ul>\
         <p><a href=\"{link}\">Review &amp; Approve</a></p>\
         <p style=\"color: #666; font-size: 12px;\">Or copy this link: {link}</p>\
         </div>",
        id = record.request_id,
    );

    OutboundMail {
        to: recipient.to_string(),
        subject: format!("New Equipment Request - Request ID: {}", record.request_id),
        html,
        attachment: pdf.map(|bytes| Attachment::pdf(format!("{}.pdf", record.request_id), bytes)),
    }
}

/// Mail sent back to the requester once a decision has been recorded.
/// Returns `None` when the record has no decision yet or no requester email.
pub fn decision_mail(record: &RequestRecord, pdf: Option<Vec<u8>>) -> Option<OutboundMail> {
    let to = record.requester_email()?.to_string();
    let (status_text, status_color) = match record.approval_status {
        ApprovalStatus::Approved => ("APPROVED", "#10b981"),
        ApprovalStatus::Rejected => ("REJECTED", "#ef4444"),
        ApprovalStatus::Pending => return None,
    };
    let approver = record.approved_by.as_deref().unwrap_or("-");
    let date_row = record
        .approval_date
        .as_deref()
        .map(|date| format!("<p><strong>Date:</strong> {date}</p>"))
        .unwrap_or_default();
    let comments_row = record
        .approval_comments
        .as_deref()
        .map(|comments| format!("<p><strong>Comments:</strong> {comments}</p>"))
        .unwrap_or_default();
    let closing = match record.approval_status {
        ApprovalStatus::Approved => {
            "Your equipment request has been approved. \
             You will be contacted regarding the next steps."
        }
        _ => {
            "Your equipment request has been rejected. \
             If you have any questions, please contact the approver."
        }
    };

    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <p>Dear {requester},</p>\
         <h2 style=\"color: {status_color};\">Your Equipment Request Has Been {status_text}</h2>\
         <p><strong>Request ID:</strong> {id}</p>\
         <p><strong>Approved By:</strong> {approver}</p>\
         {date_row}\
         {comments_row}\
         <p>{closing}</p>\
         </div>",
        requester = record.requester_name().unwrap_or("requester"),
        id = record.request_id,
    );

    Some(OutboundMail {
        to,
        subject: format!(
            "Equipment Request {} - Request ID: {}",
            status_text, record.request_id
        ),
        html,
        attachment: pdf.map(|bytes| Attachment::pdf(format!("{}.pdf", record.request_id), bytes)),
    })
}
