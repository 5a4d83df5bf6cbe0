//! Lifecycle coordinator for the two entry points: submit and decide.
//!
//! Ordering guarantee: the durable state change (record persisted at submit,
//! token consumed and status written at decide) always commits before any
//! PDF or mail work starts. Delivery runs on detached background threads and
//! its failures are logged, never surfaced to the caller.
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::error::{RequestError, TokenError};
use crate::notify::{self, Mailer, PdfRenderer};
use crate::record::{self, ApprovalStatus, Decision, RequestForm, RequestRecord, TimeStamp};
use crate::store::RequestStore;
use crate::token;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root of the approval UI, e.g. `https://requests.example.com`.
    pub base_url: String,
    /// Who receives the submission mail with the tokenized link.
    pub approver_recipients: Vec<String>,
    /// How long a freshly minted token stays valid.
    pub token_ttl: Duration,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>, approver_recipients: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            approver_recipients,
            token_ttl: Duration::days(7),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approval_date: Option<String>,
    pub comments: Option<String>,
}

pub struct ApprovalService {
    store: Arc<RequestStore>,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn PdfRenderer>,
    config: ServiceConfig,
}

impl ApprovalService {
    pub fn new(
        store: Arc<RequestStore>,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn PdfRenderer>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            renderer,
            config,
        }
    }

    /// Accept a submission: validate the form, allocate a sequence number,
    /// mint the token, persist the pending record, then fire off the
    /// submission mail in the background.
    ///
    /// Success is reported as soon as the record is durably stored; the
    /// approval link keeps working even if every mail attempt fails.
    pub fn submit_request(&self, form: RequestForm) -> Result<SubmitReceipt, RequestError> {
        form.validate()?;

        let now = Utc::now();
        let sequence = self.store.next_sequence_number()?;
        let request_id = record::derive_request_id(sequence, now);
        let approval_token = token::generate();
        let expires_at = now + self.config.token_ttl;

        let record = RequestRecord::new(
            request_id.clone(),
            form,
            approval_token,
            TimeStamp::from(now),
            TimeStamp::from(expires_at),
        );
        self.store.put(&record)?;
        info!(request_id = %record.request_id, "request stored, token minted");

        self.spawn_submission_mail(record);

        Ok(SubmitReceipt { request_id })
    }

    /// Record an approve/reject decision.
    ///
    /// Token validation and the state transition run inside one atomic
    /// compare-and-swap on the stored record, so a token can never drive two
    /// decisions: the second attempt re-reads a record whose token is
    /// already consumed and fails with `AlreadyUsed`. Notification mail is
    /// dispatched only after the transition is durable.
    pub fn decide_request(
        &self,
        request_id: &str,
        presented_token: &str,
        decision: Decision,
    ) -> Result<RequestRecord, RequestError> {
        let now = Utc::now();
        let decided = self.store.transition(request_id, |current| {
            token::validate(current, presented_token, now)?;
            let current = current.ok_or(TokenError::NotFound)?;
            Ok(current.apply_decision(&decision))
        })?;
        info!(
            request_id = %decided.request_id,
            status = ?decided.approval_status,
            "decision recorded, token consumed"
        );

        self.spawn_decision_mail(decided.clone());

        Ok(decided)
    }

    /// Pre-flight check before the UI shows the decision form. Same
    /// validator as [`Self::decide_request`], so the two can never disagree
    /// for the same (request, token, time) triple.
    pub fn verify_token(&self, request_id: &str, presented_token: &str) -> Result<(), RequestError> {
        let record = self.store.get(request_id)?;
        token::validate(record.as_ref(), presented_token, Utc::now())?;
        Ok(())
    }

    pub fn status(&self, request_id: &str) -> Result<StatusReport, RequestError> {
        let record = self
            .store
            .get(request_id)?
            .ok_or_else(|| RequestError::UnknownRequest(request_id.to_string()))?;
        Ok(StatusReport {
            status: record.approval_status,
            approved_by: record.approved_by,
            approval_date: record.approval_date,
            comments: record.approval_comments,
        })
    }

    /// Diagnostics enumeration of every stored request id.
    pub fn all_request_ids(&self) -> Result<Vec<String>, RequestError> {
        self.store.all_ids()
    }

    /// Administrative removal of a record. Not reachable from any
    /// user-facing flow.
    pub fn delete_request(&self, request_id: &str) -> Result<bool, RequestError> {
        self.store.delete(request_id)
    }

    fn spawn_submission_mail(&self, record: RequestRecord) {
        let mailer = Arc::clone(&self.mailer);
        let renderer = Arc::clone(&self.renderer);
        let base_url = self.config.base_url.clone();
        let recipients = self.config.approver_recipients.clone();

        thread::spawn(move || {
            let pdf = render_or_warn(renderer.as_ref(), &record);
            for recipient in &recipients {
                let mail = notify::submission_mail(&record, &base_url, recipient, pdf.clone());
                if let Err(err) = mailer.send(&mail) {
                    warn!(
                        request_id = %record.request_id,
                        to = %recipient,
                        error = %err,
                        "submission mail failed, request remains approvable"
                    );
                }
            }
        });
    }

    fn spawn_decision_mail(&self, record: RequestRecord) {
        let mailer = Arc::clone(&self.mailer);
        let renderer = Arc::clone(&self.renderer);

        thread::spawn(move || {
            let pdf = render_or_warn(renderer.as_ref(), &record);
            match notify::decision_mail(&record, pdf) {
                Some(mail) => {
                    if let Err(err) = mailer.send(&mail) {
                        warn!(
                            request_id = %record.request_id,
                            to = %mail.to,
                            error = %err,
                            "decision mail failed, decision already durable"
                        );
                    }
                }
                None => warn!(
                    request_id = %record.request_id,
                    "record has no requester email, skipping decision mail"
                ),
            }
        });
    }
}

fn render_or_warn(renderer: &dyn PdfRenderer, record: &RequestRecord) -> Option<Vec<u8>> {
    match renderer.render(record) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(
                request_id = %record.request_id,
                error = %err,
                "pdf render failed, mailing without attachment"
            );
            None
        }
    }
}
