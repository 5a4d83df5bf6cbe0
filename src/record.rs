//! Request records, the submission form, and the pending-to-terminal
//! transition applied when a decision is recorded.
use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::error::RequestError;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

// A signature is either typed-out text or the data URL of a captured drawing.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    #[n(0)]
    Typed(#[n(0)] String),
    #[n(1)]
    Drawn(#[n(0)] String),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct EquipmentItem {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub purpose: String,
    // requester-asserted date string, stored verbatim
    #[n(3)]
    pub required_by: Option<String>,
}

impl EquipmentItem {
    pub fn new(name: impl Into<String>, quantity: u32, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity,
            purpose: purpose.into(),
            required_by: None,
        }
    }
    pub fn required_by(mut self, date: impl Into<String>) -> Self {
        self.required_by = Some(date.into());
        self
    }
}

// Also used for constructing drafts before submission
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestForm {
    #[n(0)]
    pub company_name: Option<String>,
    #[n(1)]
    pub project_site: Option<String>,
    #[n(2)]
    pub department: Option<String>,
    #[n(3)]
    pub requester_name: Option<String>,
    #[n(4)]
    pub requester_email: Option<String>,
    #[n(5)]
    pub requester_position: Option<String>,
    #[n(6)]
    pub items: Vec<EquipmentItem>,
    #[n(7)]
    pub signature: Option<Signature>,
    // requester-asserted date string, stored verbatim
    #[n(8)]
    pub date_of_request: Option<String>,
}

impl RequestForm {
    /// Construct a new draft form, the basis for a submission
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }
    pub fn set_project_site(mut self, site: impl Into<String>) -> Self {
        self.project_site = Some(site.into());
        self
    }
    pub fn set_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
    pub fn set_requester_name(mut self, name: impl Into<String>) -> Self {
        self.requester_name = Some(name.into());
        self
    }
    pub fn set_requester_email(mut self, email: impl Into<String>) -> Self {
        self.requester_email = Some(email.into());
        self
    }
    pub fn set_requester_position(mut self, position: impl Into<String>) -> Self {
        self.requester_position = Some(position.into());
        self
    }
    pub fn add_item(mut self, item: EquipmentItem) -> Self {
        self.items.push(item);
        self
    }
    pub fn set_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }
    pub fn set_date_of_request(mut self, date: impl Into<String>) -> Self {
        self.date_of_request = Some(date.into());
        self
    }

    /// Checks required fields before anything is persisted or mailed.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.requester_name.as_deref().is_none_or(str::is_empty) {
            return Err(RequestError::MissingField("requester_name"));
        }
        match self.requester_email.as_deref() {
            None | Some("") => return Err(RequestError::MissingField("requester_email")),
            Some(email) if !email.contains('@') => {
                return Err(RequestError::MissingField("requester_email"));
            }
            Some(_) => {}
        }
        if self.items.is_empty() {
            return Err(RequestError::MissingField("items"));
        }
        if self.items.iter().any(|item| item.name.is_empty()) {
            return Err(RequestError::MissingField("item name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
}

/// The approver's input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: DecisionAction,
    pub approver_name: String,
    pub comments: Option<String>,
    pub signature: Option<Signature>,
    // approver-asserted date string, stored verbatim
    pub decision_date: Option<String>,
}

impl Decision {
    pub fn new(action: DecisionAction, approver_name: impl Into<String>) -> Self {
        Self {
            action,
            approver_name: approver_name.into(),
            comments: None,
            signature: None,
            decision_date: None,
        }
    }
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.decision_date = Some(date.into());
        self
    }
}

/// One persisted equipment request, keyed in the store by `request_id`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub form: RequestForm,
    #[n(2)]
    pub submitted_at: TimeStamp<Utc>,
    // set exactly once here, never regenerated
    #[n(3)]
    pub approval_token: String,
    #[n(4)]
    pub token_expires_at: TimeStamp<Utc>,
    #[n(5)]
    pub token_used: bool,
    #[n(6)]
    pub approval_status: ApprovalStatus,
    #[n(7)]
    pub approved_by: Option<String>,
    #[n(8)]
    pub approval_signature: Option<Signature>,
    #[n(9)]
    pub approval_date: Option<String>,
    #[n(10)]
    pub approval_comments: Option<String>,
}

impl RequestRecord {
    pub fn new(
        request_id: String,
        form: RequestForm,
        approval_token: String,
        submitted_at: TimeStamp<Utc>,
        token_expires_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            request_id,
            form,
            submitted_at,
            approval_token,
            token_expires_at,
            token_used: false,
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            approval_signature: None,
            approval_date: None,
            approval_comments: None,
        }
    }

    pub fn requester_email(&self) -> Option<&str> {
        self.form.requester_email.as_deref()
    }
    pub fn requester_name(&self) -> Option<&str> {
        self.form.requester_name.as_deref()
    }

    /// The pure `Pending` to `Approved`/`Rejected` step.
    ///
    /// Consumes the token and stamps the decision fields in one logical
    /// write, so a persisted result can never carry a reusable token. Callers
    /// must have run the validator first; this does not re-check it.
    pub fn apply_decision(&self, decision: &Decision) -> RequestRecord {
        let mut next = self.clone();
        next.token_used = true;
        next.approval_status = match decision.action {
            DecisionAction::Approve => ApprovalStatus::Approved,
            DecisionAction::Reject => ApprovalStatus::Rejected,
        };
        next.approved_by = Some(decision.approver_name.clone());
        next.approval_signature = decision.signature.clone();
        next.approval_date = decision.decision_date.clone();
        next.approval_comments = decision.comments.clone();
        next
    }
}

/// Human-readable request id: `REQ-<seq><MM><YY>`, sequence zero-padded to
/// three digits and widening past 999.
pub fn derive_request_id(sequence: u64, now: DateTime<Utc>) -> String {
    format!("REQ-{:03}{:02}{:02}", sequence, now.month(), now.year() % 100)
}
