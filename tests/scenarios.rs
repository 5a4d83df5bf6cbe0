//! End-to-end lifecycle scenarios against a real on-disk store.
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::Duration;
use equipment_approval::error::TokenError;
use equipment_approval::notify::{Mailer, OutboundMail, PdfRenderer};
use equipment_approval::record::{
    ApprovalStatus, Decision, DecisionAction, EquipmentItem, RequestForm, RequestRecord,
};
use equipment_approval::service::{ApprovalService, ServiceConfig};
use equipment_approval::store::RequestStore;
use tempfile::tempdir;

// Swallows everything; delivery outcome must not matter to the lifecycle.
struct NullMailer;

impl Mailer for NullMailer {
    fn send(&self, _mail: &OutboundMail) -> anyhow::Result<()> {
        Ok(())
    }
}

// Every send fails, modelling an SMTP outage.
struct BrokenMailer;

impl Mailer for BrokenMailer {
    fn send(&self, _mail: &OutboundMail) -> anyhow::Result<()> {
        anyhow::bail!("smtp unreachable")
    }
}

// Forwards each delivered mail to the test over a channel.
struct RecordingMailer(Sender<OutboundMail>);

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        self.0.send(mail.clone())?;
        Ok(())
    }
}

struct StubRenderer;

impl PdfRenderer for StubRenderer {
    fn render(&self, record: &RequestRecord) -> anyhow::Result<Vec<u8>> {
        Ok(format!("%PDF stub for {}", record.request_id).into_bytes())
    }
}

struct BrokenRenderer;

impl PdfRenderer for BrokenRenderer {
    fn render(&self, _record: &RequestRecord) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("signature image failed to decode")
    }
}

fn sample_form() -> RequestForm {
    RequestForm::new()
        .set_company_name("Acme Construction")
        .set_project_site("North Yard")
        .set_department("Civil Works")
        .set_requester_name("Jordan Mensah")
        .set_requester_email("jordan@example.com")
        .add_item(EquipmentItem::new("Excavator", 1, "Trenching"))
}

fn service_with(
    store: &Arc<RequestStore>,
    mailer: Arc<dyn Mailer>,
    config: ServiceConfig,
) -> ApprovalService {
    ApprovalService::new(Arc::clone(store), mailer, Arc::new(StubRenderer), config)
}

fn default_config() -> ServiceConfig {
    ServiceConfig::new("http://localhost:3000", vec!["approver@example.com".into()])
}

// Sled uses file-based locking, so each test opens its own database under a
// tempdir for simplified cleanup.
fn open_store(dir: &tempfile::TempDir, name: &str) -> Arc<RequestStore> {
    Arc::new(RequestStore::open(dir.path().join(name)).expect("store open"))
}

#[test]
fn submit_then_approve_then_replay() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "approve.db");
    let service = service_with(&store, Arc::new(NullMailer), default_config());

    let receipt = service
        .submit_request(sample_form())
        .context("submit failed")?;
    assert!(receipt.request_id.starts_with("REQ-"));

    // immediately visible as pending
    let report = service.status(&receipt.request_id)?;
    assert_eq!(report.status, ApprovalStatus::Pending);
    assert!(report.approved_by.is_none());

    let record = store.get(&receipt.request_id)?.expect("record stored");
    assert!(!record.token_used);

    // expiry sits seven days out from submission
    let offset = record.token_expires_at.to_datetime_utc() - record.submitted_at.to_datetime_utc();
    assert!((offset - Duration::days(7)).num_seconds().abs() <= 1);

    let decided = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante").with_comments("Go ahead"),
    )?;
    assert_eq!(decided.approval_status, ApprovalStatus::Approved);
    assert!(decided.token_used);

    let report = service.status(&receipt.request_id)?;
    assert_eq!(report.status, ApprovalStatus::Approved);
    assert_eq!(report.approved_by.as_deref(), Some("Morgan Asante"));
    assert_eq!(report.comments.as_deref(), Some("Go ahead"));

    // same token, same request: refused, decision untouched
    let replay = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Reject, "Someone Else"),
    );
    assert_eq!(
        replay.err().and_then(|e| e.token_reason()),
        Some(TokenError::AlreadyUsed)
    );
    assert_eq!(
        service.status(&receipt.request_id)?.status,
        ApprovalStatus::Approved
    );

    Ok(())
}

#[test]
fn rejection_is_terminal() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "reject.db");
    let service = service_with(&store, Arc::new(NullMailer), default_config());

    let receipt = service.submit_request(sample_form())?;
    let record = store.get(&receipt.request_id)?.expect("record stored");

    let decided = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Reject, "Morgan Asante"),
    )?;
    assert_eq!(decided.approval_status, ApprovalStatus::Rejected);

    // the token was consumed by the rejection, so a later approve attempt
    // fails the same way
    let retry = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante"),
    );
    assert_eq!(
        retry.err().and_then(|e| e.token_reason()),
        Some(TokenError::AlreadyUsed)
    );
    assert_eq!(
        service.status(&receipt.request_id)?.status,
        ApprovalStatus::Rejected
    );

    Ok(())
}

#[test]
fn expired_token_is_refused_even_if_unused() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "expired.db");
    // expiry already in the past at submission time
    let config = default_config().with_token_ttl(Duration::seconds(-1));
    let service = service_with(&store, Arc::new(NullMailer), config);

    let receipt = service.submit_request(sample_form())?;
    let record = store.get(&receipt.request_id)?.expect("record stored");
    assert!(!record.token_used);

    let outcome = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante"),
    );
    assert_eq!(
        outcome.err().and_then(|e| e.token_reason()),
        Some(TokenError::Expired)
    );
    assert_eq!(
        service.status(&receipt.request_id)?.status,
        ApprovalStatus::Pending
    );

    Ok(())
}

#[test]
fn verify_and_decide_agree() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "agree.db");
    let service = service_with(&store, Arc::new(NullMailer), default_config());

    let receipt = service.submit_request(sample_form())?;
    let record = store.get(&receipt.request_id)?.expect("record stored");
    let wrong_token = "0".repeat(64);

    // missing beats mismatch on both paths
    for (token, expected) in [
        ("", TokenError::Missing),
        (wrong_token.as_str(), TokenError::Mismatch),
    ] {
        let verified = service.verify_token(&receipt.request_id, token);
        let decided = service.decide_request(
            &receipt.request_id,
            token,
            Decision::new(DecisionAction::Approve, "Morgan Asante"),
        );
        assert_eq!(verified.err().and_then(|e| e.token_reason()), Some(expected));
        assert_eq!(decided.err().and_then(|e| e.token_reason()), Some(expected));
    }

    // unknown id agrees as well
    for outcome in [
        service.verify_token("REQ-9990101", &record.approval_token),
        service
            .decide_request(
                "REQ-9990101",
                &record.approval_token,
                Decision::new(DecisionAction::Approve, "Morgan Asante"),
            )
            .map(|_| ()),
    ] {
        assert_eq!(
            outcome.err().and_then(|e| e.token_reason()),
            Some(TokenError::NotFound)
        );
    }

    // the correct token still verifies, then works exactly once
    service.verify_token(&receipt.request_id, &record.approval_token)?;
    service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante"),
    )?;
    assert_eq!(
        service
            .verify_token(&receipt.request_id, &record.approval_token)
            .err()
            .and_then(|e| e.token_reason()),
        Some(TokenError::AlreadyUsed)
    );

    Ok(())
}

#[test]
fn mail_outage_never_fails_the_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "outage.db");
    let service = ApprovalService::new(
        Arc::clone(&store),
        Arc::new(BrokenMailer),
        Arc::new(BrokenRenderer),
        default_config(),
    );

    // both entry points report success on durable persistence alone
    let receipt = service.submit_request(sample_form())?;
    assert_eq!(
        service.status(&receipt.request_id)?.status,
        ApprovalStatus::Pending
    );

    let record = store.get(&receipt.request_id)?.expect("record stored");
    let decided = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante"),
    )?;
    assert_eq!(decided.approval_status, ApprovalStatus::Approved);

    Ok(())
}

#[test]
fn submission_mail_carries_tokenized_link_and_pdf() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "mail.db");
    let (tx, rx) = channel();
    let config = ServiceConfig::new(
        "http://localhost:3000/",
        vec!["approver@example.com".into(), "backup@example.com".into()],
    );
    let service = service_with(&store, Arc::new(RecordingMailer(tx)), config);

    let receipt = service.submit_request(sample_form())?;
    let record = store.get(&receipt.request_id)?.expect("record stored");

    let first = rx.recv_timeout(StdDuration::from_secs(5))?;
    let second = rx.recv_timeout(StdDuration::from_secs(5))?;

    let mut recipients = vec![first.to.clone(), second.to.clone()];
    recipients.sort();
    assert_eq!(recipients, ["approver@example.com", "backup@example.com"]);

    let expected_link = format!(
        "http://localhost:3000/approve/{}?token={}",
        receipt.request_id, record.approval_token
    );
    assert!(first.html.contains(&expected_link));
    assert!(first.subject.contains(&receipt.request_id));
    let attachment = first.attachment.expect("pdf attached");
    assert_eq!(attachment.filename, format!("{}.pdf", receipt.request_id));

    Ok(())
}

#[test]
fn decision_mail_reaches_the_requester() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "decision_mail.db");
    let (tx, rx) = channel();
    let service = service_with(&store, Arc::new(RecordingMailer(tx)), default_config());

    let receipt = service.submit_request(sample_form())?;
    let record = store.get(&receipt.request_id)?.expect("record stored");

    // drain the submission mail first
    rx.recv_timeout(StdDuration::from_secs(5))?;

    service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Reject, "Morgan Asante").with_comments("Budget hold"),
    )?;

    let mail = rx.recv_timeout(StdDuration::from_secs(5))?;
    assert_eq!(mail.to, "jordan@example.com");
    assert!(mail.subject.contains("REJECTED"));
    assert!(mail.html.contains("Budget hold"));

    Ok(())
}

#[test]
fn counter_survives_restart() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("restart.db");

    let before = {
        let store = RequestStore::open(&path)?;
        let a = store.next_sequence_number()?;
        let b = store.next_sequence_number()?;
        assert!(b > a);
        b
        // store dropped here, releasing the sled lock
    };

    let store = RequestStore::open(&path)?;
    let after = store.next_sequence_number()?;
    assert!(after > before, "restarted counter must continue past {before}");

    Ok(())
}

#[test]
fn records_survive_restart() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("record_restart.db");

    let (request_id, approval_token) = {
        let store = Arc::new(RequestStore::open(&path)?);
        let service = service_with(&store, Arc::new(NullMailer), default_config());
        let receipt = service.submit_request(sample_form())?;
        let record = store.get(&receipt.request_id)?.expect("record stored");
        drop(service);
        (receipt.request_id, record.approval_token)
    };

    // the approval link is clicked days later, possibly after a restart
    let store = Arc::new(RequestStore::open(&path)?);
    let service = service_with(&store, Arc::new(NullMailer), default_config());
    let decided = service.decide_request(
        &request_id,
        &approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante"),
    )?;
    assert_eq!(decided.approval_status, ApprovalStatus::Approved);

    Ok(())
}

#[test]
fn administrative_delete_and_enumeration() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir, "admin.db");
    let service = service_with(&store, Arc::new(NullMailer), default_config());

    let first = service.submit_request(sample_form())?;
    let second = service.submit_request(
        sample_form()
            .set_requester_name("Ama Owusu")
            .set_requester_email("ama@example.com"),
    )?;
    assert_ne!(first.request_id, second.request_id);

    let mut ids = service.all_request_ids()?;
    ids.sort();
    let mut expected = vec![first.request_id.clone(), second.request_id.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    assert!(service.delete_request(&first.request_id)?);
    assert!(!service.delete_request(&first.request_id)?);
    assert_eq!(service.all_request_ids()?, vec![second.request_id.clone()]);

    assert!(service.status(&first.request_id).is_err());

    Ok(())
}
