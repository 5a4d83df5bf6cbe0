//! Walks one request through the whole lifecycle against a throwaway store,
//! with stub collaborators that print instead of rendering or mailing.
//!
//! Run with: cargo run --example approval_flow
use std::sync::Arc;

use equipment_approval::notify::{Mailer, OutboundMail, PdfRenderer};
use equipment_approval::record::{
    Decision, DecisionAction, EquipmentItem, RequestForm, RequestRecord, Signature,
};
use equipment_approval::service::{ApprovalService, ServiceConfig};
use equipment_approval::store::RequestStore;

struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        println!("--- mail to {} ---", mail.to);
        println!("subject: {}", mail.subject);
        if let Some(attachment) = &mail.attachment {
            println!("attachment: {} ({} bytes)", attachment.filename, attachment.bytes.len());
        }
        Ok(())
    }
}

struct StubRenderer;

impl PdfRenderer for StubRenderer {
    fn render(&self, record: &RequestRecord) -> anyhow::Result<Vec<u8>> {
        Ok(format!("%PDF stub for {}", record.request_id).into_bytes())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let dir = tempfile::tempdir()?;
    let store = Arc::new(RequestStore::open(dir.path().join("requests.db"))?);

    let service = ApprovalService::new(
        Arc::clone(&store),
        Arc::new(ConsoleMailer),
        Arc::new(StubRenderer),
        ServiceConfig::new("http://localhost:3000", vec!["approver@example.com".into()]),
    );

    let form = RequestForm::new()
        .set_company_name("Acme Construction")
        .set_project_site("North Yard")
        .set_department("Civil Works")
        .set_requester_name("Jordan Mensah")
        .set_requester_email("jordan@example.com")
        .set_requester_position("Site Engineer")
        .add_item(EquipmentItem::new("Excavator", 1, "Trenching").required_by("2026-09-15"))
        .add_item(EquipmentItem::new("Concrete mixer", 2, "Foundation pour"))
        .set_signature(Signature::Typed("Jordan Mensah".into()));

    let receipt = service.submit_request(form)?;
    println!("submitted: {}", receipt.request_id);
    println!("status: {:?}", service.status(&receipt.request_id)?.status);

    // In production the token arrives by mail; here we read it back.
    let record = store
        .get(&receipt.request_id)?
        .expect("record was just stored");

    service.verify_token(&receipt.request_id, &record.approval_token)?;

    let decided = service.decide_request(
        &receipt.request_id,
        &record.approval_token,
        Decision::new(DecisionAction::Approve, "Morgan Asante")
            .with_comments("Approved for Q4 works")
            .with_date("2026-09-01"),
    )?;
    println!("decided: {:?}", decided.approval_status);

    // The token is consumed; a replay is refused.
    let replay = service.verify_token(&receipt.request_id, &record.approval_token);
    println!("replay attempt: {:?}", replay.err());

    Ok(())
}
