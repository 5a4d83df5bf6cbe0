//! Approval token minting and validation
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::error::TokenError;
use crate::record::RequestRecord;

pub const TOKEN_BYTES: usize = 32;

/// Mint a fresh approval token: 256 bits from the OS CSPRNG, rendered as 64
/// lowercase hex characters. Unpredictable from the request id, timestamp, or
/// sequence number; entropy exhaustion is unrecoverable and aborts.
pub fn generate() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

// Compare through sha256 digests so the comparison has a fixed structure
// regardless of the presented token's length or matching prefix.
fn tokens_match(issued: &str, presented: &str) -> bool {
    let issued = sha256::digest(issued);
    let presented = sha256::digest(presented);
    issued.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Decide whether `presented` may drive a decision on `record`.
///
/// Pure given its inputs (record, token, current time). The checks run in a
/// fixed order, first match wins: an empty token reports `Missing` rather
/// than `Mismatch`, and a wrong token on a consumed record still reports
/// `Mismatch`. Only an `Ok` outcome permits the state machine to proceed.
pub fn validate(
    record: Option<&RequestRecord>,
    presented: &str,
    now: DateTime<Utc>,
) -> Result<(), TokenError> {
    if presented.is_empty() {
        return Err(TokenError::Missing);
    }
    let record = record.ok_or(TokenError::NotFound)?;
    if !tokens_match(&record.approval_token, presented) {
        return Err(TokenError::Mismatch);
    }
    if record.token_used {
        return Err(TokenError::AlreadyUsed);
    }
    if now > record.token_expires_at.to_datetime_utc() {
        return Err(TokenError::Expired);
    }
    Ok(())
}
