//! Durable request store backed by sled.
//!
//! One database, two trees: `requests` maps request id to the CBOR-encoded
//! [`RequestRecord`], `meta` holds the persisted sequence counter. The store
//! owns the persistence medium exclusively; no other component touches it.
use std::path::Path;
use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::RequestError;
use crate::record::RequestRecord;

const REQUESTS_TREE: &str = "requests";
const META_TREE: &str = "meta";
const COUNTER_KEY: &[u8] = b"request_counter";

pub struct RequestStore {
    db: Arc<Db>,
    requests: Tree,
    meta: Tree,
}

impl RequestStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RequestError> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    pub fn new(db: Arc<Db>) -> Result<Self, RequestError> {
        let requests = db.open_tree(REQUESTS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, requests, meta })
    }

    /// Issue a fresh sequence number: strictly increasing, atomic, and
    /// flushed before returning so a restarted process resumes past the last
    /// issued value and never reuses one.
    pub fn next_sequence_number(&self) -> Result<u64, RequestError> {
        let mut issued = 0u64;
        self.meta.update_and_fetch(COUNTER_KEY, |old| {
            issued = old.map(decode_counter).unwrap_or(0) + 1;
            Some(issued.to_be_bytes().to_vec())
        })?;
        self.meta.flush()?;
        Ok(issued)
    }

    /// Upsert a record, durable before this returns.
    pub fn put(&self, record: &RequestRecord) -> Result<(), RequestError> {
        let encoded = minicbor::to_vec(record)?;
        self.requests.insert(record.request_id.as_bytes(), encoded)?;
        self.requests.flush()?;
        Ok(())
    }

    pub fn get(&self, request_id: &str) -> Result<Option<RequestRecord>, RequestError> {
        match self.requests.get(request_id.as_bytes())? {
            Some(ivec) => Ok(Some(minicbor::decode(ivec.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Enumeration for diagnostics.
    pub fn all_ids(&self) -> Result<Vec<String>, RequestError> {
        let mut ids = Vec::new();
        for entry in self.requests.iter() {
            let (key, _) = entry?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    /// Administrative removal; not part of any user-facing flow.
    pub fn delete(&self, request_id: &str) -> Result<bool, RequestError> {
        let removed = self.requests.remove(request_id.as_bytes())?;
        self.requests.flush()?;
        Ok(removed.is_some())
    }

    /// Atomically rewrite one record.
    ///
    /// `f` sees the currently stored record (or its absence) and either
    /// refuses or returns the replacement. The write is a compare-and-swap
    /// against the exact bytes read, retried if another writer got in
    /// between, so check-and-mutate sequences like "token unused, mark used"
    /// are a single atomic step. A storage failure aborts the whole
    /// operation with no partial state visible.
    pub fn transition<F>(&self, request_id: &str, mut f: F) -> Result<RequestRecord, RequestError>
    where
        F: FnMut(Option<&RequestRecord>) -> Result<RequestRecord, RequestError>,
    {
        loop {
            let current = self.requests.get(request_id.as_bytes())?;
            let decoded = match &current {
                Some(ivec) => Some(minicbor::decode::<RequestRecord>(ivec.as_ref())?),
                None => None,
            };
            let next = f(decoded.as_ref())?;
            let encoded = minicbor::to_vec(&next)?;

            let swap = self.requests.compare_and_swap(
                request_id.as_bytes(),
                current.as_ref(),
                Some(encoded),
            )?;
            if swap.is_ok() {
                self.requests.flush()?;
                return Ok(next);
            }
            // lost the race, re-read and re-validate
        }
    }

    pub fn flush(&self) -> Result<(), RequestError> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}
