//! Idempotency key derivation

use sha2::{Digest, Sha256};

use crate::types::ExternalTransaction;

/// Derive the stable unique key for an external transaction.
///
/// When the source supplies a native transaction identifier that id is the
/// key, used verbatim. Otherwise the key is the SHA-256 hex digest of
/// `"{date}:{description};{amount}"`, with the UTC timestamp rendered to
/// millisecond precision and the amount in signed minor units.
///
/// The hash input is deliberately the exact field text: the same record
/// always derives the same key across runs, but any upstream edit to the
/// description (including whitespace or case normalization) produces a new
/// key and the transaction would re-import as a duplicate. Known
/// limitation; do not normalize here.
pub fn derive_key(tx: &ExternalTransaction) -> String {
    if let Some(id) = &tx.external_id {
        return id.clone();
    }

    let date = tx
        .timestamp
        .to_utc()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{};{}", date, tx.description, tx.amount_minor));
    format!("{:x}", hasher.finalize())
}
