//! Entry validation: signature verification and structural checks.

use crate::canonical::signed_message;
use crate::crypto::Blake3Hash;
use crate::entry::{Entry, ENTRY_VERSION, MAX_HEADS};
use crate::error::ValidationError;
use crate::types::LogAddress;

/// Validate an entry received for `log`.
///
/// This performs:
/// - Log membership check
/// - Structural checks (see [`validate_entry_structure`])
/// - Signature verification
pub fn validate_entry(entry: &Entry, log: &LogAddress) -> Result<(), ValidationError> {
    if entry.header.log != *log {
        return Err(ValidationError::WrongLog {
            expected: *log,
            got: entry.header.log,
        });
    }

    validate_entry_structure(entry)?;

    let message = signed_message(entry);
    entry
        .header
        .author
        .verify(&message, &entry.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}

/// Validate entry structure without signature verification.
///
/// Used for entries read back from the local store, which were verified
/// when they were first ingested.
pub fn validate_entry_structure(entry: &Entry) -> Result<(), ValidationError> {
    if entry.header.version != ENTRY_VERSION {
        return Err(ValidationError::UnsupportedVersion(entry.header.version));
    }

    if Blake3Hash::hash(&entry.payload) != entry.header.payload_hash {
        return Err(ValidationError::PayloadHashMismatch);
    }

    let heads = &entry.header.heads;
    if heads.len() > MAX_HEADS {
        return Err(ValidationError::TooManyHeads(MAX_HEADS));
    }
    if heads.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValidationError::UnsortedHeads);
    }

    let id = entry.compute_id();
    if heads.contains(&id) {
        return Err(ValidationError::SelfReference { id });
    }

    Ok(())
}
