//! Lookups against the `users` collection.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error};

use crate::store::{DocumentRef, DocumentStore, StoreError, UserRecord, USERS};

/// A phone number reduced to a hash, safe to put in logs.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PhoneKey(String);

impl PhoneKey {
    /// Hashes a phone number; only the first 16 bytes of the digest are kept.
    pub fn from_number(number: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(number.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

/// Errors that can occur while looking up users.
#[derive(Debug, Error, Clone)]
pub enum UserError {
    /// No user document with this id
    #[error("User {uid} not found")]
    NotFound { uid: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A user document found by phone number.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMatch {
    pub reference: DocumentRef,
    pub user: UserRecord,
}

/// Finds the user registered with `number`.
///
/// Surrounding spaces and a leading `+` are ignored; stored numbers always
/// carry the `+`. If several users share the number the first one wins.
pub fn find_user_by_number<S: DocumentStore + ?Sized>(
    store: &S,
    number: &str,
) -> Result<Option<UserMatch>, UserError> {
    let checked = format!("+{}", number.trim_matches(' ').trim_start_matches('+'));
    let key = PhoneKey::from_number(&checked);

    let docs = store
        .find_by_equality(USERS, &[("number", checked.as_str())])
        .map_err(|e| {
            error!(phone = %key, error = %e, "User lookup by number failed");
            e
        })?;

    let Some(doc) = docs.into_iter().next() else {
        debug!(phone = %key, "No user registered with number");
        return Ok(None);
    };

    let user: UserRecord = doc.decode()?;
    Ok(Some(UserMatch {
        reference: doc.reference,
        user,
    }))
}

/// Returns the phone number of user `uid`.
pub fn lookup_user_number<S: DocumentStore + ?Sized>(
    store: &S,
    uid: &str,
) -> Result<String, UserError> {
    let reference = DocumentRef::new(USERS, uid);
    let doc = store.get(&reference)?.ok_or_else(|| {
        error!(document = %reference, "Tracked user not found");
        UserError::NotFound {
            uid: uid.to_string(),
        }
    })?;

    let user: UserRecord = doc.decode()?;
    Ok(user.number)
}
