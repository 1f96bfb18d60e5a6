//! Registered passkey credentials and their replay counters.
//!
//! Credentials are stored as JSON under `credential:{id}` without expiry.
//! Counter advances are serialized per credential with compare-and-swap on
//! the stored record: a writer that read a stale record loses the swap,
//! re-reads, and retries, so two concurrent logins can never write an older
//! counter over a newer one.

use crate::constants::keys;
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::providers::SharedStore;
use crate::state::{Credential, UserId};

/// Compare-and-swap attempts before giving up on a contended credential.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Credential registry over a [`SharedStore`].
#[derive(Clone)]
pub struct CredentialRegistry<S> {
    store: S,
    clock: SharedClock,
}

impl<S: SharedStore> CredentialRegistry<S> {
    /// Create a credential registry.
    #[must_use]
    pub fn new(store: S, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn key(id: &str) -> String {
        format!("{}{id}", keys::CREDENTIAL)
    }

    /// Register a fresh credential with counter 0.
    ///
    /// # Errors
    ///
    /// - `CredentialAlreadyExists` if the id is already registered
    /// - `InvalidRequest` if the id is empty
    /// - `StoreUnavailable`/`StoreTimeout` on store failure
    pub async fn store(
        &self,
        id: &str,
        owner_user_id: UserId,
        display_name: Option<String>,
        public_key: Vec<u8>,
    ) -> Result<Credential> {
        if id.is_empty() {
            return Err(AuthError::InvalidRequest("Credential ID must not be empty".into()));
        }

        let credential = Credential {
            id: id.to_string(),
            owner_user_id,
            display_name,
            public_key,
            counter: 0,
            created_at: self.clock.now(),
        };

        let created = self
            .store
            .set_if_absent(&Self::key(id), serde_json::to_vec(&credential)?, None)
            .await?;

        if !created {
            tracing::warn!(credential_id = %id, "Refusing to overwrite existing credential");
            return Err(AuthError::CredentialAlreadyExists);
        }

        tracing::info!(
            credential_id = %id,
            user_id = %credential.owner_user_id,
            "Registered passkey credential"
        );

        Ok(credential)
    }

    /// Overwrite a credential unconditionally.
    ///
    /// Only for an explicit re-registration flow; the ceremony path uses
    /// [`CredentialRegistry::store`].
    ///
    /// # Errors
    ///
    /// Returns error on store failure.
    pub async fn replace(&self, credential: &Credential) -> Result<()> {
        self.store
            .set(&Self::key(&credential.id), serde_json::to_vec(credential)?, None)
            .await?;

        tracing::info!(
            credential_id = %credential.id,
            user_id = %credential.owner_user_id,
            "Replaced passkey credential"
        );

        Ok(())
    }

    /// Load a credential.
    ///
    /// # Errors
    ///
    /// - `CredentialNotFound` if no credential has this id
    /// - `SerializationError` if the stored record is corrupt
    /// - `StoreUnavailable`/`StoreTimeout` on store failure
    pub async fn get(&self, id: &str) -> Result<Credential> {
        self.load(id).await.map(|(credential, _)| credential)
    }

    async fn load(&self, id: &str) -> Result<(Credential, Vec<u8>)> {
        if id.is_empty() {
            return Err(AuthError::CredentialNotFound);
        }

        let raw = self
            .store
            .get(&Self::key(id))
            .await?
            .ok_or(AuthError::CredentialNotFound)?;

        let credential = serde_json::from_slice(&raw)?;
        Ok((credential, raw))
    }

    /// Advance the replay counter.
    ///
    /// The stored counter becomes `max(stored, new_counter)`; it never moves
    /// backwards, whatever order concurrent updates land in.
    ///
    /// # Returns
    ///
    /// The counter now stored.
    ///
    /// # Errors
    ///
    /// - `CredentialNotFound` if the credential disappeared
    /// - `StoreUnavailable` if the record stayed contended for every attempt
    pub async fn update_counter(&self, id: &str, new_counter: u32) -> Result<u32> {
        let key = Self::key(id);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut credential, raw) = self.load(id).await?;

            if credential.counter >= new_counter {
                tracing::debug!(
                    credential_id = %id,
                    stored = credential.counter,
                    submitted = new_counter,
                    "Counter already at or beyond submitted value"
                );
                return Ok(credential.counter);
            }

            credential.counter = new_counter;
            let updated = serde_json::to_vec(&credential)?;

            if self.store.compare_and_swap(&key, raw, updated).await? {
                tracing::debug!(credential_id = %id, counter = new_counter, attempt, "Advanced credential counter");
                return Ok(new_counter);
            }

            tracing::debug!(credential_id = %id, attempt, "Counter update lost a race, retrying");
        }

        tracing::warn!(credential_id = %id, "Counter update exhausted retry budget");
        Err(AuthError::StoreUnavailable(format!(
            "Credential {id} stayed contended for {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}
