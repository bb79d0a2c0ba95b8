//! Profile management: creation, authentication and recovery keys.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MIN_PASSWORD_LENGTH;
use crate::credentials::{CredentialStore, Profile};
use phantomvault_common::{Error, Password, ProfileId, Result};
use phantomvault_crypto::{unwrap_secret, wrap_secret, KdfParams, MachineIdentity, PasswordHash, RecoveryKey};

/// Reject passwords shorter than the minimum length.
pub fn validate_password(password: &Password) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Secrets derived for a new password: its hash, a fresh recovery key and
/// both wrapping directions.
pub(crate) struct IssuedSecrets {
    pub password_hash: PasswordHash,
    pub recovery_key: RecoveryKey,
    pub recovery_key_hash: PasswordHash,
    pub recovery_under_password: phantomvault_crypto::WrappedSecret,
    pub password_under_recovery: phantomvault_crypto::WrappedSecret,
}

impl IssuedSecrets {
    pub(crate) fn issue(password: &Password, params: &KdfParams) -> Result<Self> {
        let recovery_key = RecoveryKey::generate();
        Ok(Self {
            password_hash: PasswordHash::compute(password.as_bytes(), params)?,
            recovery_key_hash: PasswordHash::compute(recovery_key.as_bytes(), params)?,
            recovery_under_password: wrap_secret(recovery_key.as_bytes(), password.as_bytes(), params)?,
            password_under_recovery: wrap_secret(password.as_bytes(), recovery_key.as_bytes(), params)?,
            recovery_key,
        })
    }
}

/// Convert unwrapped bytes back into a secret string.
pub(crate) fn secret_to_string(bytes: phantomvault_common::SensitiveBytes) -> Result<String> {
    String::from_utf8(bytes.as_bytes().to_vec())
        .map_err(|_| Error::Integrity("Unwrapped secret is not valid UTF-8".to_string()))
}

/// Creates and authenticates profiles against the credential store.
pub struct ProfileManager {
    credentials: Arc<CredentialStore>,
    params: KdfParams,
    os_user: String,
}

impl ProfileManager {
    pub fn new(credentials: Arc<CredentialStore>, params: KdfParams) -> Self {
        Self {
            credentials,
            params,
            os_user: MachineIdentity::current().username,
        }
    }

    /// Override the recorded OS user.
    pub fn with_os_user(mut self, os_user: impl Into<String>) -> Self {
        self.os_user = os_user.into();
        self
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.params
    }

    /// Create a profile and return it with its one-time recovery key.
    ///
    /// # Postconditions
    /// - The profile is active if it is the first one
    ///
    /// # Errors
    /// - Validation error on empty or duplicate name, or short password
    pub async fn create_profile(&self, name: &str, master_password: &Password) -> Result<(Profile, RecoveryKey)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Profile name cannot be empty".to_string()));
        }
        validate_password(master_password)?;

        if self.credentials.load().await?.find_by_name(name).is_some() {
            return Err(Error::Validation(format!("Profile already exists: {}", name)));
        }

        let secrets = IssuedSecrets::issue(master_password, &self.params)?;
        let now = Utc::now();
        let profile = Profile {
            id: ProfileId::generate(),
            name: name.to_string(),
            created_at: now,
            last_access_at: now,
            os_user: self.os_user.clone(),
            master_password_hash: secrets.password_hash,
            recovery_key_hash: secrets.recovery_key_hash,
            encrypted_recovery_key: secrets.recovery_under_password,
            master_password_encrypted_with_recovery: secrets.password_under_recovery,
        };

        let stored = profile.clone();
        self.credentials
            .update(move |doc| {
                if doc.find_by_name(&stored.name).is_some() {
                    return Err(Error::Validation(format!(
                        "Profile already exists: {}",
                        stored.name
                    )));
                }
                if doc.profiles.is_empty() {
                    doc.active_profile_id = Some(stored.id.clone());
                }
                doc.profiles.push(stored);
                Ok(())
            })
            .await?;

        info!(profile_id = %profile.id, "Profile created");
        Ok((profile, secrets.recovery_key))
    }

    /// Check a password against a profile's master hash.
    ///
    /// # Errors
    /// - Profile not found
    pub async fn verify_password(&self, profile_id: &ProfileId, password: &Password) -> Result<bool> {
        let doc = self.credentials.load().await?;
        Ok(doc.require(profile_id)?.master_password_hash.verify(password.as_bytes()))
    }

    /// Verify the password and record the access.
    ///
    /// # Errors
    /// - Authentication error on mismatch
    pub async fn authenticate(&self, profile_id: &ProfileId, password: &Password) -> Result<Profile> {
        if !self.verify_password(profile_id, password).await? {
            warn!(profile_id = %profile_id, "Authentication failed");
            return Err(Error::Authentication("Invalid master password".to_string()));
        }
        let id = profile_id.clone();
        self.credentials
            .update(move |doc| {
                let profile = doc.require_mut(&id)?;
                profile.last_access_at = Utc::now();
                Ok(profile.clone())
            })
            .await
    }

    pub async fn active_profile(&self) -> Result<Option<Profile>> {
        let doc = self.credentials.load().await?;
        Ok(doc
            .active_profile_id
            .as_ref()
            .and_then(|id| doc.find(id))
            .cloned())
    }

    /// Make a profile the active one for this OS user.
    pub async fn set_active_profile(&self, profile_id: &ProfileId) -> Result<Profile> {
        let id = profile_id.clone();
        let profile = self
            .credentials
            .update(move |doc| {
                let profile = doc.require_mut(&id)?;
                profile.last_access_at = Utc::now();
                let profile = profile.clone();
                doc.active_profile_id = Some(id);
                Ok(profile)
            })
            .await?;
        info!(profile_id = %profile.id, "Active profile changed");
        Ok(profile)
    }

    pub async fn clear_active_profile(&self) -> Result<()> {
        self.credentials
            .update(|doc| {
                doc.active_profile_id = None;
                Ok(())
            })
            .await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.credentials.load().await?.profiles)
    }

    pub async fn get_profile(&self, profile_id: &ProfileId) -> Result<Profile> {
        self.credentials.load().await?.require(profile_id).cloned()
    }

    pub async fn find_profile_by_name(&self, name: &str) -> Result<Option<Profile>> {
        Ok(self.credentials.load().await?.find_by_name(name.trim()).cloned())
    }

    /// Replace the master password and issue a fresh recovery key.
    ///
    /// # Errors
    /// - Authentication error if `old_password` is wrong
    /// - Validation error if `new_password` is too short
    pub async fn change_password(
        &self,
        profile_id: &ProfileId,
        old_password: &Password,
        new_password: &Password,
    ) -> Result<RecoveryKey> {
        validate_password(new_password)?;
        if !self.verify_password(profile_id, old_password).await? {
            return Err(Error::Authentication("Invalid master password".to_string()));
        }

        let secrets = IssuedSecrets::issue(new_password, &self.params)?;
        let id = profile_id.clone();
        let IssuedSecrets {
            password_hash,
            recovery_key,
            recovery_key_hash,
            recovery_under_password,
            password_under_recovery,
        } = secrets;

        self.credentials
            .update(move |doc| {
                let profile = doc.require_mut(&id)?;
                profile.master_password_hash = password_hash;
                profile.recovery_key_hash = recovery_key_hash;
                profile.encrypted_recovery_key = recovery_under_password;
                profile.master_password_encrypted_with_recovery = password_under_recovery;
                profile.last_access_at = Utc::now();
                Ok(())
            })
            .await?;

        info!(profile_id = %profile_id, "Master password changed");
        Ok(recovery_key)
    }

    /// Redisplay the recovery key to an authenticated user.
    ///
    /// # Errors
    /// - Authentication error if the password is wrong
    pub async fn show_recovery_key(&self, profile_id: &ProfileId, password: &Password) -> Result<RecoveryKey> {
        let profile = self.get_profile(profile_id).await?;
        if !profile.master_password_hash.verify(password.as_bytes()) {
            return Err(Error::Authentication("Invalid master password".to_string()));
        }
        let plain = unwrap_secret(&profile.encrypted_recovery_key, password.as_bytes())?;
        RecoveryKey::parse(&secret_to_string(plain)?)
    }

    /// Find the profile a recovery key belongs to and return its master password.
    ///
    /// # Errors
    /// - Validation error if the key is malformed
    /// - Authentication error if no profile matches
    pub async fn recover_with_recovery_key(&self, recovery_key: &str) -> Result<(ProfileId, Password)> {
        let key = RecoveryKey::parse(recovery_key)?;
        let doc = self.credentials.load().await?;

        let profile = doc
            .profiles
            .iter()
            .find(|p| p.recovery_key_hash.verify(key.as_bytes()))
            .ok_or_else(|| Error::Authentication("Recovery key does not match any profile".to_string()))?;

        let plain = unwrap_secret(&profile.master_password_encrypted_with_recovery, key.as_bytes())?;
        debug!(profile_id = %profile.id, "Recovery key accepted");
        Ok((profile.id.clone(), Password::new(secret_to_string(plain)?)))
    }

    /// Remove a profile after verifying its password.
    ///
    /// Callers must ensure no folders of the profile are still locked.
    pub async fn delete_profile(&self, profile_id: &ProfileId, password: &Password) -> Result<()> {
        if !self.verify_password(profile_id, password).await? {
            return Err(Error::Authentication("Invalid master password".to_string()));
        }
        let id = profile_id.clone();
        self.credentials
            .update(move |doc| {
                doc.profiles.retain(|p| p.id != id);
                if doc.active_profile_id.as_ref() == Some(&id) {
                    doc.active_profile_id = None;
                }
                Ok(())
            })
            .await?;
        info!(profile_id = %profile_id, "Profile deleted");
        Ok(())
    }
}
