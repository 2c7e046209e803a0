use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{AccountRepo, NewAccountRecord};
use crate::logger::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

// Verified against when the username is unknown, so that path costs the same
// as a wrong password.
const DUMMY_PASSWORD: &str = "warden-dummy-password";

#[derive(Debug, Clone, Copy)]
pub struct CredentialServiceConfig {
    /// Deadline for each call into the account repo.
    pub request_timeout: Duration,
}

impl Default for CredentialServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RealCredentialService {
    account_repo: Arc<dyn AccountRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    config: CredentialServiceConfig,
    dummy_hash: OnceCell<String>,
}

impl RealCredentialService {
    pub fn new(
        account_repo: Arc<dyn AccountRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        config: CredentialServiceConfig,
    ) -> Self {
        Self {
            account_repo,
            credential_hasher,
            config,
            dummy_hash: OnceCell::new(),
        }
    }

    fn validate_create(request: &CreateAccountInput) -> Result<(), StoreError> {
        if request.username.is_empty() {
            return Err(StoreError::InvalidArgument("username is empty".to_string()));
        }
        if request.password.is_empty() {
            return Err(StoreError::InvalidArgument("password is empty".to_string()));
        }
        if request.email.is_empty() {
            return Err(StoreError::InvalidArgument("email is empty".to_string()));
        }
        Ok(())
    }

    /// Drops the repo future when the deadline passes, which cancels the
    /// underlying query.
    async fn with_deadline<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        tokio::time::timeout(self.config.request_timeout, op)
            .await
            .map_err(|_| StoreError::Cancelled)?
    }

    async fn burn_verification(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.credential_hasher.hash_password(DUMMY_PASSWORD))
            .await;
        if let Ok(dummy) = dummy {
            let _ = self
                .credential_hasher
                .verify_password(password, dummy)
                .await;
        }
    }
}

#[async_trait::async_trait]
impl CredentialService for RealCredentialService {
    async fn create_account(&self, request: CreateAccountInput) -> Result<Account, StoreError> {
        Self::validate_create(&request)?;
        let CreateAccountInput {
            username,
            password,
            email,
        } = request;

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let record = NewAccountRecord {
            username,
            password_hash,
            email,
        };

        let account = self
            .with_deadline(self.account_repo.insert(record))
            .await
            .inspect_err(|e| match e {
                StoreError::AlreadyExists => debug!("create rejected: duplicate username or email"),
                other => warn!(error = %other, "create failed"),
            })?;

        info!(id = %account.id, username = %account.username, "account created");
        Ok(account)
    }

    async fn authenticate(&self, request: AuthenticateInput) -> Result<Account, StoreError> {
        let AuthenticateInput { username, password } = request;

        let account = match self
            .with_deadline(self.account_repo.get_by_username(&username))
            .await?
        {
            Some(account) => account,
            None => {
                self.burn_verification(&password).await;
                debug!("authentication rejected");
                return Err(StoreError::InvalidCredentials);
            }
        };

        let ok = self
            .credential_hasher
            .verify_password(&password, &account.password_hash)
            .await?;
        if !ok {
            debug!("authentication rejected");
            return Err(StoreError::InvalidCredentials);
        }

        // Only after a verified match, so a disabled account is not revealed
        // to someone without the password.
        if !account.is_active {
            debug!(id = %account.id, "authentication rejected: account inactive");
            return Err(StoreError::AccountInactive);
        }

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<AccountView, StoreError> {
        self.with_deadline(self.account_repo.get_view_by_id(id))
            .await?
            .ok_or(StoreError::NotFound)
    }
}
