use crate::application_port::*;
use crate::domain_model::*;

#[derive(Debug, Clone)]
pub struct NewAccountRecord {
    pub username: String,
    pub password_hash: String,
    pub email: String,
}

#[async_trait::async_trait]
pub trait AccountRepo: Send + Sync {
    /// Insert one row and return it as stored. Uniqueness of `username` and
    /// `email` is enforced by the backend and reported as `AlreadyExists`.
    async fn insert(&self, record: NewAccountRecord) -> Result<Account, StoreError>;

    /// Fetch the full record, hash included (for login).
    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Fetch the record without its hash.
    async fn get_view_by_id(&self, id: AccountId) -> Result<Option<AccountView>, StoreError>;

    /// Release backend resources. Called once during shutdown.
    async fn close(&self) {}
}
