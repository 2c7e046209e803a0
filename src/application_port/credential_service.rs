use crate::domain_model::{Account, AccountId, AccountView};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("username or email already exists")]
    AlreadyExists,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is not active")]
    AccountInactive,
    #[error("account not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
impl StoreError {
    /// Stable name of the error kind, independent of transport.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidArgument(_) => "InvalidArgument",
            StoreError::AlreadyExists => "AlreadyExists",
            StoreError::InvalidCredentials => "InvalidCredentials",
            StoreError::AccountInactive => "AccountInactive",
            StoreError::NotFound => "NotFound",
            StoreError::Unavailable(_) => "Unavailable",
            StoreError::Cancelled => "Cancelled",
        }
    }
}

// No Debug: these carry plaintext passwords.
#[derive(Clone)]
pub struct CreateAccountInput {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Clone)]
pub struct AuthenticateInput {
    pub username: String,
    pub password: String,
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, StoreError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
pub trait CredentialService: Send + Sync {
    async fn create_account(&self, request: CreateAccountInput) -> Result<Account, StoreError>;
    async fn authenticate(&self, request: AuthenticateInput) -> Result<Account, StoreError>;
    async fn get_account(&self, id: AccountId) -> Result<AccountView, StoreError>;
}
