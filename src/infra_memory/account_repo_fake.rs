use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// In-memory account store with the same uniqueness rules as the `accounts`
/// table. Ids start at 1.
#[derive(Debug)]
pub struct FakeAccountRepo {
    accounts: DashMap<AccountId, Account>,
    by_username: DashMap<String, AccountId>,
    by_email: DashMap<String, AccountId>,
    next_id: AtomicI64,
    available: AtomicBool,
}

impl FakeAccountRepo {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            by_username: DashMap::new(),
            by_email: DashMap::new(),
            next_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the database going away: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Administrative toggle; there is no service operation for this.
    pub fn set_active(&self, id: AccountId, is_active: bool) -> Result<(), StoreError> {
        let mut account = self.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.is_active = is_active;
        account.updated_at = Utc::now();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("fake store is down".to_string()))
        }
    }
}

impl Default for FakeAccountRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AccountRepo for FakeAccountRepo {
    async fn insert(&self, record: NewAccountRecord) -> Result<Account, StoreError> {
        self.check_available()?;

        // Locks are always taken username first, then email.
        let username_slot = match self.by_username.entry(record.username.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => slot,
        };
        let email_slot = match self.by_email.entry(record.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => slot,
        };

        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let account = Account {
            id,
            username: record.username,
            password_hash: record.password_hash,
            email: record.email,
            created_at: now,
            updated_at: now,
            is_active: true,
        };

        self.accounts.insert(id, account.clone());
        email_slot.insert(id);
        username_slot.insert(id);

        Ok(account)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        self.check_available()?;

        let id = match self.by_username.get(username) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.accounts.get(&id).map(|account| account.clone()))
    }

    async fn get_view_by_id(&self, id: AccountId) -> Result<Option<AccountView>, StoreError> {
        self.check_available()?;

        Ok(self.accounts.get(&id).map(|account| account.view()))
    }
}
