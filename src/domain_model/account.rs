use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(AccountId)
    }
}

/// Full account row, hash included. Only the credential service sees this.
#[derive(Clone)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Account {
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_active: self.is_active,
        }
    }

    pub fn into_view(self) -> AccountView {
        AccountView {
            id: self.id,
            username: self.username,
            email: self.email,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_active: self.is_active,
        }
    }
}

// The hash stays out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Account projection without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_password_hash() {
        let now = Utc::now();
        let account = Account {
            id: AccountId(7),
            username: "alice".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            email: "a@x.com".to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        };

        let printed = format!("{:?}", account);
        assert!(!printed.contains("$argon2id$"));
        assert!(printed.contains("<redacted>"));
        assert_eq!(account.view().id, AccountId(7));
    }

    #[test]
    fn account_id_parses_from_decimal() {
        assert_eq!("42".parse::<AccountId>().unwrap(), AccountId(42));
        assert!("forty-two".parse::<AccountId>().is_err());
    }
}
