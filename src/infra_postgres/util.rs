use crate::application_port::StoreError;

// SQLSTATE unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// The only place that knows Postgres error codes.
pub fn classify_db_error(err: sqlx::Error) -> StoreError {
    if is_dup_key(&err) {
        return StoreError::AlreadyExists;
    }

    StoreError::Unavailable(err.to_string())
}

fn is_dup_key(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error;

    #[derive(Debug)]
    struct CodedError(&'static str);

    impl std::fmt::Display for CodedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error with code {}", self.0)
        }
    }

    impl Error for CodedError {}

    impl DatabaseError for CodedError {
        fn message(&self) -> &str {
            "coded error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(CodedError(code)))
    }

    #[test]
    fn unique_violation_is_already_exists() {
        assert_eq!(classify_db_error(db_error("23505")), StoreError::AlreadyExists);
    }

    #[test]
    fn other_constraint_violations_are_unavailable() {
        // foreign_key_violation
        assert!(matches!(
            classify_db_error(db_error("23503")),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn non_database_errors_are_unavailable() {
        assert!(matches!(
            classify_db_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify_db_error(sqlx::Error::RowNotFound),
            StoreError::Unavailable(_)
        ));
    }
}
