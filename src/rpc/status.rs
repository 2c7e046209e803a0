use crate::application_port::StoreError;
use crate::logger::*;
use tonic::Status;

/// Maps a domain error to its gRPC status. Messages are fixed per kind;
/// store details only go to the log.
pub fn status_from_error(error: StoreError) -> Status {
    match error {
        StoreError::InvalidArgument(reason) => Status::invalid_argument(reason),
        StoreError::AlreadyExists => Status::already_exists("username or email already exists"),
        StoreError::InvalidCredentials => Status::unauthenticated("invalid username or password"),
        StoreError::AccountInactive => Status::permission_denied("account is not active"),
        StoreError::NotFound => Status::not_found("account not found"),
        StoreError::Unavailable(detail) => {
            warn!(%detail, "store unavailable");
            Status::internal("internal error")
        }
        StoreError::Cancelled => Status::cancelled("request cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn error_kind_from_code(code: Code) -> &'static str {
        match code {
            Code::InvalidArgument => "InvalidArgument",
            Code::AlreadyExists => "AlreadyExists",
            Code::Unauthenticated => "InvalidCredentials",
            Code::PermissionDenied => "AccountInactive",
            Code::NotFound => "NotFound",
            Code::Cancelled | Code::DeadlineExceeded => "Cancelled",
            _ => "Unavailable",
        }
    }

    #[test]
    fn every_kind_round_trips_through_its_code() {
        let errors = [
            StoreError::InvalidArgument("email is empty".to_string()),
            StoreError::AlreadyExists,
            StoreError::InvalidCredentials,
            StoreError::AccountInactive,
            StoreError::NotFound,
            StoreError::Unavailable("connection refused".to_string()),
            StoreError::Cancelled,
        ];

        for error in errors {
            let kind = error.kind();
            let status = status_from_error(error);
            assert_eq!(error_kind_from_code(status.code()), kind);
        }
    }

    #[test]
    fn unavailable_does_not_leak_store_text() {
        let status = status_from_error(StoreError::Unavailable(
            "password authentication failed for user \"guest\"".to_string(),
        ));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "internal error");
    }
}
