mod account_repo_postgres;

pub use account_repo_postgres::*;

mod util;

pub use util::classify_db_error;
