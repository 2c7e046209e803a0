mod account_repo_fake;

pub use account_repo_fake::*;
