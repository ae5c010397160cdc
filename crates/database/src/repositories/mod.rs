pub mod limit_record;
pub mod limit_repository_impl;
pub mod principal;
pub mod retry;
pub mod utils;

pub use limit_record::PgLimitRepository;
pub use principal::PgPrincipalRepository;
