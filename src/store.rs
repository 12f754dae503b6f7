pub mod dao;
pub mod models;

#[cfg(test)]
pub(crate) mod memory;

pub use dao::{FailureLogDao, PgFailureLogDao};
pub use models::{FailureLogEntry, NewFailureLog};
