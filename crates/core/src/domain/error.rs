// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Empty worker command")]
    EmptyCommand,
}

pub type Result<T> = std::result::Result<T, DomainError>;
