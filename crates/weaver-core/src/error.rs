use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("process '{0}' not found")]
    NotFound(String),

    #[error("process '{0}' already exists")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
