use thiserror::Error;

/// Failures raised by the shared readiness state.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The component owning a readiness flag went away while someone waited on it.
    #[error("{capability} readiness owner dropped")]
    OwnerGone { capability: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
