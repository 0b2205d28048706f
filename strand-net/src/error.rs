use strand_kernel::InstanceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    #[error("Connection error: {0}")]
    Connection(String),
}
