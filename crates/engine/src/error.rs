use tabkeeper_protocol::HostError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Engine loop is not running: {0}")]
    ChannelClosed(String),

    #[error("{0}")]
    Other(String),
}
