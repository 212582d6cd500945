use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Queue error: {0}")]
    Queue(#[from] core_offline::QueueError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
