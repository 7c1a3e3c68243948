use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connect(String),

    #[error("bus publish error: {0}")]
    Publish(String),

    #[error("bus fetch error: {0}")]
    Fetch(String),

    #[error("bus ack error: {0}")]
    Ack(String),

    #[error("worker status kv error: {0}")]
    Kv(String),

    #[error("queue introspection error: {0}")]
    QueueInfo(String),

    #[error("malformed payload: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type BusResult<T> = std::result::Result<T, BusError>;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("job is missing required field: {0}")]
    MissingField(&'static str),

    #[error("job precondition failed: {0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;
