use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("node {0} is unreachable")]
    Unreachable(String),

    #[error("node number {0} is not in the topology")]
    UnknownNode(u32),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("transport closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(#[from] itemnet_protocol::ProtocolError),
}
