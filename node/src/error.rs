use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] itemnet_store::StoreError),

    #[error("network error: {0}")]
    Network(#[from] itemnet_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] itemnet_protocol::ProtocolError),

    #[error("consensus error: {0}")]
    Consensus(#[from] itemnet_consensus::ConsensusError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node is shutting down")]
    ShuttingDown,
}
