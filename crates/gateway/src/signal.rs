use {async_trait::async_trait, kraken_protocol::RpcError, serde_json::Value};

/// Signaling backend the RPC methods are routed to.
///
/// Each operation receives the raw positional params and is responsible for
/// validating them (see [`Params`](crate::params::Params)). Errors are shown
/// to the client verbatim.
#[async_trait]
pub trait SignalRouter: Send + Sync {
    /// Peer ids currently in a room.
    async fn list(&self, params: &[Value]) -> Result<Vec<String>, RpcError>;

    /// Publish a peer's offer; returns the negotiated answer.
    async fn publish(&self, params: &[Value]) -> Result<Value, RpcError>;

    /// Add an ICE candidate to an existing track.
    async fn trickle(&self, params: &[Value]) -> Result<(), RpcError>;

    /// Subscribe a peer to a published track; returns the negotiated answer.
    async fn subscribe(&self, params: &[Value]) -> Result<Value, RpcError>;
}
