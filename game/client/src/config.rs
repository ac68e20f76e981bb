/// Client tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint, `host:port`.
    pub server: String,
    /// Display name sent in the handshake, truncated to the 16-byte field.
    pub name: String,
    /// Resend cadence for unresolved claims. Defaults to one tick interval
    /// at the server's default snapshot rate.
    pub retransmit_interval_ms: u64,
    /// Resend attempts per claim before it is discarded unresolved.
    pub retry_cap: u32,
    /// Display interpolation window for rendering collaborators. Advisory:
    /// reconciliation never consults it.
    pub smoothing_ms: u64,
    /// Acknowledge every installed snapshot back to the server.
    pub send_acks: bool,
    /// INIT attempts before the connection counts as failed.
    pub init_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            server: "127.0.0.1:9999".to_string(),
            name: "player".to_string(),
            retransmit_interval_ms: 50,
            retry_cap: 10,
            smoothing_ms: 120,
            send_acks: false,
            init_attempts: 10,
        }
    }
}
