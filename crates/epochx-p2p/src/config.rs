/// Configuration for the quote gossip network.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7878").
    pub listen_addr: String,
    /// Peers dialled at startup.
    pub bootstrap_peers: Vec<String>,
    /// GossipSub topic for quotes and transaction exchange.
    pub quote_topic: String,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7878".into(),
            bootstrap_peers: Vec::new(),
            quote_topic: "epochx-proof-quotes".into(),
        }
    }
}
