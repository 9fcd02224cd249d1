use std::time::Duration;

use epochx_core::error::ProverError;
use futures::StreamExt;
use libp2p::{gossipsub, noise, swarm::SwarmEvent, tcp, yamux, Multiaddr, PeerId, Swarm};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::message::{Outbound, P2pMessage};

const CHANNEL_CAPACITY: usize = 256;
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(NetworkBehaviour)]
pub struct QuoteGossip {
    pub gossipsub: gossipsub::Behaviour,
}

/// The application side of a running `P2pNetwork`.
pub struct P2pHandle {
    pub outbound_tx: mpsc::Sender<Outbound>,
    /// Every decodable message seen on the topic, from any peer.
    pub inbound_rx: mpsc::Receiver<P2pMessage>,
    pub local_peer_id: PeerId,
}

/// One gossip topic over TCP/noise/yamux. Spawn `run()` to drive it.
pub struct P2pNetwork {
    swarm: Swarm<QuoteGossip>,
    topic: gossipsub::IdentTopic,
    outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<P2pMessage>,
}

fn transport<E: std::fmt::Display>(e: E) -> ProverError {
    ProverError::Transport(e.to_string())
}

fn gossip(key: &libp2p::identity::Keypair) -> Result<QuoteGossip, String> {
    // Identical payloads share a message id, so a re-broadcast quote is
    // deduplicated by the mesh.
    let config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(1))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(|msg: &gossipsub::Message| {
            gossipsub::MessageId::from(blake3::hash(&msg.data).to_hex().to_string())
        })
        .build()
        .map_err(|e| e.to_string())?;
    let gossipsub =
        gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(key.clone()), config)?;
    Ok(QuoteGossip { gossipsub })
}

impl P2pNetwork {
    pub fn new(config: &P2pConfig) -> Result<(Self, P2pHandle), ProverError> {
        let topic = gossipsub::IdentTopic::new(&config.quote_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
            .map_err(transport)?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                gossip(key).map_err(Box::<dyn std::error::Error + Send + Sync>::from)
            })
            .map_err(transport)?
            .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic).map_err(transport)?;
        let listen: Multiaddr = config.listen_addr.parse().map_err(transport)?;
        swarm.listen_on(listen).map_err(transport)?;

        for peer in &config.bootstrap_peers {
            match peer.parse::<Multiaddr>() {
                Ok(addr) => {
                    if let Err(e) = swarm.dial(addr.clone()) {
                        warn!(addr = %addr, error = %e, "bootstrap dial failed");
                    }
                }
                Err(e) => warn!(addr = %peer, error = %e, "invalid bootstrap address"),
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok((
            Self { swarm, topic, outbound_rx, inbound_tx },
            P2pHandle { outbound_tx, inbound_rx, local_peer_id },
        ))
    }

    fn publish(&mut self, message: &P2pMessage) -> Result<(), ProverError> {
        let data = message.to_bytes()?;
        self.swarm
            .behaviour_mut()
            .gossipsub
            .publish(self.topic.clone(), data)
            .map(|_| ())
            .map_err(|e| ProverError::Publish(e.to_string()))
    }

    /// Returns once every `outbound_tx` clone has been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                outbound = self.outbound_rx.recv() => {
                    let Some(Outbound { message, ack }) = outbound else {
                        info!("outbound channel closed, stopping gossip");
                        break;
                    };
                    let result = self.publish(&message);
                    if let Err(e) = &result {
                        warn!(error = %e, "gossip publish failed");
                    }
                    let _ = ack.send(result);
                }
                event = self.swarm.select_next_some() => match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!(addr = %address, "gossip listening");
                    }
                    SwarmEvent::Behaviour(QuoteGossipEvent::Gossipsub(
                        gossipsub::Event::Message { message, .. },
                    )) => match P2pMessage::from_bytes(&message.data) {
                        Ok(msg) => {
                            if self.inbound_tx.send(msg).await.is_err() {
                                debug!("inbound receiver dropped");
                            }
                        }
                        Err(e) => debug!(error = %e, "undecodable gossip message"),
                    },
                    SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                        debug!(peer = %peer_id, "peer connected");
                    }
                    _ => {}
                },
            }
        }
    }
}
