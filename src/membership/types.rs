use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Peer reachable over the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HttpPeer {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

impl HttpPeer {
    pub fn new(id: &str, host: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            port,
            protocol: "http".to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl FromStr for HttpPeer {
    type Err = String;

    /// Accepts `[id@][protocol://]host:port`. The id defaults to `host:port`
    /// and the protocol to `http`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, rest) = match s.split_once('@') {
            Some((id, rest)) if !id.is_empty() => (Some(id), rest),
            Some(_) => return Err(format!("empty peer id in '{}'", s)),
            None => (None, s),
        };

        let (protocol, addr) = match rest.split_once("://") {
            Some((protocol, addr)) => (protocol, addr),
            None => ("http", rest),
        };

        if protocol != "http" && protocol != "https" {
            return Err(format!("unsupported protocol '{}' in '{}'", protocol, s));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in '{}'", s))?;

        if host.is_empty() {
            return Err(format!("missing host in '{}'", s));
        }

        let port: u16 = port
            .parse()
            .map_err(|e| format!("invalid port in '{}': {}", s, e))?;

        Ok(Self {
            id: id.map(str::to_string).unwrap_or_else(|| addr.to_string()),
            host: host.to_string(),
            port,
            protocol: protocol.to_string(),
        })
    }
}

/// Identity of a group member.
///
/// The detector only relies on equality and hashing; the variant carries
/// whatever addressing its transport needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Peer {
    Http(HttpPeer),
}

impl Peer {
    pub fn id(&self) -> &str {
        match self {
            Peer::Http(peer) => &peer.id,
        }
    }
}

impl From<HttpPeer> for Peer {
    fn from(peer: HttpPeer) -> Self {
        Peer::Http(peer)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Http(peer) => write!(f, "{}@{}", peer.id, peer.base_url()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PeerState {
    Alive,
    Suspect,
    Dead,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "Alive"),
            Self::Suspect => write!(f, "Suspect"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

impl PeerState {
    /// Tie-break rank for equal incarnations: Dead > Suspect > Alive.
    pub fn rank(self) -> u8 {
        match self {
            Self::Alive => 0,
            Self::Suspect => 1,
            Self::Dead => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Alive,
    Suspect,
    Dead,
}

impl From<UpdateType> for PeerState {
    fn from(update_type: UpdateType) -> Self {
        match update_type {
            UpdateType::Alive => PeerState::Alive,
            UpdateType::Suspect => PeerState::Suspect,
            UpdateType::Dead => PeerState::Dead,
        }
    }
}

/// The gossip unit piggybacked on every request and response.
///
/// `seq_num` orders events within the stream of the node that originated
/// them; `incarnation` is the subject peer's own generation counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateEvent {
    pub peer: Peer,
    pub update_type: UpdateType,
    #[serde(default)]
    pub incarnation: u64,
    pub seq_num: u64,
}

impl UpdateEvent {
    pub fn new(peer: Peer, update_type: UpdateType, incarnation: u64, seq_num: u64) -> Self {
        Self {
            peer,
            update_type,
            incarnation,
            seq_num,
        }
    }

    /// Merge order key: higher incarnation wins, state rank breaks ties.
    pub fn precedence(&self) -> (u64, u8) {
        (self.incarnation, PeerState::from(self.update_type).rank())
    }
}

/// Local knowledge about one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    pub peer: Peer,
    pub state: PeerState,
    pub incarnation: u64,
    pub last_seq_num: u64,
    pub last_state_change: Instant,
    pub last_seen: Option<Instant>,
    /// Bumped on every entry into Suspect; suspicion timers carry it.
    pub suspicion_episode: u64,
}

impl MembershipRecord {
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            state: PeerState::Alive,
            incarnation: 0,
            last_seq_num: 0,
            last_state_change: Instant::now(),
            last_seen: None,
            suspicion_episode: 0,
        }
    }

    pub fn precedence(&self) -> (u64, u8) {
        (self.incarnation, self.state.rank())
    }
}
