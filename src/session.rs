use std::net::SocketAddr;

/// A registered peer, as observed by the rendezvous server.
///
/// `addr` is the datagram source address the server saw, which is the NAT-mapped
/// address rather than whatever the peer believes its own address to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHandle {
    pub id: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// first registration under this id
    Added,
    /// id already known, its address was replaced
    Updated,
    /// session already holds two distinct ids
    Ignored,
}

/// Registry for one pairing: at most two distinct ids, kept in arrival order.
#[derive(Debug, Default)]
pub struct Session {
    peers: Vec<PeerHandle>,
}

impl Session {
    pub const CAPACITY: usize = 2;

    pub fn new() -> Self {
        Default::default()
    }

    /// Record `id` at `addr`. A repeated id overwrites the stored address and keeps
    /// its original arrival position.
    pub fn register(&mut self, id: String, addr: SocketAddr) -> Registration {
        if let Some(p) = self.peers.iter_mut().find(|p| p.id == id) {
            if p.addr != addr {
                log::debug!("updating peer {} {} -> {}", id, p.addr, addr);
            }
            p.addr = addr;
            return Registration::Updated;
        }

        if self.is_complete() {
            log::debug!("session full, ignoring {}", id);
            return Registration::Ignored;
        }

        self.peers.push(PeerHandle { id, addr });
        Registration::Added
    }

    pub fn is_complete(&self) -> bool {
        self.peers.len() >= Self::CAPACITY
    }

    /// The first two distinct ids in arrival order, once both are present.
    pub fn into_pair(self) -> Option<(PeerHandle, PeerHandle)> {
        let mut it = self.peers.into_iter();
        match (it.next(), it.next()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }
}
