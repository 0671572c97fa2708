//! UDP roles.
//!
//! use `Server` to run a one-shot rendezvous server for two peers.
//!
//! use `Peer` to register, learn the partner address, punch and listen.
//!
//! With the `async` feature, `AsyncServer` and `AsyncPeer` run the same protocol on tokio.

use crate::codec::Punch;
use crate::session::PeerHandle;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

#[cfg(feature = "peer")]
mod peer;
#[cfg(feature = "peer")]
pub use peer::Peer;

#[cfg(feature = "server")]
mod server;
#[cfg(feature = "server")]
pub use server::Server;

#[cfg(all(feature = "peer", feature = "async"))]
mod peer_async;
#[cfg(all(feature = "peer", feature = "async"))]
pub use peer_async::Peer as AsyncPeer;

#[cfg(all(feature = "server", feature = "async"))]
mod server_async;
#[cfg(all(feature = "server", feature = "async"))]
pub use server_async::Server as AsyncServer;

pub(crate) const MAX_DATAGRAM: usize = 1500;

/// Peer timing knobs.
///
/// Both timeouts must be non-zero, see [`Timing::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// pings sent to the partner regardless of any reply
    pub punch_count: u32,
    /// delay after each ping
    pub punch_interval: Duration,
    /// listening ends once this long passes without a datagram
    pub listen_timeout: Duration,
    /// deadline for the server's introduction after registering
    pub introduction_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            punch_count: 3,
            punch_interval: Duration::from_millis(500),
            listen_timeout: Duration::from_secs(5),
            introduction_timeout: Duration::from_secs(10),
        }
    }
}

impl Timing {
    /// reject zero timeouts, a zero listen window would never observe the partner.
    pub fn check(&self) -> std::io::Result<()> {
        let zero = if self.listen_timeout.is_zero() {
            "listen_timeout"
        } else if self.introduction_timeout.is_zero() {
            "introduction_timeout"
        } else {
            return Ok(());
        };

        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} must be non-zero", zero),
        ))
    }
}

/// Things a peer observes while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// introduction received from the rendezvous server
    Learned(PeerHandle),
    /// punch datagram received while listening
    Received { punch: Punch, from: SocketAddr },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Learned(p) => write!(f, "learned {} at {}", p.id, p.addr),
            Event::Received { punch, from } => write!(f, "got \"{}\" from {}", punch, from),
        }
    }
}

#[cfg(feature = "peer")]
pub(crate) use sock::*;

#[cfg(feature = "peer")]
mod sock {
    use crate::codec::Introduction;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::io::{Error, ErrorKind, ErrorKind::Other, Result};
    use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

    /// with no explicit local address, bind the wildcard of the server's family.
    pub fn choose_bind_addr(server_addr: SocketAddr, local_addr: Option<SocketAddr>) -> SocketAddr {
        match local_addr {
            Some(addr) => addr,
            None => match server_addr {
                SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
                SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
            },
        }
    }

    pub fn bind_socket(local_addr: SocketAddr) -> Result<UdpSocket> {
        let socket = Socket::new(
            Domain::for_address(local_addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&local_addr.into())?;

        Ok(socket.into())
    }

    /// pick a server address: the family of `local_addr` when given, else IPv4 first.
    pub fn pick_addr<I>(addrs: I, local_addr: Option<SocketAddr>) -> Option<SocketAddr>
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
        let want_v4 = local_addr.map_or(true, |a| a.is_ipv4());

        addrs
            .iter()
            .find(|a| a.is_ipv4() == want_v4)
            .or_else(|| addrs.first())
            .copied()
    }

    pub fn resolve<A: ToSocketAddrs>(
        addr: A,
        local_addr: Option<SocketAddr>,
    ) -> Result<SocketAddr> {
        pick_addr(addr.to_socket_addrs()?, local_addr)
            .ok_or_else(|| Error::new(Other, "no addr"))
    }

    pub fn introduced_addr(intro: &Introduction) -> Result<SocketAddr> {
        match intro.host.parse::<std::net::IpAddr>() {
            Ok(ip) => Ok((ip, intro.port).into()),
            Err(_) => resolve((intro.host.as_str(), intro.port), None),
        }
    }

    /// read timeouts surface as WouldBlock on unix and TimedOut on windows
    pub fn is_timeout(e: &Error) -> bool {
        matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
    }
}

#[cfg(all(test, feature = "peer", feature = "server"))]
mod tests {
    use super::*;
    use crate::codec::PunchKind;
    use std::thread;

    fn fast() -> Timing {
        Timing {
            punch_count: 3,
            punch_interval: Duration::from_millis(20),
            listen_timeout: Duration::from_millis(500),
            introduction_timeout: Duration::from_secs(5),
        }
    }

    fn spawn_peer(server_addr: SocketAddr, id: &'static str) -> thread::JoinHandle<Vec<Event>> {
        thread::spawn(move || {
            let peer = Peer::new(&server_addr.to_string(), id, None)
                .unwrap()
                .with_timing(fast())
                .unwrap();
            let mut events = vec![];
            peer.run(|e| events.push(e)).unwrap();
            events
        })
    }

    fn acked_by(events: &[Event], id: &str) -> bool {
        events.iter().any(|e| {
            matches!(e, Event::Received { punch, .. }
                if punch.kind == PunchKind::Ack && punch.sender == id)
        })
    }

    #[test]
    fn test_two_peers_punch() {
        let server = Server::new("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        let s = thread::spawn(move || server.run().unwrap());

        let p1 = spawn_peer(server_addr, "peer1");
        let p2 = spawn_peer(server_addr, "peer2");

        let (a, b) = s.join().unwrap();
        let mut ids = vec![a.id, b.id];
        ids.sort();
        assert_eq!(ids, ["peer1", "peer2"]);

        let out1 = p1.join().unwrap();
        let out2 = p2.join().unwrap();

        assert!(matches!(&out1[0], Event::Learned(p) if p.id == "peer2"));
        assert!(matches!(&out2[0], Event::Learned(p) if p.id == "peer1"));
        assert!(acked_by(&out1, "peer2"));
        assert!(acked_by(&out2, "peer1"));
    }

    #[test]
    fn test_pick_addr_prefers_ipv4() {
        let v6: SocketAddr = "[::1]:9999".parse().unwrap();
        let v4: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(pick_addr(vec![v6, v4], None), Some(v4));
        assert_eq!(pick_addr(vec![v6], None), Some(v6));
        assert_eq!(pick_addr(vec![], None), None);

        let local_v6: SocketAddr = "[::]:0".parse().unwrap();
        assert_eq!(pick_addr(vec![v4, v6], Some(local_v6)), Some(v6));
    }

    #[test]
    fn test_resolve_literals() {
        assert_eq!(
            resolve("127.0.0.1:9999", None).unwrap(),
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve("[::1]:9999", None).unwrap(),
            "[::1]:9999".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_timing_check() {
        assert!(Timing::default().check().is_ok());

        let zero_listen = Timing {
            listen_timeout: Duration::ZERO,
            ..Timing::default()
        };
        assert_eq!(
            zero_listen.check().unwrap_err().kind(),
            std::io::ErrorKind::InvalidInput
        );

        let zero_intro = Timing {
            introduction_timeout: Duration::ZERO,
            ..Timing::default()
        };
        assert!(zero_intro.check().is_err());

        let no_punch = Timing {
            punch_count: 0,
            punch_interval: Duration::ZERO,
            ..Timing::default()
        };
        assert!(no_punch.check().is_ok());
    }

    #[test]
    fn test_event_display() {
        let learned = Event::Learned(PeerHandle {
            id: "peer2".into(),
            addr: "127.0.0.1:5000".parse().unwrap(),
        });
        assert_eq!(learned.to_string(), "learned peer2 at 127.0.0.1:5000");

        let received = Event::Received {
            punch: Punch {
                kind: PunchKind::Ack,
                sender: "peer2".into(),
            },
            from: "127.0.0.1:5000".parse().unwrap(),
        };
        assert_eq!(
            received.to_string(),
            "got \"ack from peer2\" from 127.0.0.1:5000"
        );
    }
}
