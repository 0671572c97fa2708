use super::{
    bind_socket, choose_bind_addr, introduced_addr, is_timeout, resolve, Event, Timing,
    MAX_DATAGRAM,
};
use crate::codec::{
    decode_introduction, decode_punch, encode_punch, encode_register, validate_id, PunchKind,
};
use crate::session::PeerHandle;
use std::io::{Error, ErrorKind, Result};
use std::net::{SocketAddr, UdpSocket};
use std::thread::sleep;
use std::time::Instant;

/// Udp hole punching peer
///
/// # example
/// ```no_run
/// use natpunch::udp::Peer;
///
/// let p = Peer::new("rendezvous:9999", "peer1", None).unwrap();
/// let partner = p.run(|event| println!("{}", event)).unwrap();
/// ```
pub struct Peer {
    socket: UdpSocket,
    server_addr: SocketAddr,
    id: String,
    timing: Timing,
}

impl Peer {
    /// set rendezvous server, peer identity, local bind address.
    /// if no local address set, choose according server address type(ipv4 or ipv6).
    pub fn new(server_addr: &str, id: &str, local_addr: Option<SocketAddr>) -> Result<Self> {
        validate_id(id).map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;

        let server_addr = resolve(server_addr, local_addr)?;
        let socket = bind_socket(choose_bind_addr(server_addr, local_addr))?;

        Ok(Self {
            socket,
            server_addr,
            id: id.into(),
            timing: Default::default(),
        })
    }

    /// replace the default timing, zero timeouts are rejected with `InvalidInput`.
    pub fn with_timing(mut self, timing: Timing) -> Result<Self> {
        timing.check()?;
        self.timing = timing;
        Ok(self)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// register, wait for the introduction, punch, then listen until idle.
    ///
    /// the socket is closed on return.
    pub fn run<F: FnMut(Event)>(self, mut on_event: F) -> Result<PeerHandle> {
        self.register()?;
        let partner = self.await_introduction()?;
        on_event(Event::Learned(partner.clone()));

        self.punch(&partner)?;
        self.listen(&mut on_event)?;

        Ok(partner)
    }

    pub fn register(&self) -> Result<()> {
        log::debug!("register {} with {}", self.id, self.server_addr);
        self.socket
            .send_to(&encode_register(&self.id), self.server_addr)?;
        Ok(())
    }

    /// wait for the server to name our partner.
    ///
    /// anything that is not an introduction is dropped. Fails with `TimedOut` once
    /// `Timing::introduction_timeout` passes.
    pub fn await_introduction(&self) -> Result<PeerHandle> {
        let deadline = Instant::now() + self.timing.introduction_timeout;
        let mut buf = [0; MAX_DATAGRAM];

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(Error::new(ErrorKind::TimedOut, "no introduction"));
            }
            self.socket.set_read_timeout(Some(left))?;

            let (n, addr) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            };

            let intro = match decode_introduction(&buf[..n]) {
                Ok(intro) => intro,
                Err(e) => {
                    log::debug!("unexpected datagram from {}: {}", addr, e);
                    continue;
                }
            };

            match introduced_addr(&intro) {
                Ok(addr) => {
                    return Ok(PeerHandle {
                        id: intro.peer_id,
                        addr,
                    })
                }
                Err(e) => log::debug!("invalid introduction host {}: {}", intro.host, e),
            }
        }
    }

    /// send the ping burst, opening our side of the NAT toward `partner`.
    pub fn punch(&self, partner: &PeerHandle) -> Result<()> {
        let ping = encode_punch(PunchKind::Ping, &self.id);

        for _ in 0..self.timing.punch_count {
            self.socket.send_to(&ping, partner.addr)?;
            sleep(self.timing.punch_interval);
        }

        Ok(())
    }

    /// answer pings with acks until `Timing::listen_timeout` passes with no traffic.
    pub fn listen<F: FnMut(Event)>(&self, mut on_event: F) -> Result<()> {
        self.socket
            .set_read_timeout(Some(self.timing.listen_timeout))?;

        let ack = encode_punch(PunchKind::Ack, &self.id);
        let mut buf = [0; MAX_DATAGRAM];

        loop {
            let (n, addr) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if is_timeout(&e) => {
                    log::debug!("{} idle, stop listening", self.id);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let punch = match decode_punch(&buf[..n]) {
                Ok(punch) => punch,
                Err(e) => {
                    log::trace!("drop datagram from {}: {}", addr, e);
                    continue;
                }
            };

            let kind = punch.kind;
            on_event(Event::Received { punch, from: addr });

            if kind == PunchKind::Ping {
                self.socket.send_to(&ack, addr)?;
            }
        }
    }
}
