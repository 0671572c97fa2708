use super::MAX_DATAGRAM;
use crate::codec::{decode_register, encode_introduction};
use crate::session::{PeerHandle, Registration, Session};
use std::io::{Error, ErrorKind::Other, Result};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Udp rendezvous server
///
/// wait for two distinct peers to register, tell each the other's observed address, then
/// stop. One pairing per server.
pub struct Server {
    socket: UdpSocket,
    session: Session,
}

impl Server {
    pub fn new<A: ToSocketAddrs>(listen_addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(listen_addr)?;

        Ok(Self {
            socket,
            session: Default::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// serve registrations until two distinct ids are known, introduce them, and return
    /// the pair in arrival order. The socket is closed on return.
    pub fn run(mut self) -> Result<(PeerHandle, PeerHandle)> {
        let mut buf = [0; MAX_DATAGRAM];

        while !self.session.is_complete() {
            let (size, addr) = self.socket.recv_from(&mut buf)?;
            handle_register(&mut self.session, &buf[..size], addr);
        }

        let (a, b) = take_pair(self.session)?;
        self.socket.send_to(&introduction(&b), a.addr)?;
        self.socket.send_to(&introduction(&a), b.addr)?;
        log::info!("introduced {} {}", a.id, b.id);

        Ok((a, b))
    }
}

pub(crate) fn handle_register(session: &mut Session, buf: &[u8], addr: SocketAddr) {
    let id = match decode_register(buf) {
        Ok(id) => id,
        Err(e) => {
            log::debug!("bad registration from {}: {}", addr, e);
            return;
        }
    };

    log::info!("got {} from {}", id, addr);
    if session.register(id, addr) == Registration::Ignored {
        log::debug!("session complete, dropped registration from {}", addr);
    }
}

pub(crate) fn take_pair(session: Session) -> Result<(PeerHandle, PeerHandle)> {
    session
        .into_pair()
        .ok_or_else(|| Error::new(Other, "session incomplete"))
}

/// introduction describing `other`, as seen from our side of any NAT
pub(crate) fn introduction(other: &PeerHandle) -> Vec<u8> {
    encode_introduction(&other.id, &other.addr.ip().to_string(), other.addr.port())
}
