use super::{
    bind_socket, choose_bind_addr, introduced_addr, pick_addr, Event, Timing, MAX_DATAGRAM,
};
use crate::codec::{
    decode_introduction, decode_punch, encode_punch, encode_register, validate_id, PunchKind,
};
use crate::session::PeerHandle;
use std::io::{Error, ErrorKind, ErrorKind::Other, Result};
use std::net::SocketAddr;
use tokio::{
    net::{lookup_host, UdpSocket},
    time::{sleep, timeout, timeout_at, Instant},
};

/// Async version of [`crate::udp::Peer`], for running each role as a tokio task.
pub struct Peer {
    socket: UdpSocket,
    server_addr: SocketAddr,
    id: String,
    timing: Timing,
}

impl Peer {
    pub async fn new(server_addr: &str, id: &str, local_addr: Option<SocketAddr>) -> Result<Self> {
        validate_id(id).map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;

        let server_addr = pick_addr(lookup_host(server_addr).await?, local_addr)
            .ok_or(Error::new(Other, "server name resolve fail"))?;

        let socket = bind_socket(choose_bind_addr(server_addr, local_addr))?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket: UdpSocket::from_std(socket)?,
            server_addr,
            id: id.into(),
            timing: Default::default(),
        })
    }

    pub fn with_timing(mut self, timing: Timing) -> Result<Self> {
        timing.check()?;
        self.timing = timing;
        Ok(self)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run<F: FnMut(Event)>(self, mut on_event: F) -> Result<PeerHandle> {
        self.register().await?;
        let partner = self.await_introduction().await?;
        on_event(Event::Learned(partner.clone()));

        self.punch(&partner).await?;
        self.listen(&mut on_event).await?;

        Ok(partner)
    }

    pub async fn register(&self) -> Result<()> {
        log::debug!("register {} with {}", self.id, self.server_addr);
        self.socket
            .send_to(&encode_register(&self.id), self.server_addr)
            .await?;
        Ok(())
    }

    pub async fn await_introduction(&self) -> Result<PeerHandle> {
        let deadline = Instant::now() + self.timing.introduction_timeout;
        let mut buf = [0; MAX_DATAGRAM];

        loop {
            let (n, addr) = timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| Error::new(ErrorKind::TimedOut, "no introduction"))??;

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

    pub async fn punch(&self, partner: &PeerHandle) -> Result<()> {
        let ping = encode_punch(PunchKind::Ping, &self.id);

        for _ in 0..self.timing.punch_count {
            self.socket.send_to(&ping, partner.addr).await?;
            sleep(self.timing.punch_interval).await;
        }

        Ok(())
    }

    pub async fn listen<F: FnMut(Event)>(&self, mut on_event: F) -> Result<()> {
        let ack = encode_punch(PunchKind::Ack, &self.id);
        let mut buf = [0; MAX_DATAGRAM];

        loop {
            let (n, addr) =
                match timeout(self.timing.listen_timeout, self.socket.recv_from(&mut buf)).await {
                    Ok(r) => r?,
                    Err(_) => {
                        log::debug!("{} idle, stop listening", self.id);
                        return Ok(());
                    }
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
                self.socket.send_to(&ack, addr).await?;
            }
        }
    }
}
