use super::server::{handle_register, introduction, take_pair};
use super::MAX_DATAGRAM;
use crate::session::{PeerHandle, Session};
use std::io::Result;
use std::net::SocketAddr;
use tokio::net::{ToSocketAddrs, UdpSocket};

/// Async version of [`crate::udp::Server`].
pub struct Server {
    socket: UdpSocket,
    session: Session,
}

impl Server {
    pub async fn new<A: ToSocketAddrs>(listen_addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(listen_addr).await?;

        Ok(Self {
            socket,
            session: Default::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(mut self) -> Result<(PeerHandle, PeerHandle)> {
        let mut buf = [0; MAX_DATAGRAM];

        while !self.session.is_complete() {
            let (size, addr) = self.socket.recv_from(&mut buf).await?;
            handle_register(&mut self.session, &buf[..size], addr);
        }

        let (a, b) = take_pair(self.session)?;
        self.socket.send_to(&introduction(&b), a.addr).await?;
        self.socket.send_to(&introduction(&a), b.addr).await?;
        log::info!("introduced {} {}", a.id, b.id);

        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_introduction;

    #[tokio::test]
    async fn test_async_server_skips_noise() {
        let server = Server::new("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let s = tokio::spawn(server.run());

        let c1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let c2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        c1.send_to(b"", server_addr).await.unwrap();
        c1.send_to(b"two words", server_addr).await.unwrap();
        c1.send_to(b"peer1", server_addr).await.unwrap();
        c1.send_to(b"peer1", server_addr).await.unwrap();
        c2.send_to(b"peer2", server_addr).await.unwrap();

        let (a, b) = s.await.unwrap().unwrap();
        assert_eq!((a.id.as_str(), b.id.as_str()), ("peer1", "peer2"));

        let mut buf = [0; MAX_DATAGRAM];
        let (n, _) = c2.recv_from(&mut buf).await.unwrap();
        let intro = decode_introduction(&buf[..n]).unwrap();
        assert_eq!(intro.peer_id, "peer1");
        assert_eq!(intro.port, c1.local_addr().unwrap().port());
    }
}
