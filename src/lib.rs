//!A two-peer rendezvous protocol for UDP hole punching.
//!
//!A peer behind a NAT or firewall only accepts traffic from addresses it has already sent
//!traffic to. Two such peers can still talk directly if each sends the other a packet first.
//!
//!## How it works
//!A publicly reachable rendezvous server waits for exactly two peers to register by id.
//!It records the source address each registration arrived from, which is the address the
//!peer's NAT mapped it to, and sends each peer the other's id and observed address.
//!Then it exits.
//!
//!Each peer sends a short burst of `ping` datagrams to its partner from the same socket it
//!registered with. This opens the peer's own NAT mapping toward the partner, so the
//!partner's pings get through. Every received `ping` is answered with an `ack`, and a peer
//!stops once it has heard nothing for a while.
//!
//!The wire format is plain text, one message per datagram, see [`codec`].
//!
//!## Feature flags
//!- `server`: rendezvous server
//!- `peer`: peer agent
//!- `async`: tokio versions of both, [`udp::AsyncServer`] and [`udp::AsyncPeer`]

pub mod codec;
pub mod session;
pub mod udp;

/// Port the rendezvous server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9999;
