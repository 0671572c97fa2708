use natpunch::udp::{Peer, Server, Timing};
use natpunch::DEFAULT_PORT;
use std::io::{self, Result, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "natpunch")]
enum Opt {
    Server(ServerOpt),
    Peer(PeerOpt),
}

#[derive(StructOpt, Debug)]
struct ServerOpt {
    #[structopt(long = "listen-addr", default_value = "0.0.0.0")]
    listen_addr: String,

    #[structopt(long = "port")]
    port: Option<u16>,
}

#[derive(StructOpt, Debug)]
struct PeerOpt {
    id: String,

    server_host: String,

    server_port: Option<u16>,

    #[structopt(long = "punch-count", default_value = "3")]
    punch_count: u32,

    #[structopt(long = "punch-interval-ms", default_value = "500")]
    punch_interval_ms: u64,

    #[structopt(long = "listen-timeout-ms", default_value = "5000")]
    listen_timeout_ms: u64,

    #[structopt(long = "introduction-timeout-ms", default_value = "10000")]
    introduction_timeout_ms: u64,
}

fn main() -> Result<()> {
    env_logger::init();

    let opt: Opt = StructOpt::from_args();

    match opt {
        Opt::Server(opt) => run_server(opt),
        Opt::Peer(opt) => run_peer(opt),
    }
}

fn say(line: std::fmt::Arguments) -> Result<()> {
    say_to(&mut io::stdout().lock(), line)
}

fn say_to<W: Write>(out: &mut W, line: std::fmt::Arguments) -> Result<()> {
    writeln!(out, "{}", line)?;
    out.flush()
}

fn run_server(opt: ServerOpt) -> Result<()> {
    let s = Server::new((opt.listen_addr.as_str(), opt.port.unwrap_or(DEFAULT_PORT)))?;
    let (a, b) = s.run()?;
    say(format_args!("introduced {} {}", a.id, b.id))
}

fn run_peer(opt: PeerOpt) -> Result<()> {
    let port = opt.server_port.unwrap_or(DEFAULT_PORT);
    let server_addr = match opt.server_host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::from((ip, port)).to_string(),
        Err(_) => format!("{}:{}", opt.server_host, port),
    };

    let timing = Timing {
        punch_count: opt.punch_count,
        punch_interval: Duration::from_millis(opt.punch_interval_ms),
        listen_timeout: Duration::from_millis(opt.listen_timeout_ms),
        introduction_timeout: Duration::from_millis(opt.introduction_timeout_ms),
    };

    let p = Peer::new(&server_addr, &opt.id, None)?.with_timing(timing)?;

    // the first failed stdout write fails the run
    let mut stdout_err = None;
    p.run(|event| {
        if stdout_err.is_none() {
            stdout_err = say(format_args!("{} {}", opt.id, event)).err();
        }
    })?;

    stdout_err.map_or(Ok(()), Err)
}
