use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::types::PortState;

/// What happened to a single connect attempt.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Handshake completed.
    Open(SocketAddr),
    /// The target answered with a reset.
    Refused(SocketAddr),
    /// No answer before the deadline.
    TimedOut(SocketAddr),
    /// The host name did not resolve to any address in time.
    Unresolved(String),
    /// Socket creation or any other network error.
    Failed(SocketAddr, io::Error),
}

impl ProbeOutcome {
    /// Collapse to the reported state: only a completed handshake is open.
    pub fn state(&self) -> PortState {
        match self {
            ProbeOutcome::Open(_) => PortState::Open,
            _ => PortState::Closed,
        }
    }
}

/// Connect-scan one port: resolve `host`, make a single TCP connect to the
/// first address, and classify the result.
///
/// `timeout` bounds the whole probe: resolution and connect share one
/// deadline.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> PortState {
    probe_outcome(host, port, timeout).await.state()
}

/// Like [`probe`] but keeps the reason a port was classified closed.
pub async fn probe_outcome(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let deadline = Instant::now() + timeout;
    let addr = match resolve(host, port, deadline).await {
        Ok(addr) => addr,
        Err(reason) => {
            warn!(host, port, %reason, "resolution failed, marking closed");
            return ProbeOutcome::Unresolved(reason);
        }
    };

    let outcome = match time::timeout_at(deadline, TcpStream::connect(addr)).await {
        // The stream drops at the end of this arm, closing the connection.
        Ok(Ok(_stream)) => ProbeOutcome::Open(addr),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused(addr),
        Ok(Err(e)) => ProbeOutcome::Failed(addr, e),
        Err(_) => ProbeOutcome::TimedOut(addr),
    };

    match &outcome {
        ProbeOutcome::Failed(addr, e) => debug!(%addr, error = %e, "connect failed"),
        other => debug!(%addr, state = %other.state(), "probed"),
    }
    outcome
}

/// First address `host` resolves to for `port`, IPv4 or IPv6.
async fn resolve(host: &str, port: u16, deadline: Instant) -> Result<SocketAddr, String> {
    match time::timeout_at(deadline, lookup_host((host, port))).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .ok_or_else(|| format!("{host} has no addresses")),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("resolving {host} timed out")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpSocket};

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn listener_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = probe_outcome("127.0.0.1", port, TIMEOUT).await;
        assert!(matches!(outcome, ProbeOutcome::Open(_)), "{outcome:?}");
    }

    #[tokio::test]
    async fn released_port_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert_eq!(probe("127.0.0.1", port, TIMEOUT).await, PortState::Closed);
    }

    #[tokio::test]
    async fn unresolvable_host_is_closed() {
        let outcome = probe_outcome("no-such-host.invalid", 80, TIMEOUT).await;
        assert!(matches!(outcome, ProbeOutcome::Unresolved(_)), "{outcome:?}");
        assert_eq!(outcome.state(), PortState::Closed);
    }

    #[tokio::test]
    async fn full_backlog_times_out() {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        // Never accept: once the queue is full, new handshakes go unanswered.
        let mut held = Vec::new();
        let mut saturated = false;
        for _ in 0..32 {
            match time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => held.push(stream),
                Ok(Err(_)) => break,
                Err(_) => {
                    saturated = true;
                    break;
                }
            }
        }
        if !saturated {
            // The local stack refuses instead of dropping; nothing to check.
            return;
        }

        let started = std::time::Instant::now();
        let outcome = probe_outcome("127.0.0.1", addr.port(), Duration::from_millis(100)).await;
        assert!(matches!(outcome, ProbeOutcome::TimedOut(_)), "{outcome:?}");
        assert_eq!(outcome.state(), PortState::Closed);
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(held);
    }

    #[test]
    fn only_open_maps_to_open() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(ProbeOutcome::Open(addr).state(), PortState::Open);
        assert_eq!(ProbeOutcome::Refused(addr).state(), PortState::Closed);
        assert_eq!(ProbeOutcome::TimedOut(addr).state(), PortState::Closed);
        assert_eq!(
            ProbeOutcome::Unresolved("x".into()).state(),
            PortState::Closed
        );
    }
}
