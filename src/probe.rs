//! TCP reachability probing.
//!
//! A short-timeout dial that lets the distribution loop skip hosts that
//! are powered off or unrouted instead of burning a full SSH handshake
//! timeout on each of them.

use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default probe timeout. Long enough for a LAN SYN/ACK, short enough
/// that a /24 of dead hosts doesn't stall the run.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(120);

/// Check whether a TCP connection to `host:port` can be established
/// within `probe_timeout`.
///
/// Every failure mode (timeout, refused, unreachable) collapses into
/// `false`; an established connection is dropped immediately.
pub async fn probe(host: &str, port: u16, probe_timeout: Duration) -> bool {
    match timeout(probe_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!("probe {}:{} failed: {}", host, port, e);
            false
        }
        Err(_elapsed) => {
            debug!("probe {}:{} timed out", host, port);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe("127.0.0.1", port, PROBE_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        // Bind and drop so the port is known to be closed right now.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!probe("127.0.0.1", port, PROBE_TIMEOUT).await);
    }
}
