//! Address resolution and TCP connect helpers.
//!
//! Both helpers return operator-facing error strings that carry a hint about
//! the most likely cause, so connection failures surfaced by the transfer
//! crates are actionable without a separate diagnostic run.

use log::debug;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Resolve `host:port` and return the first address (IPv4 or IPv6).
pub fn resolve_first(host: &str, port: u16) -> Result<SocketAddr, String> {
    let addr_str = format!("{host}:{port}");
    let t = Instant::now();
    let addrs: Vec<SocketAddr> = addr_str
        .to_socket_addrs()
        .map_err(|e| {
            format!(
                "DNS lookup for '{host}' failed: {e}. Check hostname spelling, DNS server, and network connectivity"
            )
        })?
        .collect();

    match addrs.first() {
        Some(first) => {
            debug!(
                "{host} resolved to {} ({} address{}) in {}ms",
                first.ip(),
                addrs.len(),
                if addrs.len() > 1 { "es" } else { "" },
                t.elapsed().as_millis()
            );
            Ok(*first)
        }
        None => Err(format!(
            "DNS returned no addresses for '{host}'. Verify the hostname is correct and DNS is configured"
        )),
    }
}

/// Connect with a timeout and switch the stream back to blocking mode.
pub fn connect_tcp(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, String> {
    let t = Instant::now();
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        let hint = match e.kind() {
            std::io::ErrorKind::TimedOut => {
                "the port may be firewalled or the host is unreachable"
            }
            std::io::ErrorKind::ConnectionRefused => {
                "the service may not be running or listens on a different port"
            }
            _ => "check firewall rules, VPN connectivity, and that the service is running",
        };
        format!("TCP connection to {addr} failed: {e} ({hint})")
    })?;
    stream
        .set_nonblocking(false)
        .map_err(|e| format!("Failed to set blocking mode: {e}"))?;
    let _ = stream.set_nodelay(true);
    debug!("TCP connected to {addr} in {}ms", t.elapsed().as_millis());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn resolve_first_resolves_localhost() {
        let addr = resolve_first("localhost", 2222).expect("localhost should resolve");
        assert_eq!(addr.port(), 2222);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn resolve_first_accepts_ip_literals() {
        let addr = resolve_first("127.0.0.1", 22).unwrap();
        assert_eq!(addr, "127.0.0.1:22".parse().unwrap());
    }

    #[test]
    fn resolve_first_fails_for_invalid_host() {
        let err = resolve_first("this.host.does.not.exist.invalid", 22).unwrap_err();
        assert!(err.contains("this.host.does.not.exist.invalid"));
    }

    #[test]
    fn connect_tcp_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = connect_tcp(addr, Duration::from_secs(2));
        assert!(stream.is_ok());
    }

    #[test]
    fn connect_tcp_reports_refused_port() {
        // Bind then drop to get a port that is very likely closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = connect_tcp(addr, Duration::from_millis(500)).unwrap_err();
        assert!(err.starts_with("TCP connection to"));
    }
}
