//! TLS handshake check.
//!
//! Dials `<domain>:443` and completes a full handshake with rustls against
//! the Mozilla root store shipped in `webpki-roots`. Any failure (resolution,
//! connect, timeout, certificate) makes the domain invalid.

use core::time::Duration;
use rustls::{ClientConfig, ClientConnection, RootCertStore, pki_types::ServerName};
use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::Arc,
};

const HTTPS_PORT: u16 = 443;

/// Reusable TLS client settings shared by every check.
#[derive(Clone)]
pub struct TlsCheck {
    config: Arc<ClientConfig>,
    timeout: Duration,
}

impl TlsCheck {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
            timeout,
        })
    }

    /// Performs the handshake, blocking the calling thread.
    pub fn check_blocking(&self, domain: &str) -> bool {
        match self.handshake(domain) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("[{domain}] TLS checkup failed: {e}");
                false
            }
        }
    }

    fn handshake(&self, domain: &str) -> io::Result<()> {
        let addrs: Vec<SocketAddr> = (domain, HTTPS_PORT).to_socket_addrs()?.collect();
        self.handshake_at(domain, &addrs)
    }

    /// Connects to the first reachable address in `addrs` and completes a
    /// handshake presenting `domain` as the server name.
    fn handshake_at(&self, domain: &str, addrs: &[SocketAddr]) -> io::Result<()> {
        let server_name = ServerName::try_from(domain.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut tcp = connect_any(addrs, self.timeout)?;
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;

        let mut conn = ClientConnection::new(Arc::clone(&self.config), server_name)
            .map_err(io::Error::other)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)?;
        }

        tracing::debug!(
            "[{domain}] TLS handshake complete ({:?})",
            conn.protocol_version()
        );
        conn.send_close_notify();
        let _ = conn.complete_io(&mut tcp);
        Ok(())
    }
}

/// Tries every address in turn, returning the last error if none connects.
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => {
                tracing::trace!("Connecting to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address")))
}

impl core::fmt::Debug for TlsCheck {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TlsCheck")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
