//! TCP transport: establishes the FTP control connection.
//!
//! Resolves `host[:port]`, dials, and reads the welcome banner. The AUTH TLS
//! upgrade happens later on the already-open connection (see `tls.rs`).

use log::{debug, info};
use tokio::net::TcpStream;

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{ChannelSettings, ControlChannel, Transport};
use crate::ftp::types::{FtpConfig, FtpResponse};

/// Default control port.
pub const DEFAULT_PORT: u16 = 21;

/// Split `host:port`, `host`, `[v6]:port` or a bare IPv6 literal.
pub fn split_host_port(addr: &str) -> FtpResult<(String, u16)> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(FtpError::invalid_config("Address must not be empty"));
    }

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| FtpError::invalid_config(format!("Unclosed '[' in address: {}", addr)))?;
        let host = &rest[..end];
        let port = match &rest[end + 1..] {
            "" => None,
            tail => Some(tail.strip_prefix(':').ok_or_else(|| {
                FtpError::invalid_config(format!("Garbage after ']' in address: {}", addr))
            })?),
        };
        (host, port)
    } else {
        match addr.rsplit_once(':') {
            // More than one colon without brackets: a bare IPv6 literal.
            Some((host, _)) if host.contains(':') => (addr, None),
            Some((host, port)) => (host, Some(port)),
            None => (addr, None),
        }
    };

    if host.is_empty() {
        return Err(FtpError::invalid_config(format!("No host in address: {}", addr)));
    }

    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| FtpError::invalid_config(format!("Invalid port in address: {}", addr)))?,
        None => DEFAULT_PORT,
    };

    Ok((host.to_string(), port))
}

/// Open a plain TCP connection.
pub async fn dial(host: &str, port: u16) -> FtpResult<TcpStream> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| FtpError::network(format!("TCP connect to {}:{}: {}", host, port, e)))?;
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

/// Establish the control connection and return a ready-to-use channel
/// **plus** the server welcome banner and the resolved host.
pub async fn connect(
    config: &FtpConfig,
    label: String,
) -> FtpResult<(ControlChannel<Transport>, FtpResponse, String)> {
    let (host, port) = split_host_port(&config.addr)?;
    info!("{} connecting to {}:{}", label, host, port);

    let tcp = dial(&host, port).await?;
    let settings = ChannelSettings {
        label,
        debug: config.debug,
        drain_residual: config.drain_residual,
        discarded: 0,
    };
    let mut channel = ControlChannel::with_settings(Transport::Plain(tcp), settings);

    // 120 "service ready in nnn minutes" precedes the real 220.
    let mut banner = channel.receive().await?;
    while banner.code == 120 {
        debug!("{} server not ready yet: {}", channel.settings().label, banner.message());
        banner = channel.receive().await?;
    }
    if banner.code != 220 {
        return Err(FtpError::protocol(banner.code, banner.raw));
    }

    Ok((channel, banner, host))
}
