//! Shared types for the FTP crate.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::ftp::error::{FtpError, FtpResult};

/// Depth limit that lets [`Session::walk`](crate::Session::walk) descend without bound.
/// Any negative depth means "unlimited"; this is the documented spelling.
pub const WALK_UNLIMITED: i32 = -1;

// ─── Configuration ───────────────────────────────────────────────────

/// TLS settings applied by `tls::client_config` and the AUTH TLS upgrade.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// Accept self-signed / untrusted certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Name presented for SNI and certificate checks. Defaults to the host
    /// part of the control address.
    #[serde(default)]
    pub server_name: Option<String>,
}

/// Configuration for a single FTP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConfig {
    /// `host:port`; the port may be omitted (21).
    pub addr: String,
    /// Log the command/response exchange at `debug` instead of `trace`.
    #[serde(default)]
    pub debug: bool,
    /// Discard bytes left in the control read buffer after each reply.
    /// Turn off for servers that pipeline replies.
    #[serde(default = "default_true")]
    pub drain_residual: bool,
    #[serde(default)]
    pub tls: TlsOptions,
}

fn default_true() -> bool {
    true
}

impl FtpConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            debug: false,
            drain_residual: true,
            tls: TlsOptions::default(),
        }
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn drain_residual(mut self, enabled: bool) -> Self {
        self.drain_residual = enabled;
        self
    }

    /// Build a config from an `ftp://[user[:pass]@]host[:port][/path]` URL.
    pub fn from_url(raw: &str) -> FtpResult<FtpUrl> {
        let url = url::Url::parse(raw)
            .map_err(|e| FtpError::invalid_config(format!("Invalid FTP URL '{}': {}", raw, e)))?;
        if url.scheme() != "ftp" {
            return Err(FtpError::invalid_config(format!(
                "Unsupported scheme '{}' (expected ftp)",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FtpError::invalid_config(format!("FTP URL has no host: {}", raw)))?;
        let port = url.port().unwrap_or(21);

        let user = match url.username() {
            "" => None,
            u => Some(u.to_string()),
        };

        Ok(FtpUrl {
            config: FtpConfig::new(format!("{}:{}", host, port)),
            user,
            password: url.password().map(str::to_string),
            path: url.path().to_string(),
        })
    }
}

/// Result of [`FtpConfig::from_url`].
#[derive(Debug, Clone)]
pub struct FtpUrl {
    pub config: FtpConfig,
    pub user: Option<String>,
    pub password: Option<String>,
    /// URL path, `/` when the URL carries none.
    pub path: String,
}

/// Transfer type (RFC 959 TYPE command).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferType {
    Ascii,
    Binary,
}

impl TransferType {
    pub fn code(self) -> &'static str {
        match self {
            Self::Ascii => "A",
            Self::Binary => "I",
        }
    }
}

impl Default for TransferType {
    fn default() -> Self {
        Self::Binary
    }
}

/// Encryption state of the control channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SecurityState {
    Plain,
    /// AUTH TLS accepted but PBSZ/PROT not yet confirmed. A session stuck
    /// here after an error is unusable and must be closed.
    Securing,
    Secured,
}

// ─── FTP Response ────────────────────────────────────────────────────

/// A single FTP reply (may be multi-line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: u16,
    /// Every consumed line, in order, terminators included.
    pub raw: String,
}

impl FtpResponse {
    /// The raw reply split into lines without terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw.lines()
    }

    /// Text of the first line after the `NNN ` / `NNN-` prefix.
    pub fn message(&self) -> &str {
        let first = self.raw.lines().next().unwrap_or("");
        first.get(4..).unwrap_or("").trim_end()
    }

    /// Whether this is a positive-completion reply (2xx).
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

// ─── Passive mode ────────────────────────────────────────────────────

/// Where to dial for one data connection.
///
/// `host` is always the control connection's host; the address the server
/// advertised in its 227 reply is kept only for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveEndpoint {
    pub host: String,
    pub port: u16,
    pub advertised: Ipv4Addr,
}

impl PassiveEndpoint {
    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// ─── Directory Listing ───────────────────────────────────────────────

/// Type classification from the `type` fact of an MLSD line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    Dir,
    File,
    /// `cdir`, `pdir`, `OS.unix=slink:...`, a missing fact, etc.
    Other(String),
}

impl EntryKind {
    pub fn from_fact(value: &str) -> Self {
        if value.eq_ignore_ascii_case("dir") {
            Self::Dir
        } else if value.eq_ignore_ascii_case("file") {
            Self::File
        } else {
            Self::Other(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dir => "dir",
            Self::File => "file",
            Self::Other(s) => s,
        }
    }
}

/// One entry from a machine-readable (MLSD) listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Value of the `perm` fact, empty when absent.
    pub perm: String,
    pub kind: EntryKind,
    pub name: String,
    /// All facts, keys lower-cased (e.g. "size" → "1234").
    #[serde(default)]
    pub facts: HashMap<String, String>,
}

// ─── Server Capabilities ─────────────────────────────────────────────

bitflags! {
    /// Listing capabilities learned from FEAT.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u32 {
        /// MLST / MLSD machine listings.
        const MLST = 1;
        /// NLST name listings.
        const NLST = 1 << 1;
        /// EPLF listings.
        const EPLF = 1 << 2;
        /// The server only understands plain LIST.
        const LIST_ONLY = 1 << 3;
    }
}

impl Features {
    /// Interpret a 211 FEAT reply.
    ///
    /// NLST is an RFC 959 base command, so any server that answers FEAT is
    /// assumed to support it.
    pub fn from_feat_reply(resp: &FtpResponse) -> Self {
        let mut features = Features::NLST;
        for line in resp.lines().skip(1) {
            if line.starts_with(&resp.code.to_string()) {
                continue;
            }
            let name = line
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_uppercase();
            match name.as_str() {
                "MLST" | "MLSD" => features |= Features::MLST,
                "EPLF" => features |= Features::EPLF,
                _ => {}
            }
        }
        features
    }
}
