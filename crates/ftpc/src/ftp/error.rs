//! FTP-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    /// For `Protocol` errors this is the raw reply text, byte for byte.
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// Dial, read or write failure on the control or a data socket.
    Network,
    /// TLS handshake or TLS configuration failure.
    Tls,
    /// Reply code did not match the code the operation requires.
    Protocol,
    /// PASV tuple, quoted path, reply code or listing line could not be parsed.
    Parse,
    /// The caller-supplied source or sink failed during STOR/RETR.
    Transfer,
    /// The session has been quit, closed, or left unusable by a failed upgrade.
    Disconnected,
    /// Address, URL, server name or command validation error.
    InvalidConfig,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Network, msg)
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Tls, msg)
    }

    /// Reply-code mismatch; `raw` is kept verbatim as the diagnostic payload.
    pub fn protocol(code: u16, raw: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Protocol, raw).with_code(code)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Parse, msg)
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Transfer, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, FtpErrorKind::Network | FtpErrorKind::Tls)
    }

    pub fn is_protocol(&self) -> bool {
        self.kind == FtpErrorKind::Protocol
    }

    pub fn is_parse(&self) -> bool {
        self.kind == FtpErrorKind::Parse
    }

    pub fn is_transfer(&self) -> bool {
        self.kind == FtpErrorKind::Transfer
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.trim_end_matches(|c| c == '\r' || c == '\n');
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        Self::network(e.to_string())
    }
}

impl From<rustls::Error> for FtpError {
    fn from(e: rustls::Error) -> Self {
        Self::tls(e.to_string())
    }
}
