//! # FTP client engine
//!
//! Implementation of the RFC 959 control/data channel model with:
//! - **RFC 2228 / 4217**: AUTH TLS, PBSZ, PROT (explicit FTPS)
//! - **RFC 3659**: MLSD machine-readable listings
//! - **RFC 2389**: FEAT negotiation
//!
//! Architecture:
//! - `types`: data structures, config, feature flags
//! - `error`: FTP-specific error type
//! - `protocol`: command/response codec over the control connection
//! - `connection`: TCP dial + welcome banner
//! - `client`: `Session`: login, PWD/CWD/MKD/DELE/RNFR, raw commands
//! - `transfer`: PASV endpoint decoding, data connections, raw passive commands
//! - `file_ops`: STOR / RETR framed by 150/226
//! - `tls`: AUTH TLS upgrade, data-socket wrapping
//! - `parser`: quoted path and MLSD fact-line parsing
//! - `directory`: MLSD listing and recursive walk
//! - `tree`: walk output formatting

pub mod types;
pub mod error;
pub mod protocol;
pub mod connection;
pub mod client;
pub mod parser;
pub mod transfer;
pub mod tls;
pub mod directory;
pub mod file_ops;
pub mod tree;

pub use client::{connect, connect_debug, Session};
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use protocol::{ControlChannel, Transport};
pub use transfer::{DataStream, PassiveFailure, PassiveReply, PassiveStage};
pub use tree::TreeRenderer;
pub use types::*;
