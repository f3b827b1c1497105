//! **ftpc**: FTP/FTPS client engine.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`ftp::types`] | Configuration, responses, listing entries, feature flags |
//! | [`ftp::error`] | Categorised FTP error |
//! | [`ftp::protocol`] | Control channel framing and multi-line reply parsing |
//! | [`ftp::connection`] | Dialing the control connection |
//! | [`ftp::client`] | The `Session` and its single-command operations |
//! | [`ftp::transfer`] | PASV negotiation and data connections |
//! | [`ftp::file_ops`] | STOR / RETR |
//! | [`ftp::tls`] | AUTH TLS upgrade and rustls configuration |
//! | [`ftp::parser`] | Quoted-path and MLSD line parsing |
//! | [`ftp::directory`] | Listing and depth-limited tree walking |
//! | [`ftp::tree`] | Rendering a walk as an indented tree |

pub mod ftp;

pub use ftp::*;
