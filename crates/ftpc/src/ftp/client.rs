//! Stateful FTP session: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` → `login()` → optional `auth_tls()` → commands →
//! `quit()` / `close()`.
//!
//! The data-channel operations live in `transfer.rs`, `file_ops.rs` and
//! `directory.rs` as further `impl Session` blocks.

use std::fmt;

use log::{debug, info};
use uuid::Uuid;

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::parser;
use crate::ftp::protocol::{ControlChannel, Transport};
use crate::ftp::tls::TlsContext;
use crate::ftp::types::*;

/// Connect to `addr` (`host[:port]`) with default settings.
pub async fn connect(addr: &str) -> FtpResult<Session> {
    Session::connect_with(FtpConfig::new(addr)).await
}

/// Connect with the command/response exchange logged at `debug`.
pub async fn connect_debug(addr: &str) -> FtpResult<Session> {
    Session::connect_with(FtpConfig::new(addr).debug(true)).await
}

/// One FTP control connection and everything bound to it.
///
/// Every operation takes `&mut self`; a session serves one command at a time.
pub struct Session {
    pub id: String,
    pub config: FtpConfig,
    /// Host part of the control address. Data connections always dial it.
    pub(crate) host: String,
    /// `None` once the session has been quit or closed, and while a TLS
    /// upgrade is swapping the transport.
    pub(crate) channel: Option<ControlChannel<Transport>>,
    /// Present once AUTH TLS has succeeded.
    pub(crate) tls: Option<TlsContext>,
    pub(crate) state: SecurityState,
    features: Features,
    banner: FtpResponse,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("state", &self.state)
            .field("features", &self.features)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Session {
    /// Dial, read the 220 banner and return a session ready for `login`.
    pub async fn connect_with(config: FtpConfig) -> FtpResult<Self> {
        let id = Uuid::new_v4().to_string();
        let label = format!("[ftp:{}]", id);
        let (channel, banner, host) = connection::connect(&config, label).await?;
        info!("[ftp:{}] connected to {}: {}", id, host, banner.message());

        Ok(Self {
            id,
            config,
            host,
            channel: Some(channel),
            tls: None,
            state: SecurityState::Plain,
            features: Features::empty(),
            banner,
        })
    }

    /// The control channel, or `Disconnected` when the session is unusable.
    pub(crate) fn channel(&mut self) -> FtpResult<&mut ControlChannel<Transport>> {
        if self.state == SecurityState::Securing {
            return Err(FtpError::disconnected(
                "TLS upgrade did not complete; close the session and reconnect",
            ));
        }
        self.channel
            .as_mut()
            .ok_or_else(|| FtpError::disconnected("Session is closed"))
    }

    // ─── Accessors ───────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The 220 welcome reply.
    pub fn banner(&self) -> &FtpResponse {
        &self.banner
    }

    /// Flags recorded by the last `feat()` call; empty until then.
    pub fn features(&self) -> Features {
        self.features
    }

    pub fn security_state(&self) -> SecurityState {
        self.state
    }

    pub fn is_secured(&self) -> bool {
        self.state == SecurityState::Secured
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Bytes discarded by the post-reply drain so far.
    pub fn discarded_bytes(&self) -> u64 {
        self.channel
            .as_ref()
            .map(|c| c.discarded_bytes())
            .unwrap_or(0)
    }

    // ─── Authentication ──────────────────────────────────────────

    /// USER (331) then PASS (230). A 230 straight after USER logs in
    /// without a password.
    pub async fn login(&mut self, user: &str, pass: &str) -> FtpResult<()> {
        let label = format!("[ftp:{}]", self.id);
        let channel = self.channel()?;
        match channel.cmd(331, &format!("USER {}", user)).await {
            Ok(_) => {}
            Err(e) if e.kind == FtpErrorKind::Protocol && e.code == Some(230) => {
                debug!("{} USER accepted without a password", label);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        channel.cmd(230, &format!("PASS {}", pass)).await?;
        info!("{} logged in as {}", label, user);
        Ok(())
    }

    // ─── Directory commands ──────────────────────────────────────

    /// Current working directory from the 257 reply.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let resp = self.channel()?.cmd(257, "PWD").await?;
        parser::parse_quoted_path(&resp.raw)
    }

    pub async fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.channel()?.cmd(250, &format!("CWD {}", path)).await?;
        Ok(())
    }

    /// Create a directory; returns the server's reply text.
    pub async fn mkd(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.channel()?.cmd(257, &format!("MKD {}", path)).await
    }

    pub async fn dele(&mut self, path: &str) -> FtpResult<()> {
        self.channel()?.cmd(250, &format!("DELE {}", path)).await?;
        Ok(())
    }

    /// RNFR (350) then RNTO (250).
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        let channel = self.channel()?;
        channel.cmd(350, &format!("RNFR {}", from)).await?;
        channel.cmd(250, &format!("RNTO {}", to)).await?;
        Ok(())
    }

    /// TYPE A / TYPE I.
    pub async fn set_type(&mut self, transfer_type: TransferType) -> FtpResult<()> {
        self.channel()?
            .cmd(200, &format!("TYPE {}", transfer_type.code()))
            .await?;
        Ok(())
    }

    pub async fn noop(&mut self) -> FtpResult<()> {
        self.channel()?.cmd(200, "NOOP").await?;
        Ok(())
    }

    // ─── FEAT ────────────────────────────────────────────────────

    /// Ask the server which listing formats it supports.
    ///
    /// A 5xx reply means the server predates FEAT and is recorded as
    /// `LIST_ONLY`.
    pub async fn feat(&mut self) -> FtpResult<Features> {
        let resp = self.channel()?.execute("FEAT").await?;
        let features = match resp.code {
            211 => {
                let mut f = Features::from_feat_reply(&resp);
                if !f.intersects(Features::MLST | Features::EPLF) {
                    f |= Features::LIST_ONLY;
                }
                f
            }
            500..=599 => Features::LIST_ONLY,
            code => return Err(FtpError::protocol(code, resp.raw)),
        };
        debug!("[ftp:{}] server features: {:?}", self.id, features);
        self.features = features;
        Ok(features)
    }

    // ─── Raw commands ────────────────────────────────────────────

    /// Send any command and return the reply without checking its code.
    pub async fn raw_cmd(&mut self, command: &str) -> FtpResult<FtpResponse> {
        self.channel()?.execute(command).await
    }

    // ─── Teardown ────────────────────────────────────────────────

    /// QUIT (221), then close the control connection.
    ///
    /// On error the connection stays open so the caller can `close()` it.
    pub async fn quit(&mut self) -> FtpResult<()> {
        self.channel()?.cmd(221, "QUIT").await?;
        self.channel.take();
        self.tls = None;
        info!("[ftp:{}] session closed", self.id);
        Ok(())
    }

    /// Drop the control connection without sending QUIT.
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!("[ftp:{}] control connection dropped", self.id);
        }
        self.tls = None;
    }
}
