//! Passive-mode data channel (RFC 959 PASV).
//!
//! The 227 reply only contributes the port: the data connection always dials
//! the control connection's host, so a server behind NAT that advertises a
//! private address still works. When the control channel is secured, every
//! data connection is wrapped with the same TLS configuration.

use std::net::Ipv4Addr;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::ftp::client::Session;
use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::types::{FtpResponse, PassiveEndpoint};

/// A plain or TLS-wrapped data connection.
pub type DataStream = crate::ftp::protocol::Transport;

// ─── PASV tuple ──────────────────────────────────────────────────────

/// Decode `(h1,h2,h3,h4,p1,p2)` from a 227 reply into the advertised
/// address and port (`p1 * 256 + p2`).
pub fn parse_pasv_tuple(text: &str) -> FtpResult<(Ipv4Addr, u16)> {
    let open = text
        .find('(')
        .ok_or_else(|| FtpError::parse(format!("No PASV tuple in reply: {}", text.trim_end())))?;
    let close = text[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| FtpError::parse(format!("Unclosed PASV tuple in reply: {}", text.trim_end())))?;

    let fields: Vec<&str> = text[open + 1..close].split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(FtpError::parse(format!(
            "PASV tuple has {} field(s), expected 6: {}",
            fields.len(),
            text.trim_end()
        )));
    }

    let mut nums = [0u8; 6];
    for (slot, field) in nums.iter_mut().zip(&fields) {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FtpError::parse(format!("Bad PASV field '{}'", field)));
        }
        *slot = field
            .parse::<u8>()
            .map_err(|_| FtpError::parse(format!("PASV number out of range: {}", field)))?;
    }

    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok((ip, port))
}

// ─── RawPassiveCmd ───────────────────────────────────────────────────

/// Where a passive exchange stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveStage {
    /// PASV failed or its reply could not be decoded.
    Negotiate,
    /// Writing the command to the control connection.
    Send,
    /// Dialing (or TLS-wrapping) the data connection.
    Connect,
    /// Reading the first reply to the command.
    InitialResponse,
    /// The first reply had no valid code.
    Parse,
    /// Reading the data connection.
    DataRead,
    /// Reading the completion reply.
    Completion,
}

impl PassiveStage {
    /// Negative code reported by [`Session::raw_passive_cmd`].
    pub fn sentinel(self) -> i32 {
        match self {
            Self::Negotiate => -1,
            Self::Send => -2,
            Self::Connect => -3,
            Self::InitialResponse => -4,
            Self::Parse => -5,
            Self::DataRead => -6,
            Self::Completion => -7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassiveFailure {
    pub stage: PassiveStage,
    pub error: FtpError,
}

impl PassiveFailure {
    fn at(stage: PassiveStage) -> impl FnOnce(FtpError) -> Self {
        move |error| Self { stage, error }
    }
}

impl From<PassiveFailure> for FtpError {
    fn from(f: PassiveFailure) -> Self {
        f.error
    }
}

/// Outcome of a passive command that reached the server.
#[derive(Debug, Clone)]
pub struct PassiveReply {
    /// Code of the first reply to the command.
    pub code: u16,
    pub initial: FtpResponse,
    /// Data connection lines, terminators included, with invalid UTF-8
    /// replaced by U+FFFD. Empty when `code > 299`.
    pub lines: Vec<String>,
    /// Closing reply; `None` when the command was refused up front.
    pub completion: Option<FtpResponse>,
}

impl Session {
    /// PASV (227) and decode the endpoint. The host is the control host.
    pub async fn pasv(&mut self) -> FtpResult<PassiveEndpoint> {
        let resp = self.channel()?.cmd(227, "PASV").await?;
        let (advertised, port) = parse_pasv_tuple(&resp.raw)?;
        Ok(PassiveEndpoint {
            host: self.host.clone(),
            port,
            advertised,
        })
    }

    /// Dial `endpoint` over plain TCP.
    ///
    /// On a secured session the server only starts its TLS handshake once it
    /// has accepted the command, so the stream is wrapped separately by
    /// [`Session::secure_data`] after the preliminary reply.
    pub async fn open_data_connection(&self, endpoint: &PassiveEndpoint) -> FtpResult<DataStream> {
        let tcp = connection::dial(&endpoint.host, endpoint.port).await?;
        debug!(
            "[ftp:{}] data connection to {} (server advertised {})",
            self.id,
            endpoint.addr(),
            endpoint.advertised
        );
        Ok(DataStream::Plain(tcp))
    }

    /// Wrap a freshly dialed data connection in TLS when the control channel
    /// is secured. Plain sessions get the stream back untouched.
    pub async fn secure_data(&self, data: DataStream) -> FtpResult<DataStream> {
        match (&self.tls, data) {
            (Some(context), DataStream::Plain(tcp)) => context.wrap(tcp).await,
            (_, data) => Ok(data),
        }
    }

    /// Negotiate a data connection, send `command`, collect the data lines
    /// and the completion reply.
    ///
    /// A first reply above 299 ends the exchange before any TLS handshake on
    /// the data connection; the dialed socket is dropped unused.
    pub async fn passive_exchange(
        &mut self,
        command: &str,
    ) -> Result<PassiveReply, PassiveFailure> {
        let endpoint = self
            .pasv()
            .await
            .map_err(PassiveFailure::at(PassiveStage::Negotiate))?;

        self.channel()
            .map_err(PassiveFailure::at(PassiveStage::Send))?
            .send(command)
            .await
            .map_err(PassiveFailure::at(PassiveStage::Send))?;

        let data = self
            .open_data_connection(&endpoint)
            .await
            .map_err(PassiveFailure::at(PassiveStage::Connect))?;

        let initial = match self
            .channel()
            .map_err(PassiveFailure::at(PassiveStage::InitialResponse))?
            .receive()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.kind == FtpErrorKind::Parse => {
                return Err(PassiveFailure::at(PassiveStage::Parse)(e))
            }
            Err(e) => return Err(PassiveFailure::at(PassiveStage::InitialResponse)(e)),
        };

        if initial.code > 299 {
            return Ok(PassiveReply {
                code: initial.code,
                initial,
                lines: Vec::new(),
                completion: None,
            });
        }

        let data = self
            .secure_data(data)
            .await
            .map_err(PassiveFailure::at(PassiveStage::Connect))?;

        let lines = read_data_lines(data)
            .await
            .map_err(PassiveFailure::at(PassiveStage::DataRead))?;

        let completion = self
            .channel()
            .map_err(PassiveFailure::at(PassiveStage::Completion))?
            .receive()
            .await
            .map_err(PassiveFailure::at(PassiveStage::Completion))?;

        Ok(PassiveReply {
            code: initial.code,
            initial,
            lines,
            completion: Some(completion),
        })
    }

    /// Run `command` over a passive data connection.
    ///
    /// Returns the first reply code and the data lines (lossily decoded as
    /// UTF-8), or a negative sentinel (see [`PassiveStage::sentinel`]) with
    /// no lines.
    pub async fn raw_passive_cmd(&mut self, command: &str) -> (i32, Vec<String>) {
        match self.passive_exchange(command).await {
            Ok(reply) => (reply.code as i32, reply.lines),
            Err(failure) => {
                debug!(
                    "[ftp:{}] passive '{}' failed at {:?}: {}",
                    self.id, command, failure.stage, failure.error
                );
                (failure.stage.sentinel(), Vec::new())
            }
        }
    }
}

/// Read the data connection line by line until EOF, then close it.
async fn read_data_lines(data: DataStream) -> FtpResult<Vec<String>> {
    let mut reader = BufReader::new(data);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| FtpError::network(format!("Data read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }
    let mut data = reader.into_inner();
    data.shutdown().await.ok();
    Ok(lines)
}
