//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP commands terminated with `\r\n`
//! - Reading single-line and multi-line replies
//! - Parsing the 3-digit reply code
//! - Draining bytes left in the read buffer once a reply is consumed

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{debug, log, warn, Level};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
    ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpResponse;

// ─── Transport ───────────────────────────────────────────────────────

/// The socket under a control or data connection: plain TCP or TLS-wrapped.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            // Many servers close data connections without close_notify;
            // that is reported as an ordinary EOF.
            Self::Tls(s) => match Pin::new(s.as_mut()).poll_read(cx, buf) {
                Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("TLS peer closed without close_notify");
                    Poll::Ready(Ok(()))
                }
                other => other,
            },
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

// ─── Control channel ─────────────────────────────────────────────────

/// Settings that survive a transport swap.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Log prefix, e.g. `[ftp:<session id>]`.
    pub label: String,
    pub debug: bool,
    pub drain_residual: bool,
    pub discarded: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            label: "[ftp]".into(),
            debug: false,
            drain_residual: true,
            discarded: 0,
        }
    }
}

/// The FTP command/response codec over one buffered reader/writer pair.
///
/// Generic over the stream so the framing can be driven by in-memory
/// streams; sessions use `ControlChannel<Transport>`.
pub struct ControlChannel<S> {
    stream: BufReader<BufWriter<S>>,
    settings: ChannelSettings,
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_settings(stream, ChannelSettings::default())
    }

    pub fn with_settings(stream: S, settings: ChannelSettings) -> Self {
        Self {
            stream: BufReader::new(BufWriter::new(stream)),
            settings,
        }
    }

    /// Tear the channel down to its stream. Unread buffered bytes are lost.
    pub fn into_parts(self) -> (S, ChannelSettings) {
        (self.stream.into_inner().into_inner(), self.settings)
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Total bytes thrown away by the post-reply drain.
    pub fn discarded_bytes(&self) -> u64 {
        self.settings.discarded
    }

    /// Send one command (CRLF is appended) and flush.
    ///
    /// A command containing CR or LF is refused before anything is written;
    /// it would otherwise reach the server as several commands.
    pub async fn send(&mut self, command: &str) -> FtpResult<()> {
        if command.contains(['\r', '\n']) {
            return Err(FtpError::invalid_config(format!(
                "Command contains a line break: {:?}",
                redact(command)
            )));
        }
        self.wire_log(">>>", redact(command));
        let line = format!("{}\r\n", command);
        self.stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| FtpError::network(format!("Control write failed: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| FtpError::network(format!("Control flush failed: {}", e)))?;
        Ok(())
    }

    /// Read a single line from the control channel (including CRLF).
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD.
    async fn read_line(&mut self) -> FtpResult<String> {
        let mut buf = Vec::new();
        let n = self
            .stream
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| FtpError::network(format!("Control read failed: {}", e)))?;
        if n == 0 {
            return Err(FtpError::network("Server closed the control connection"));
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        self.wire_log("<<<", line.trim_end());
        Ok(line)
    }

    /// Read a complete FTP reply (possibly multi-line).
    ///
    /// Multi-line replies look like:
    /// ```text
    /// 211-Features:
    ///  MLST type*;size*;
    /// 211 End
    /// ```
    /// Every consumed line is kept verbatim in [`FtpResponse::raw`]. The
    /// residual drain runs after every reply except a positive preliminary
    /// (1xx) one.
    pub async fn receive(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line().await?;
        let mut raw = first.clone();

        if first.len() >= 4 && first.as_bytes()[3] == b'-' {
            let closing = format!("{} ", &first[..3]);
            loop {
                let next = match self.read_line().await {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("{} multi-line reply not terminated: {}", self.settings.label, e);
                        return Err(e);
                    }
                };
                raw.push_str(&next);
                if next.starts_with(&closing) {
                    break;
                }
            }
        }

        let code = parse_code(&raw);
        // A 1xx reply announces another one; draining here would swallow it.
        if !matches!(code, Ok(100..=199)) {
            self.drain();
        }
        Ok(FtpResponse { code: code?, raw })
    }

    /// Send a command and return the reply without checking its code.
    pub async fn execute(&mut self, command: &str) -> FtpResult<FtpResponse> {
        self.send(command).await?;
        self.receive().await
    }

    /// Send a command and require exactly `expected` as the reply code.
    pub async fn cmd(&mut self, expected: u16, command: &str) -> FtpResult<FtpResponse> {
        let resp = self.execute(command).await?;
        expect_code(resp, expected)
    }

    /// Discard whatever is already buffered but not part of the reply just read.
    fn drain(&mut self) {
        if !self.settings.drain_residual {
            return;
        }
        let residual = self.stream.buffer().len();
        if residual == 0 {
            return;
        }
        self.stream.consume(residual);
        self.settings.discarded += residual as u64;
        debug!(
            "{} drained {} residual byte(s) from the control buffer",
            self.settings.label, residual
        );
    }

    fn wire_log(&self, direction: &str, text: &str) {
        let level = if self.settings.debug {
            Level::Debug
        } else {
            Level::Trace
        };
        log!(level, "{} {} {}", self.settings.label, direction, text);
    }
}

/// Reject a reply whose code is not `expected`.
pub fn expect_code(resp: FtpResponse, expected: u16) -> FtpResult<FtpResponse> {
    if resp.code != expected {
        return Err(FtpError::protocol(resp.code, resp.raw));
    }
    Ok(resp)
}

/// Parse the 3-digit reply code from the start of a reply.
pub fn parse_code(raw: &str) -> FtpResult<u16> {
    let digits = raw
        .get(..3)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| {
            FtpError::parse(format!(
                "Invalid reply code in: '{}'",
                raw.trim_end_matches(|c| c == '\r' || c == '\n')
            ))
        })?;
    digits
        .parse::<u16>()
        .map_err(|_| FtpError::parse(format!("Invalid reply code in: '{}'", raw)))
}

fn redact(command: &str) -> &str {
    match command.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("PASS ") => "PASS ****",
        _ => command,
    }
}
