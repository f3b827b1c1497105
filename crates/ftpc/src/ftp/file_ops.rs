//! File transfers: STOR and RETR over a passive data connection.
//!
//! Both are framed by two control-channel checkpoints: 150 before any data
//! moves and 226 once the data connection has been closed.

use std::future::Future;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ftp::client::Session;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::expect_code;
use crate::ftp::transfer::DataStream;
use crate::ftp::types::TransferType;

/// Chunk size for streaming transfers (64 KiB).
const CHUNK: usize = 65_536;

impl Session {
    // ─── UPLOAD (STOR) ───────────────────────────────────────────

    /// Upload everything `source` yields to `path`. Returns the byte count.
    ///
    /// A read failure on `source` is a `Transfer` error, a write failure on
    /// the data connection a `Network` error. Either way the data connection
    /// is closed and the 226 is not awaited.
    pub async fn stor<R>(&mut self, path: &str, source: &mut R) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut data = self.begin_transfer(&format!("STOR {}", path)).await?;

        let copied = match pump(source, &mut data, Side::Source).await {
            Ok(n) => n,
            Err(e) => {
                drop(data);
                return Err(e);
            }
        };
        // Shutdown sends the TLS close_notify / TCP FIN the server waits for.
        let closed = data.shutdown().await;
        drop(data);
        closed.map_err(|e| FtpError::network(format!("Closing data connection: {}", e)))?;

        self.finish_transfer().await?;
        debug!("[ftp:{}] stored {} byte(s) to {}", self.id, copied, path);
        Ok(copied)
    }

    // ─── DOWNLOAD (RETR) ─────────────────────────────────────────

    /// Download `path`, handing the data connection to `sink`.
    ///
    /// The 226 is awaited once `sink` has resolved, and servers usually send
    /// it only after the data connection is closed. `sink` must therefore
    /// consume the stream and let it drop: a `T` that carries the
    /// [`DataStream`] out keeps the socket open and the call never returns.
    /// A `sink` error is returned unchanged and the 226 is not awaited.
    pub async fn retr<F, Fut, T>(&mut self, path: &str, sink: F) -> FtpResult<T>
    where
        F: FnOnce(DataStream) -> Fut,
        Fut: Future<Output = FtpResult<T>>,
    {
        let data = self.begin_transfer(&format!("RETR {}", path)).await?;
        let value = sink(data).await?;
        self.finish_transfer().await?;
        Ok(value)
    }

    /// Download `path` into `writer`. Returns the byte count.
    pub async fn retr_to_writer<W>(&mut self, path: &str, writer: &mut W) -> FtpResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let sink = &mut *writer;
        let copied = self
            .retr(path, |mut data| async move {
                pump(&mut data, sink, Side::Sink).await
            })
            .await?;
        writer
            .flush()
            .await
            .map_err(|e| FtpError::transfer(format!("Flushing download sink: {}", e)))?;
        Ok(copied)
    }

    /// Download `path` into memory.
    pub async fn retr_to_vec(&mut self, path: &str) -> FtpResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.retr_to_writer(path, &mut buf).await?;
        Ok(buf)
    }

    // ─── Shared framing ──────────────────────────────────────────

    /// TYPE I, PASV, send `command`, dial, require 150, then secure the
    /// data connection. A refusal drops the socket without a handshake.
    async fn begin_transfer(&mut self, command: &str) -> FtpResult<DataStream> {
        self.set_type(TransferType::Binary).await?;
        let endpoint = self.pasv().await?;
        self.channel()?.send(command).await?;
        let data = self.open_data_connection(&endpoint).await?;
        let resp = self.channel()?.receive().await?;
        expect_code(resp, 150)?;
        self.secure_data(data).await
    }

    /// Require the 226 once the data connection is gone.
    async fn finish_transfer(&mut self) -> FtpResult<()> {
        let resp = self.channel()?.receive().await?;
        expect_code(resp, 226)?;
        Ok(())
    }
}

/// Which end of a copy is the caller's.
#[derive(Clone, Copy)]
enum Side {
    Source,
    Sink,
}

/// Copy `reader` into `writer` until EOF. Failures on the caller's side are
/// `Transfer` errors, failures on the data connection `Network` errors.
async fn pump<R, W>(reader: &mut R, writer: &mut W, caller: Side) -> FtpResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| match caller {
            Side::Source => FtpError::transfer(format!("Reading upload source: {}", e)),
            Side::Sink => FtpError::network(format!("Data read failed: {}", e)),
        })?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await.map_err(|e| match caller {
            Side::Source => FtpError::network(format!("Data write failed: {}", e)),
            Side::Sink => FtpError::transfer(format!("Writing download sink: {}", e)),
        })?;
        total += n as u64;
    }
    Ok(total)
}
