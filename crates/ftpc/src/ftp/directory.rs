//! Directory listing (MLSD, RFC 3659) and depth-limited tree walking.

use std::future::Future;
use std::pin::Pin;

use log::{debug, warn};

use crate::ftp::client::Session;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::parser;
use crate::ftp::types::{DirectoryEntry, EntryKind};

type WalkFuture<'a> = Pin<Box<dyn Future<Output = FtpResult<()>> + 'a>>;

impl Session {
    /// `MLSD path` over a passive data connection. Returns the listing lines
    /// in server order, terminators included.
    ///
    /// Lines are decoded as UTF-8; invalid bytes become U+FFFD, so a name
    /// the server stores in another encoding does not survive the round trip.
    pub async fn list(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let reply = self.passive_exchange(&format!("MLSD {}", path)).await?;
        if reply.code > 299 {
            return Err(FtpError::protocol(reply.code, reply.initial.raw));
        }
        if let Some(done) = reply.completion {
            if !done.is_completion() {
                return Err(FtpError::protocol(done.code, done.raw));
            }
        }
        Ok(reply.lines)
    }

    /// `list` parsed into entries. Blank lines are skipped.
    pub async fn mlsd(&mut self, path: &str) -> FtpResult<Vec<DirectoryEntry>> {
        let lines = self.list(path).await?;
        lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parser::parse_mlsd_line(line))
            .collect()
    }

    /// Depth-first, pre-order walk from `path` in server listing order.
    ///
    /// `visit` is called with the full path of every file. Directories are
    /// entered while `depth` allows: `0` lists `path` only, `n` descends `n`
    /// levels, any negative value (see [`WALK_UNLIMITED`](crate::WALK_UNLIMITED))
    /// has no limit. The first error from `visit` or from a listing ends the
    /// walk.
    ///
    /// A directory whose name was not valid UTF-8 cannot be addressed again
    /// and is skipped with a warning.
    pub async fn walk<F>(&mut self, path: &str, mut visit: F, depth: i32) -> FtpResult<()>
    where
        F: FnMut(&str, &DirectoryEntry) -> FtpResult<()>,
    {
        self.walk_dir(path.to_string(), &mut visit, depth).await
    }

    fn walk_dir<'a, F>(&'a mut self, path: String, visit: &'a mut F, depth: i32) -> WalkFuture<'a>
    where
        F: FnMut(&str, &DirectoryEntry) -> FtpResult<()>,
    {
        Box::pin(async move {
            debug!("[ftp:{}] walking {} (depth {})", self.id, path, depth);
            let entries = self.mlsd(&path).await?;

            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => {
                        if entry.name == "." || entry.name == ".." || depth == 0 {
                            continue;
                        }
                        let child = join_path(&path, &entry.name);
                        if entry.name.contains(char::REPLACEMENT_CHARACTER) {
                            warn!("[ftp:{}] skipping undecodable directory {}", self.id, child);
                            continue;
                        }
                        let next = if depth < 0 { depth } else { depth - 1 };
                        self.walk_dir(child, &mut *visit, next).await?;
                    }
                    EntryKind::File => {
                        visit(&join_path(&path, &entry.name), &entry)?;
                    }
                    EntryKind::Other(_) => {}
                }
            }
            Ok(())
        })
    }
}

/// `parent` + `/` + `name`, without doubling a trailing slash.
fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}
