//! Reply-text and listing parsers.
//!
//! - **Quoted paths** (RFC 959 §7): `257 "/some ""quoted"" dir" created`
//! - **MLSD facts** (RFC 3659): `type=file;size=1234;perm=r; file.txt`
//!
//! Both are explicit tokenizers: a missing delimiter is a `Parse` error,
//! never an index panic.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::{DirectoryEntry, EntryKind};

// ─── Quoted path ─────────────────────────────────────────────────────

/// Extract the double-quoted path from a 257 reply.
///
/// A doubled quote inside the path stands for one literal quote.
pub fn parse_quoted_path(reply: &str) -> FtpResult<String> {
    let first_line = reply.lines().next().unwrap_or("");
    let body = first_line.get(4..).unwrap_or("");

    let start = body
        .find('"')
        .ok_or_else(|| FtpError::parse(format!("No quoted path in reply: {}", first_line)))?;

    let mut path = String::new();
    let mut chars = body[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
                continue;
            }
            return Ok(path);
        }
        path.push(c);
    }

    Err(FtpError::parse(format!(
        "Unterminated quoted path in reply: {}",
        first_line
    )))
}

// ─── MLSD parser ─────────────────────────────────────────────────────

/// Parse one MLSD line: `fact1=val1;fact2=val2; name\r\n`.
///
/// Facts and name are separated by the first space; the terminator is
/// stripped from the name.
pub fn parse_mlsd_line(line: &str) -> FtpResult<DirectoryEntry> {
    let trimmed = line
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .trim_start();

    let (facts_str, name) = trimmed
        .split_once(' ')
        .ok_or_else(|| FtpError::parse(format!("Listing line has no name field: {:?}", line)))?;

    if name.is_empty() {
        return Err(FtpError::parse(format!("Listing line has an empty name: {:?}", line)));
    }

    let mut facts: HashMap<String, String> = HashMap::new();
    for fact in facts_str.split(';').filter(|f| !f.is_empty()) {
        let (key, value) = fact.split_once('=').ok_or_else(|| {
            FtpError::parse(format!("Malformed fact '{}' in listing line: {:?}", fact, line))
        })?;
        facts.insert(key.to_ascii_lowercase(), value.to_string());
    }

    let kind = facts
        .get("type")
        .map(|t| EntryKind::from_fact(t))
        .unwrap_or_else(|| EntryKind::Other(String::new()));

    Ok(DirectoryEntry {
        perm: facts.get("perm").cloned().unwrap_or_default(),
        kind,
        name: name.to_string(),
        facts,
    })
}

/// Parse MLSD timestamp: `YYYYMMDDHHmmSS[.fraction]`
pub fn parse_mlsd_time(s: &str) -> Option<DateTime<Utc>> {
    let base = s.get(..14)?;
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

impl DirectoryEntry {
    pub fn parse(line: &str) -> FtpResult<Self> {
        parse_mlsd_line(line)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// `size` fact, when present and numeric.
    pub fn size(&self) -> Option<u64> {
        self.facts.get("size").and_then(|v| v.parse().ok())
    }

    /// `modify` fact as UTC.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.facts.get("modify").and_then(|v| parse_mlsd_time(v))
    }
}
