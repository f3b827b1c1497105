//! Render `Session::walk` output as an indented tree.
//!
//! ```text
//! ├───/sub
//! |   ├───a.txt
//! ```
//!
//! The renderer keeps the depth and directory of the previous file so a
//! directory header is printed once per run of files in that directory.
//! Hold it in the walk closure:
//!
//! ```no_run
//! # async fn demo(session: &mut ftpc::Session) -> ftpc::FtpResult<()> {
//! let mut tree = ftpc::TreeRenderer::new();
//! session
//!     .walk("/", |path, _| {
//!         for line in tree.record(path) {
//!             println!("{}", line);
//!         }
//!         Ok(())
//!     }, 5)
//!     .await
//! # }
//! ```

const INDENT: &str = "|   ";
const BRANCH: &str = "├───";

#[derive(Debug, Clone, Default)]
pub struct TreeRenderer {
    last_depth: Option<usize>,
    last_dir: String,
}

impl TreeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for the file at `path` (absolute, `/`-separated).
    pub fn record(&mut self, path: &str) -> Vec<String> {
        let depth = path.matches('/').count().saturating_sub(1);
        let (dir, name) = match path.rfind('/') {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };

        let mut lines = Vec::with_capacity(2);
        if self.last_depth != Some(depth) || self.last_dir != dir {
            lines.push(format!(
                "{}{}{}",
                INDENT.repeat(depth.saturating_sub(1)),
                BRANCH,
                dir
            ));
        }
        lines.push(format!("{}{}{}", INDENT.repeat(depth), BRANCH, name));

        self.last_depth = Some(depth);
        self.last_dir = dir.to_string();
        lines
    }
}
