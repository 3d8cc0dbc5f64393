//! Mailbox folders as listed by the server

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of the one folder every IMAP account has (RFC 3501).
pub const INBOX: &str = "INBOX";

/// A mailbox folder.
///
/// `path` is the server-canonical name used for SELECT; `name` is the
/// last segment of that path, suitable for display.
///
/// # Examples
///
/// ```
/// use webmail_bridge::Folder;
///
/// let folder = Folder::from_path("Work/Projects", Some("/"));
/// assert_eq!(folder.name, "Projects");
/// assert_eq!(folder.path, "Work/Projects");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    pub path: String,
}

impl Folder {
    /// Build a folder from its server path and hierarchy delimiter.
    #[must_use]
    pub fn from_path(path: impl Into<String>, delimiter: Option<&str>) -> Self {
        let path = path.into();
        let name = match delimiter {
            Some(delim) if !delim.is_empty() => path
                .rsplit(delim)
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or(&path)
                .to_string(),
            _ => path.clone(),
        };
        Self { name, path }
    }

    /// Whether this is the INBOX (matched case-insensitively).
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.path.eq_ignore_ascii_case(INBOX)
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
