//! Test data model for the fake IMAP server
//!
//! Provides a builder-style API for constructing account state:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .password("testpass")
//!     .folder("INBOX")
//!         .email(1, raw_rfc5322_bytes)
//!         .email(2, raw_rfc5322_bytes)
//!     .folder("Work/Projects")
//!     .build();
//! ```
//!
//! The `Mailbox` is shared with the fake IMAP server via `Arc` so the
//! server knows which folders exist and what messages they hold, in
//! arrival order.

/// A complete account: named folders plus the server's login and
/// failure-injection settings.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
    /// Password LOGIN must present. `None` accepts anything.
    pub password: Option<String>,
    /// Drop the TCP connection instead of answering FETCH.
    pub drop_on_fetch: bool,
}

impl Mailbox {
    /// Look up a folder by path (case-sensitive, matching real IMAP).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }
}

/// A single IMAP folder, addressed by its full path.
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub emails: Vec<TestEmail>,
}

/// A message stored in a folder.
///
/// - `uid`: IMAP UID, unique within the folder.
/// - `raw`: the complete message source returned by `FETCH BODY[]`.
///
/// The position in `Folder::emails` is the 1-based sequence number minus
/// one, so emails must be added in arrival order.
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub raw: Vec<u8>,
}

/// Builder for constructing a `Mailbox` step by step.
pub struct MailboxBuilder {
    folders: Vec<Folder>,
    password: Option<String>,
    drop_on_fetch: bool,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
            password: None,
            drop_on_fetch: false,
        }
    }

    /// Only accept LOGIN with this password.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Hang up on the first FETCH.
    pub fn drop_on_fetch(mut self) -> Self {
        self.drop_on_fetch = true;
        self
    }

    /// Add a new folder. Subsequent `.email()` calls add to this folder.
    pub fn folder(mut self, name: &str) -> Self {
        self.folders.push(Folder {
            name: name.to_string(),
            emails: Vec::new(),
        });
        self
    }

    /// Add a message to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn email(mut self, uid: u32, raw: &[u8]) -> Self {
        self.folders
            .last_mut()
            .expect("call .folder() before .email()")
            .emails
            .push(TestEmail {
                uid,
                raw: raw.to_vec(),
            });
        self
    }

    /// Consume the builder and return the finished `Mailbox`.
    pub fn build(self) -> Mailbox {
        Mailbox {
            folders: self.folders,
            password: self.password,
            drop_on_fetch: self.drop_on_fetch,
        }
    }
}
