//! SELECT command handler.
//!
//! Opens a folder and reports `* N EXISTS`, which the client turns into
//! the sequence range of its recent-messages window.
//!
//! Returns the selected folder name (or `None` if not found).

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} NO [NONEXISTENT] Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return None;
    };

    // RFC 3501 Section 6.3.1: required FLAGS response
    let _ = write_line(
        stream,
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
    )
    .await;

    let exists = format!("* {} EXISTS\r\n", folder.emails.len());
    let _ = write_line(stream, &exists).await;
    let _ = write_line(stream, "* 0 RECENT\r\n").await;
    let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;

    let uidnext = folder
        .emails
        .iter()
        .map(|e| e.uid)
        .max()
        .map_or(1, |max| max + 1);
    let _ = write_line(stream, &format!("* OK [UIDNEXT {uidnext}]\r\n")).await;

    let resp = format!("{tag} OK [READ-WRITE] SELECT completed\r\n");
    let _ = write_line(stream, &resp).await;
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use tokio::io::BufReader;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    async fn run(tag: &str, folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_select(tag, folder_name, mailbox, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        (String::from_utf8(buf).unwrap(), selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, RAW)
            .email(2, RAW)
            .build();

        let (output, selected) = run("A1", "INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("A1 OK"));
    }

    #[tokio::test]
    async fn returns_none_for_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (output, selected) = run("A1", "NoSuchFolder", &mailbox).await;

        assert!(selected.is_none());
        assert!(output.starts_with("A1 NO"));
    }

    #[tokio::test]
    async fn uidnext_follows_highest_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, RAW)
            .email(10, RAW)
            .build();
        let (output, _) = run("A1", "INBOX", &mailbox).await;
        assert!(output.contains("* OK [UIDNEXT 11]"));
    }

    #[tokio::test]
    async fn empty_folder_reports_zero_exists() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (output, _) = run("A1", "INBOX", &mailbox).await;
        assert!(output.contains("* 0 EXISTS"));
        assert!(output.contains("* OK [UIDNEXT 1]"));
    }
}
