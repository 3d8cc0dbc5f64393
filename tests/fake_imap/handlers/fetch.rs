//! FETCH command handler.
//!
//! Message bodies go out as **counted literals**:
//!
//! ```text
//! * <seq> FETCH (UID <uid> BODY[] {<length>}
//! <exactly length bytes of raw RFC 5322 message>
//! )
//! ```
//!
//! Sequence numbers are 1-based positions within the folder
//! (RFC 3501 Section 2.3.1.2). Ranges and `*` are resolved against the
//! folder size; numbers past the end are ignored.

use crate::fake_imap::io::{write_bytes, write_line};
use crate::fake_imap::mailbox::Mailbox;
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

fn resolve(bound: &SeqOrUid, last: u32) -> u32 {
    match bound {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => last,
    }
}

/// Expand a sequence set into ascending, in-range sequence numbers.
fn sequence_numbers(seq_set: &SequenceSet, len: usize) -> Vec<u32> {
    let last = u32::try_from(len).unwrap_or(u32::MAX);
    let mut out: Vec<u32> = seq_set
        .0
        .as_ref()
        .iter()
        .flat_map(|seq| {
            let (a, b) = match seq {
                Sequence::Single(s) => (resolve(s, last), resolve(s, last)),
                Sequence::Range(a, b) => (resolve(a, last), resolve(b, last)),
            };
            a.min(b)..=a.max(b)
        })
        .filter(|n| (1..=last).contains(n))
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

pub async fn handle_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    for seq in sequence_numbers(sequence_set, folder.emails.len()) {
        let email = &folder.emails[seq as usize - 1];
        let header = format!(
            "* {seq} FETCH (UID {} BODY[] {{{}}}\r\n",
            email.uid,
            email.raw.len()
        );
        if write_line(stream, &header).await.is_err()
            || write_bytes(stream, &email.raw).await.is_err()
            || write_line(stream, ")\r\n").await.is_err()
        {
            return;
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;
    use tokio::io::BufReader;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    fn value(n: u32) -> SeqOrUid {
        SeqOrUid::Value(NonZeroU32::new(n).unwrap())
    }

    fn set(seq: Sequence) -> SequenceSet {
        SequenceSet(vec![seq].try_into().unwrap())
    }

    async fn run(
        tag: &str,
        sequence_set: &SequenceSet,
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(8192);
        let mut stream = BufReader::new(server);

        handle_fetch(tag, sequence_set, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn fetches_single_message_as_literal() {
        let mailbox = MailboxBuilder::new().folder("INBOX").email(42, RAW).build();

        let output = run("A1", &set(Sequence::Single(value(1))), &mailbox, Some("INBOX")).await;

        let header = format!("* 1 FETCH (UID 42 BODY[] {{{}}}\r\n", RAW.len());
        assert!(output.starts_with(&header));
        assert!(output.contains("From: a@b.com"));
        assert!(output.ends_with("A1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn range_returns_messages_in_order() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(10, RAW)
            .email(11, RAW)
            .email(12, RAW)
            .build();

        let output = run(
            "A1",
            &set(Sequence::Range(value(2), SeqOrUid::Asterisk)),
            &mailbox,
            Some("INBOX"),
        )
        .await;

        assert!(!output.contains("UID 10 "));
        let second = output.find("* 2 FETCH (UID 11").unwrap();
        let third = output.find("* 3 FETCH (UID 12").unwrap();
        assert!(second < third);
    }

    #[tokio::test]
    async fn out_of_range_returns_only_ok() {
        let mailbox = MailboxBuilder::new().folder("INBOX").email(1, RAW).build();

        let output = run("A1", &set(Sequence::Single(value(9))), &mailbox, Some("INBOX")).await;

        assert_eq!(output, "A1 OK FETCH completed\r\n");
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let output = run("A1", &set(Sequence::Single(value(1))), &mailbox, None).await;

        assert!(output.contains("A1 BAD No folder selected"));
    }
}
