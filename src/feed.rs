//! Change-feed processing for realtime subscriptions.
//!
//! The backend delivers inserted rows over a long-lived
//! `text/event-stream` response: each event carries an `event:` line
//! naming the change kind and a `data:` line holding the row as JSON.
//! This module buffers the raw byte stream, splits it into events, and
//! decodes `insert` rows into the caller's typed record, failing fast
//! with a typed decode error when a row does not match the schema.
//!
//! A feed ends when the server closes the connection. There is no
//! reconnection logic; a consumer that wants fresh data re-subscribes.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::observability::{FEED_BYTES, FEED_ERRORS, FEED_EVENTS};

/// Outcome of parsing one buffered event.
enum Parsed<T> {
    /// An `insert` event carrying a decoded (or undecodable) row.
    Row(Result<T>),
    /// A keep-alive or unrelated event; nothing to yield.
    Skip,
}

/// Process a stream of bytes into a stream of inserted rows.
///
/// `origin` labels decode errors with the table the feed watches.
pub fn process_changes<T, S>(
    byte_stream: S,
    origin: impl Into<String>,
) -> impl Stream<Item = Result<T>>
where
    T: DeserializeOwned,
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    let origin = origin.into();

    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            FEED_ERRORS.click();
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        })
    });

    // Use a state machine to process the event stream
    let buffer = String::new();

    stream::unfold(
        (stream, buffer, origin),
        move |(mut stream, mut buffer, origin)| async move {
            loop {
                // First check if we have a complete event in the buffer
                if let Some((parsed, remaining)) = extract_event::<T>(&buffer, &origin) {
                    buffer = remaining;
                    match parsed {
                        Parsed::Row(row) => {
                            FEED_EVENTS.click();
                            return Some((row, (stream, buffer, origin)));
                        }
                        Parsed::Skip => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        FEED_BYTES.count(bytes.len() as u64);
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => buffer.push_str(&text),
                            Err(e) => {
                                FEED_ERRORS.click();
                                return Some((
                                    Err(Error::streaming(
                                        format!("Invalid UTF-8 in stream: {e}"),
                                        Some(Box::new(e)),
                                    )),
                                    (stream, buffer, origin),
                                ));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, origin)));
                    }
                    None => {
                        // End of stream; flush anything still buffered
                        if !buffer.is_empty() {
                            if let Some((Parsed::Row(row), _)) =
                                extract_event::<T>(&buffer, &origin)
                            {
                                buffer.clear();
                                FEED_EVENTS.click();
                                return Some((row, (stream, buffer, origin)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract a complete event from a buffer string.
///
/// Events are delimited by blank lines. Comment lines (leading `:`) are
/// keep-alives and ignored; only `insert` events carry rows.
fn extract_event<T: DeserializeOwned>(buffer: &str, origin: &str) -> Option<(Parsed<T>, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut kind = None;
    let mut data = None;
    for line in event_text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            kind = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data = Some(value.trim());
        }
    }

    // Rows only ride on insert events; everything else is control traffic.
    if kind.is_some_and(|k| !k.eq_ignore_ascii_case("insert")) {
        return Some((Parsed::Skip, rest));
    }

    match data {
        Some(json_str) => match serde_json::from_str::<T>(json_str) {
            Ok(row) => Some((Parsed::Row(Ok(row)), rest)),
            Err(e) => {
                FEED_ERRORS.click();
                Some((
                    Parsed::Row(Err(Error::decode(
                        format!("record failed schema validation: {e}"),
                        Some(origin.to_string()),
                    ))),
                    rest,
                ))
            }
        },
        None => Some((Parsed::Skip, rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    use crate::types::Message;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + use<> {
        let owned: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(owned)
    }

    fn row(id: &str, content: &str) -> String {
        format!(
            concat!(
                r#"{{"id":"{}","chat_id":"c1","sender_id":"u1","content":"{}","#,
                r#""created_at":"2024-05-01T12:00:00Z","attachment_url":null,"attachment_name":null}}"#
            ),
            id, content
        )
    }

    #[test]
    fn decodes_insert_events() {
        let body = format!("event: insert\ndata: {}\n\n", row("m1", "hello"));
        let feed = process_changes::<Message, _>(Box::pin(chunks(&[&body])), "messages");
        let rows: Vec<_> = block_on(feed.collect());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().id, "m1");
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let body = format!("event: insert\ndata: {}\n\n", row("m2", "split"));
        let (a, b) = body.split_at(17);
        let feed = process_changes::<Message, _>(Box::pin(chunks(&[a, b])), "messages");
        let rows: Vec<_> = block_on(feed.collect());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().content, "split");
    }

    #[test]
    fn skips_keepalives_and_foreign_events() {
        let body = format!(
            ": ping\n\nevent: system\ndata: {{}}\n\nevent: insert\ndata: {}\n\n",
            row("m3", "kept")
        );
        let feed = process_changes::<Message, _>(Box::pin(chunks(&[&body])), "messages");
        let rows: Vec<_> = block_on(feed.collect());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().id, "m3");
    }

    #[test]
    fn malformed_row_is_a_decode_error() {
        let body = "event: insert\ndata: {\"id\": 42}\n\n";
        let feed = process_changes::<Message, _>(Box::pin(chunks(&[body])), "messages");
        let rows: Vec<_> = block_on(feed.collect());
        assert_eq!(rows.len(), 1);
        let err = rows[0].as_ref().unwrap_err();
        assert!(err.is_decode(), "expected decode error, got {err}");
    }

    #[test]
    fn trailing_event_without_terminator_is_dropped() {
        let body = format!("event: insert\ndata: {}\n\n", row("m4", "tail"));
        let trimmed = body.trim_end_matches('\n');
        // Only one trailing newline: the closing blank line never arrives.
        let partial = format!("{trimmed}\n");
        let feed = process_changes::<Message, _>(Box::pin(chunks(&[&partial])), "messages");
        let rows: Vec<_> = block_on(feed.collect());
        assert!(rows.is_empty());
    }
}
