//! Incremental decoder for the matcher event stream
//!
//! Frames are separated by a blank line. Each frame carries one `event:`
//! line and one or more `data:` lines whose payloads are joined by newlines.

use crate::error::{BackendError, BackendResult};
use crate::protocol::{EventDone, FileMatch};

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Matches(Vec<FileMatch>),
    Done(EventDone),
    /// A frame with an event name this client does not know
    Unknown(String),
}

/// Buffers partial frames across chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and return every complete frame.
    pub fn feed(&mut self, chunk: &[u8]) -> BackendResult<Vec<StreamEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(event) = decode_frame(as_text(&frame)?.trim_end_matches('\n'))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> BackendResult<Option<StreamEvent>> {
        let frame = std::mem::take(&mut self.buf);
        let frame = as_text(&frame)?.trim_matches('\n');
        if frame.is_empty() {
            return Ok(None);
        }
        decode_frame(frame)
    }
}

fn as_text(bytes: &[u8]) -> BackendResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| BackendError::Protocol(format!("invalid utf-8 in stream: {e}")))
}

fn decode_frame(frame: &str) -> BackendResult<Option<StreamEvent>> {
    let mut name = None;
    let mut data: Vec<&str> = Vec::new();
    for line in frame.lines() {
        if let Some(v) = line.strip_prefix("event:") {
            name = Some(v.trim());
        } else if let Some(v) = line.strip_prefix("data:") {
            data.push(v.strip_prefix(' ').unwrap_or(v));
        }
    }
    let Some(name) = name else {
        return Ok(None);
    };
    let payload = data.join("\n");
    let event = match name {
        "matches" => StreamEvent::Matches(serde_json::from_str(&payload)?),
        "done" => StreamEvent::Done(serde_json::from_str(&payload)?),
        other => StreamEvent::Unknown(other.to_string()),
    };
    Ok(Some(event))
}

/// Encode matches as a frame, as the matcher service writes them.
pub fn encode_matches(matches: &[FileMatch]) -> BackendResult<String> {
    Ok(format!("event: matches\ndata: {}\n\n", serde_json::to_string(matches)?))
}

/// Encode the terminal frame.
pub fn encode_done(done: &EventDone) -> BackendResult<String> {
    Ok(format!("event: done\ndata: {}\n\n", serde_json::to_string(done)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<FileMatch> {
        vec![FileMatch {
            path: "main.go".into(),
            line_matches: vec![],
            match_count: 1,
            limit_hit: false,
        }]
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let body = format!(
            "{}{}",
            encode_matches(&sample()).unwrap(),
            encode_done(&EventDone::default()).unwrap()
        );
        let (a, b) = body.as_bytes().split_at(17);

        let mut dec = StreamDecoder::new();
        let mut events = dec.feed(a).unwrap();
        assert!(events.is_empty());
        events.extend(dec.feed(b).unwrap());

        assert_eq!(
            events,
            vec![
                StreamEvent::Matches(sample()),
                StreamEvent::Done(EventDone::default())
            ]
        );
        assert_eq!(dec.finish().unwrap(), None);
    }

    #[test]
    fn test_unterminated_final_frame() {
        let mut dec = StreamDecoder::new();
        let events = dec
            .feed(b"event: done\ndata: {\"limit_hit\":true,\"error\":\"\"}")
            .unwrap();
        assert!(events.is_empty());
        match dec.finish().unwrap() {
            Some(StreamEvent::Done(d)) => assert!(d.limit_hit),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_and_bad_json() {
        let mut dec = StreamDecoder::new();
        let events = dec.feed(b"event: progress\ndata: 1\n\n").unwrap();
        assert_eq!(events, vec![StreamEvent::Unknown("progress".into())]);
        assert!(dec.feed(b"event: matches\ndata: nope\n\n").is_err());
    }
}
