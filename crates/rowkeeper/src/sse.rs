//! Incremental server-sent-events decoder
//!
//! Network chunks split frames at arbitrary byte offsets, including in the
//! middle of a UTF-8 sequence, so bytes are buffered until a full line is
//! available.

use futures::stream::{self, Stream, StreamExt};

use crate::backend::ChatEventStream;
use crate::error::BackendError;
use crate::events::ChatEvent;

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
  pub event: String,
  pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
  buffer: Vec<u8>,
  event: Option<String>,
  data: Vec<String>,
}

impl SseDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed a chunk, returning every frame it completed
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.buffer.extend_from_slice(chunk);

    let mut frames = Vec::new();
    while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
      let line: Vec<u8> = self.buffer.drain(..=newline).collect();
      let mut text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
      if text.ends_with('\r') {
        text.pop();
      }
      if let Some(frame) = self.process_line(&text) {
        frames.push(frame);
      }
    }
    frames
  }

  /// Flush a trailing frame the server didn't terminate with a blank line
  pub fn finish(&mut self) -> Option<SseFrame> {
    if !self.buffer.is_empty() {
      let rest = std::mem::take(&mut self.buffer);
      let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
      if let Some(frame) = self.process_line(&line) {
        return Some(frame);
      }
    }
    self.dispatch()
  }

  fn process_line(&mut self, line: &str) -> Option<SseFrame> {
    if line.is_empty() {
      return self.dispatch();
    }
    if line.starts_with(':') {
      return None;
    }

    let (field, value) = match line.split_once(':') {
      Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
      None => (line, ""),
    };

    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => self.data.push(value.to_string()),
      _ => {}
    }
    None
  }

  fn dispatch(&mut self) -> Option<SseFrame> {
    let event = self.event.take();
    if self.data.is_empty() {
      return None;
    }
    let data = std::mem::take(&mut self.data).join("\n");
    Some(SseFrame { event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()), data })
  }
}

/// Decode frames into chat events. Frames with malformed payloads are logged
/// and skipped; transport errors are surfaced in-band.
pub fn frames_to_events(frames: Vec<SseFrame>) -> Vec<Result<ChatEvent, BackendError>> {
  frames
    .into_iter()
    .filter_map(|frame| match ChatEvent::from_frame(&frame.event, &frame.data) {
      Ok(event) => event.map(Ok),
      Err(err) => {
        tracing::warn!(event = %frame.event, error = %err, "dropping malformed chat event");
        None
      }
    })
    .collect()
}

struct DecodeState<S> {
  body: S,
  decoder: SseDecoder,
  finished: bool,
}

/// Turn a byte stream into a stream of chat events
pub fn decode_chat_events<S, B, E>(body: S) -> ChatEventStream
where
  S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
  B: AsRef<[u8]> + Send + 'static,
  E: std::fmt::Display + Send + 'static,
{
  let state = DecodeState { body, decoder: SseDecoder::new(), finished: false };

  stream::unfold(state, |mut state| async move {
    if state.finished {
      return None;
    }

    let batch = match state.body.next().await {
      Some(Ok(chunk)) => frames_to_events(state.decoder.push(chunk.as_ref())),
      Some(Err(err)) => {
        state.finished = true;
        vec![Err(BackendError::transport(err.to_string()))]
      }
      None => {
        state.finished = true;
        frames_to_events(state.decoder.finish().into_iter().collect())
      }
    };
    Some((stream::iter(batch), state))
  })
  .flatten()
  .boxed()
}
