use futures::stream;
use futures::StreamExt;
use rowkeeper::sse::{decode_chat_events, SseDecoder, SseFrame};
use rowkeeper::ChatEvent;

fn frame(event: &str, data: &str) -> SseFrame {
  SseFrame { event: event.to_string(), data: data.to_string() }
}

#[test]
fn test_frame_split_across_chunks() {
  let mut decoder = SseDecoder::new();

  assert!(decoder.push(b"event: assistant_mes").is_empty());
  assert!(decoder.push(b"sage\ndata: {\"text\":").is_empty());
  let frames = decoder.push(b"\"hi\"}\n\n");

  assert_eq!(frames, vec![frame("assistant_message", r#"{"text":"hi"}"#)]);
}

#[test]
fn test_multibyte_character_split_mid_sequence() {
  let mut decoder = SseDecoder::new();
  let payload = "data: {\"text\":\"caf\u{e9} cr\u{e8}me\"}\n\n".as_bytes();
  // Split inside the two-byte encoding of 'é'
  let split = payload.iter().position(|byte| *byte == 0xC3).unwrap() + 1;

  assert!(decoder.push(&payload[..split]).is_empty());
  let frames = decoder.push(&payload[split..]);

  assert_eq!(frames.len(), 1);
  assert_eq!(frames[0].data, "{\"text\":\"caf\u{e9} cr\u{e8}me\"}");
}

#[test]
fn test_comments_and_crlf() {
  let mut decoder = SseDecoder::new();
  let frames = decoder.push(b": keep-alive\r\nevent: done\r\ndata: {}\r\n\r\n");
  assert_eq!(frames, vec![frame("done", "{}")]);
}

#[test]
fn test_multiline_data_and_default_event() {
  let mut decoder = SseDecoder::new();
  let frames = decoder.push(b"data: line one\ndata: line two\n\n");
  assert_eq!(frames, vec![frame("message", "line one\nline two")]);
}

#[test]
fn test_finish_flushes_unterminated_frame() {
  let mut decoder = SseDecoder::new();
  assert!(decoder.push(b"event: done\ndata: {}").is_empty());
  assert_eq!(decoder.finish(), Some(frame("done", "{}")));
  assert_eq!(decoder.finish(), None);
}

#[test]
fn test_blank_frame_without_data_is_ignored() {
  let mut decoder = SseDecoder::new();
  assert!(decoder.push(b"event: ping\n\n").is_empty());
}

#[tokio::test]
async fn test_decode_chat_events_over_byte_stream() {
  let body = concat!(
    "event: row_created\ndata: {\"row\":{\"id\":7,\"title\":\"standing desk\"}}\n\n",
    "event: heartbeat\ndata: {}\n\n",
    "event: search_results\ndata: {\"row_id\":7,\"results\":[{\"bid_id\":1,\"title\":\"Desk\"}],\"more_incoming\":false}\n\n",
    "event: search_results\ndata: {not json}\n\n",
    "event: done\ndata: {}\n\n",
  );
  let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
    body.as_bytes().chunks(13).map(|chunk| Ok(chunk.to_vec())).collect();

  let events: Vec<ChatEvent> =
    decode_chat_events(stream::iter(chunks)).map(|item| item.unwrap()).collect().await;

  assert_eq!(events.len(), 3);
  assert!(matches!(&events[0], ChatEvent::RowCreated { row } if row.id == 7 && row.title == "standing desk"));
  assert!(matches!(&events[1], ChatEvent::SearchResults(batch) if batch.results.len() == 1 && !batch.more_incoming));
  assert_eq!(events[2], ChatEvent::Done);
}

#[tokio::test]
async fn test_transport_error_ends_stream() {
  let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
    Ok(b"event: assistant_message\ndata: {\"text\":\"looking\"}\n\n".to_vec()),
    Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
    Ok(b"event: done\ndata: {}\n\n".to_vec()),
  ];

  let events: Vec<_> = decode_chat_events(stream::iter(chunks)).collect().await;

  assert_eq!(events.len(), 2);
  assert_eq!(events[0], Ok(ChatEvent::AssistantMessage { text: "looking".to_string() }));
  assert!(events[1].is_err());
}
