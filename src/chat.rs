//! Streaming chat: server-sent events decoded into transcript fragments.

use iced::futures::channel::mpsc;
use iced::futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::check_status;

/// Payload that ends a reply.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Done,
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct FragmentPayload {
    #[serde(default)]
    content: Option<String>,
}

pub fn parse_event(data: &str) -> StreamEvent {
    let data = data.trim();
    if data == DONE_MARKER {
        return StreamEvent::Done;
    }
    match serde_json::from_str::<FragmentPayload>(data) {
        Ok(payload) => StreamEvent::Fragment(payload.content.unwrap_or_default()),
        Err(_) => StreamEvent::Malformed(data.to_string()),
    }
}

/// Incremental `text/event-stream` decoder. Feed raw chunks, get back the data
/// payload of each completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // comments, `event:`, `id:` and `retry:` lines carry nothing we use
        }
        events
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Fragment(String),
    Finished,
    Failed(String),
}

/// Open the chat stream for `message` and yield fragments until the terminal
/// marker or a transport error.
pub fn stream(url: String, message: String) -> impl Stream<Item = ChatEvent> {
    iced::stream::channel(100, |mut output: mpsc::Sender<ChatEvent>| async move {
        let request = reqwest::Client::new()
            .get(&url)
            .query(&[("message", message.as_str())])
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let _ = output.send(ChatEvent::Failed(err.to_string())).await;
                return;
            }
        };
        if let Err(err) = check_status(&url, response.status()) {
            let _ = output.send(ChatEvent::Failed(err.to_string())).await;
            return;
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = output.send(ChatEvent::Failed(err.to_string())).await;
                    return;
                }
            };
            for payload in decoder.feed(&chunk) {
                match parse_event(&payload) {
                    StreamEvent::Fragment(text) if text.is_empty() => {}
                    StreamEvent::Fragment(text) => {
                        let _ = output.send(ChatEvent::Fragment(text)).await;
                    }
                    StreamEvent::Done => {
                        let _ = output.send(ChatEvent::Finished).await;
                        return;
                    }
                    StreamEvent::Malformed(raw) => {
                        log::debug!("event=chat_fragment status=dropped bytes={}", raw.len());
                    }
                }
            }
        }
        let _ = output.send(ChatEvent::Finished).await;
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Transcript and input state of one chat card.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub messages: Vec<ChatMessage>,
    pub draft: String,
    pub streaming: bool,
}

impl ChatSession {
    /// Turn the draft into a user message. `None` while a reply is still
    /// streaming or when there is nothing to send.
    pub fn begin(&mut self) -> Option<String> {
        if self.streaming {
            return None;
        }
        let message = self.draft.trim().to_string();
        if message.is_empty() {
            return None;
        }
        self.draft.clear();
        self.messages.push(ChatMessage {
            role: Role::User,
            content: message.clone(),
        });
        self.streaming = true;
        Some(message)
    }

    pub fn push_fragment(&mut self, text: &str) {
        if !self.streaming {
            return;
        }
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => last.content.push_str(text),
            _ => self.messages.push(ChatMessage {
                role: Role::Assistant,
                content: text.to_string(),
            }),
        }
    }

    pub fn finish(&mut self) {
        self.streaming = false;
    }
}

pub type ChatSessions = HashMap<String, ChatSession>;
