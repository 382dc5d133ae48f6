use crate::config::Provider;
use crate::error::LlmError;
use crate::prompts::ChatPrompt;
use crate::traits::{LanguageModel, TextStream};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions endpoint of OpenAI or an Azure OpenAI deployment.
pub struct HttpChatModel {
    client: Client,
    provider: Provider,
    model: String,
    params: GenerationParams,
}

impl HttpChatModel {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self::with_params(provider, model, GenerationParams::default())
    }

    pub fn with_params(provider: Provider, model: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            client: Client::new(),
            provider,
            model: model.into(),
            params,
        }
    }

    async fn send(&self, prompt: &ChatPrompt, stream: bool) -> Result<Response, LlmError> {
        let url = self.provider.chat_url(&self.model)?;
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            stream,
        };

        debug!(model = %self.model, stream, prompt_chars = prompt.user.len(), "calling chat model");
        let response = self
            .provider
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse {
                backend: self.provider.name().to_string(),
                details: format!("chat request returned {status}: {details}"),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        let response: ChatResponse = self.send(prompt, false).await?.json().await?;
        first_message(response)
    }

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TextStream, LlmError> {
        let response = self.send(prompt, true).await?;
        Ok(decode_event_stream(response.bytes_stream().boxed()))
    }
}

/// Text of the first choice. A missing or null content is an error rather
/// than an empty answer.
fn first_message(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedOutput("response had no choices".to_string()))?;
    choice
        .message
        .content
        .ok_or_else(|| LlmError::MalformedOutput("response message has no content".to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
}

/// Parses one server-sent-events line of a streamed chat completion.
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, LlmError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };

    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|error| LlmError::Stream(format!("invalid stream chunk: {error}")))?;
    let delta = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect::<String>();

    if delta.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Delta(delta)))
    }
}

/// Splits raw bytes into lines. Bytes are buffered until a full line is
/// available so multi-byte characters split across reads stay intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, LlmError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub(crate) fn finish(&mut self) -> Result<Vec<SseEvent>, LlmError> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(parse_sse_line(&String::from_utf8_lossy(&rest))?
            .into_iter()
            .collect())
    }
}

struct DecodeState<E> {
    bytes: BoxStream<'static, Result<Vec<u8>, E>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<E> DecodeState<E> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => self.finished = true,
            }
        }
    }
}

pub(crate) fn decode_event_stream<B, E>(bytes: BoxStream<'static, Result<B, E>>) -> TextStream
where
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let state = DecodeState {
        bytes: bytes.map(|chunk| chunk.map(|bytes| bytes.as_ref().to_vec())).boxed(),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Ok::<_, LlmError>(Some((delta, state)));
            }
            if state.finished {
                return Ok(None);
            }

            match state.bytes.next().await {
                Some(chunk) => {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(error) => return Err(error.into()),
                    };
                    let events = state.decoder.feed(&chunk)?;
                    state.absorb(events);
                }
                None => {
                    let events = state.decoder.finish()?;
                    state.absorb(events);
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn sse_lines_yield_content_deltas() {
        let line = r#"data: {"choices":[{"delta":{"content":"Doce"}}]}"#;
        assert_eq!(
            parse_sse_line(line).expect("line parses"),
            Some(SseEvent::Delta("Doce".to_string()))
        );
        assert_eq!(parse_sse_line("data: [DONE]").expect("line parses"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(": keep-alive").expect("line parses"), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).expect("line parses"),
            None
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#).expect("line parses"), None);
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn decoder_keeps_split_multibyte_characters() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"licitación\"}}]}\n";
        let bytes = payload.as_bytes();
        let split = payload.find('ó').expect("accent present") + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(&bytes[..split]).expect("partial feed").is_empty());
        let events = decoder.feed(&bytes[split..]).expect("second feed");
        assert_eq!(events, vec![SseEvent::Delta("licitación".to_string())]);
    }

    #[tokio::test]
    async fn event_stream_stops_at_done() {
        let chunks: Vec<Result<Vec<u8>, LlmError>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"El plazo \"}}]}\n\ndata: {\"choi".to_vec()),
            Ok(b"ces\":[{\"delta\":{\"content\":\"es de doce meses.\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n".to_vec()),
        ];

        let text = decode_event_stream(stream::iter(chunks).boxed())
            .try_collect::<Vec<_>>()
            .await
            .expect("stream decodes");
        assert_eq!(text, vec!["El plazo ", "es de doce meses."]);
    }

    #[tokio::test]
    async fn transport_errors_surface_in_the_stream() {
        let chunks: Vec<Result<Vec<u8>, LlmError>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(LlmError::Stream("connection reset".to_string())),
        ];

        let mut stream = decode_event_stream(stream::iter(chunks).boxed());
        assert_eq!(stream.next().await.and_then(Result::ok), Some("a".to_string()));
        assert!(matches!(stream.next().await, Some(Err(LlmError::Stream(_)))));
    }

    #[test]
    fn request_body_omits_stream_flag_when_blocking() -> Result<(), serde_json::Error> {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                Message {
                    role: "system",
                    content: "s",
                },
                Message {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
        };
        let json = serde_json::to_value(&body)?;
        assert!(json.get("stream").is_none());
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["messages"][1]["role"], "user");
        Ok(())
    }

    #[test]
    fn blocking_reply_needs_message_content() -> Result<(), serde_json::Error> {
        let answered: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"12 meses"}}]}"#)?;
        assert!(matches!(first_message(answered), Ok(text) if text == "12 meses"));

        let null_content: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)?;
        assert!(matches!(first_message(null_content), Err(LlmError::MalformedOutput(_))));

        let refusal: ChatResponse = serde_json::from_str(r#"{"choices":[{"message":{"refusal":"no"}}]}"#)?;
        assert!(matches!(first_message(refusal), Err(LlmError::MalformedOutput(_))));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#)?;
        assert!(matches!(first_message(empty), Err(LlmError::MalformedOutput(_))));
        Ok(())
    }
}
