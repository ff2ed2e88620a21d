use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const TRUNCATION_SUFFIX: &str = "\n\n... (Response truncated)";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage { pub role: String, pub content: String }

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: "system".into(), content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: "user".into(), content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: "assistant".into(), content: content.into() } }
}

#[derive(Serialize)]
struct CompletionReq<'a> { model: &'a str, messages: &'a [ChatMessage], max_tokens: u32, temperature: f32 }

#[derive(Deserialize)]
struct CompletionResp { choices: Vec<Choice> }

#[derive(Deserialize)]
struct Choice { message: ReplyMessage }

#[derive(Deserialize)]
struct ReplyMessage { content: Option<String> }

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no API key found (set ${0})")]
    MissingApiKey(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode reply: {0}")]
    Decode(String),
    #[error("the service returned an empty reply")]
    EmptyReply,
    #[error("runtime: {0}")]
    Runtime(String),
}

lazy_static! {
    static ref TRANSIENT_BODY: Regex =
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused").unwrap();
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Connect(_) | AiError::Timeout | AiError::RateLimited(_) => true,
            AiError::Status { status, body } => matches!(status, 408 | 500..=599) || TRANSIENT_BODY.is_match(body),
            _ => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() { AiError::Timeout }
        else if e.is_connect() || e.is_request() { AiError::Connect(e.to_string()) }
        else if e.is_decode() { AiError::Decode(e.to_string()) }
        else { AiError::Connect(e.to_string()) }
    }
}

/// Messages a request worker sends back to the UI loop.
#[derive(Clone, Debug, PartialEq)]
pub enum AiEvent {
    Retrying { attempt: u32, max: u32 },
    Reply(String),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct AiClient {
    pub endpoint:        String,
    pub model:           String,
    pub api_key:         Option<String>,
    pub api_key_env:     String,
    pub temperature:     f32,
    pub max_retries:     u32,
    pub retry_delay:     Duration,
    pub timeout:         Duration,
    pub max_reply_chars: usize,
}

impl AiClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint:        config.endpoint.clone(),
            model:           config.model.clone(),
            api_key:         config.api_key(),
            api_key_env:     config.api_key_env.clone(),
            temperature:     config.temperature,
            max_retries:     config.max_retries,
            retry_delay:     Duration::from_millis(config.retry_delay_ms),
            timeout:         Duration::from_secs(config.request_timeout_secs),
            max_reply_chars: config.max_reply_chars,
        }
    }

    pub fn completions_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if base.ends_with("/chat/completions") { base.to_string() } else { format!("{base}/chat/completions") }
    }

    pub fn build_request(&self, client: &reqwest::Client, history: &[ChatMessage], max_tokens: u32) -> Result<reqwest::RequestBuilder, AiError> {
        let key = self.api_key.as_deref().ok_or_else(|| AiError::MissingApiKey(self.api_key_env.clone()))?;
        Ok(client.post(self.completions_url())
            .bearer_auth(key)
            .json(&CompletionReq { model: &self.model, messages: history, max_tokens, temperature: self.temperature }))
    }

    /// Runs the request on its own thread and reports through `tx`. Exactly one
    /// `Reply` or `Failed` is sent, possibly preceded by `Retrying` events.
    pub fn send_async(&self, history: Vec<ChatMessage>, max_tokens: u32, tx: Sender<AiEvent>) {
        let this = self.clone();
        thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build();
            let outcome = match rt {
                Err(e) => Err(AiError::Runtime(e.to_string())),
                Ok(rt) => rt.block_on(this.complete(&history, max_tokens, &tx)),
            };
            let event = match outcome {
                Ok(reply) => AiEvent::Reply(truncate_reply(&reply, this.max_reply_chars)),
                Err(e) => {
                    warn!("completion request failed: {e}");
                    AiEvent::Failed(format!("Error connecting to the completion service: {e}"))
                }
            };
            let _ = tx.send(event);
        });
    }

    async fn complete(&self, history: &[ChatMessage], max_tokens: u32, tx: &Sender<AiEvent>) -> Result<String, AiError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build().map_err(|e| AiError::Runtime(e.to_string()))?;
        let mut attempt = 0;
        loop {
            match self.call(&client, history, max_tokens).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!("completion request failed ({e}), retry {attempt}/{}", self.max_retries);
                    let _ = tx.send(AiEvent::Retrying { attempt, max: self.max_retries });
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call(&self, client: &reqwest::Client, history: &[ChatMessage], max_tokens: u32) -> Result<String, AiError> {
        debug!("POST {} model={} messages={} max_tokens={max_tokens}", self.completions_url(), self.model, history.len());
        let resp = self.build_request(client, history, max_tokens)?.send().await.map_err(AiError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(if status.as_u16() == 429 { AiError::RateLimited(body) } else { AiError::Status { status: status.as_u16(), body } });
        }
        let parsed = resp.json::<CompletionResp>().await.map_err(|e| AiError::Decode(e.to_string()))?;
        parsed.choices.into_iter().next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyReply)
    }
}

/// Shortens replies over `limit` characters, preferring to cut right after a sentence
/// end in the last fifth of the allowance.
pub fn truncate_reply(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit { return text.to_string(); }
    let floor = limit * 4 / 5;
    let cut = (floor + 1..=limit.min(chars.len() - 1)).rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?'))
        .map(|i| i + 1)
        .unwrap_or(limit);
    let mut out: String = chars[..cut].iter().collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    fn client(endpoint: &str) -> AiClient {
        AiClient {
            endpoint:        endpoint.into(),
            model:           "gpt-4".into(),
            api_key:         Some("sk-test".into()),
            api_key_env:     "TEST_KEY".into(),
            temperature:     0.7,
            max_retries:     2,
            retry_delay:     Duration::from_millis(5),
            timeout:         Duration::from_secs(5),
            max_reply_chars: 1000,
        }
    }

    #[test]
    fn short_replies_are_untouched() {
        assert_eq!(truncate_reply("hello.", 1000), "hello.");
    }

    #[test]
    fn long_replies_cut_at_a_sentence_end() {
        let text = format!("{}. {}", "a".repeat(900), "b".repeat(300));
        let out = truncate_reply(&text, 1000);
        assert_eq!(out, format!("{}.{}", "a".repeat(900), TRUNCATION_SUFFIX));
    }

    #[test]
    fn long_replies_without_sentence_end_cut_hard() {
        let out = truncate_reply(&"é".repeat(1500), 1000);
        assert_eq!(out.chars().count(), 1000 + TRUNCATION_SUFFIX.chars().count());
        assert!(out.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn early_sentence_ends_are_ignored() {
        let text = format!("{}!{}", "a".repeat(500), "b".repeat(800));
        let out = truncate_reply(&text, 1000);
        assert!(out.starts_with(&format!("{}!{}", "a".repeat(500), "b".repeat(499))));
        assert_eq!(out.chars().count(), 1000 + TRUNCATION_SUFFIX.chars().count());
    }

    #[test]
    fn retry_policy() {
        assert!(AiError::Timeout.is_retryable());
        assert!(AiError::RateLimited(String::new()).is_retryable());
        assert!(AiError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(AiError::Status { status: 400, body: "Service Unavailable".into() }.is_retryable());
        assert!(!AiError::Status { status: 401, body: "bad key".into() }.is_retryable());
        assert!(!AiError::MissingApiKey("X".into()).is_retryable());
        assert!(!AiError::EmptyReply.is_retryable());
    }

    #[test]
    fn request_targets_chat_completions() {
        let c = client("https://api.example.com/v1/");
        assert_eq!(c.completions_url(), "https://api.example.com/v1/chat/completions");
        let http = reqwest::Client::new();
        let req = c.build_request(&http, &[ChatMessage::user("hi")], 42).unwrap().build().unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.headers()["authorization"], "Bearer sk-test");
        let body: serde_json::Value = serde_json::from_slice(req.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 42);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn missing_key_is_reported() {
        let c = AiClient { api_key: None, ..client("http://localhost") };
        let err = c.build_request(&reqwest::Client::new(), &[], 1).unwrap_err();
        assert_eq!(err.to_string(), "no API key found (set $TEST_KEY)");
    }

    /// Serves one canned response per connection, in order.
    fn serve(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else { return };
                let mut reader = BufReader::new(stream);
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 { break; }
                    let lower = line.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") { content_length = v.trim().parse().unwrap_or(0); }
                    if line == "\r\n" { break; }
                }
                let mut body_in = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body_in);
                let mut stream = reader.into_inner();
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
            }
        });
        format!("http://{addr}/v1")
    }

    fn reply_body(text: &str) -> String {
        serde_json::json!({ "choices": [ { "message": { "role": "assistant", "content": text } } ] }).to_string()
    }

    fn collect(rx: crossbeam_channel::Receiver<AiEvent>) -> Vec<AiEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.recv_timeout(Duration::from_secs(10)) {
            let last = matches!(ev, AiEvent::Reply(_) | AiEvent::Failed(_));
            events.push(ev);
            if last { break; }
        }
        events
    }

    #[test]
    fn retries_transient_failures_then_replies() {
        let endpoint = serve(vec![(503, "{}".into()), (200, reply_body("  Follow the white rabbit.  "))]);
        let (tx, rx) = unbounded();
        client(&endpoint).send_async(vec![ChatMessage::user("hi")], 50, tx);
        assert_eq!(collect(rx), vec![
            AiEvent::Retrying { attempt: 1, max: 2 },
            AiEvent::Reply("Follow the white rabbit.".into()),
        ]);
    }

    #[test]
    fn gives_up_after_the_retry_budget() {
        let endpoint = serve(vec![(500, "{}".into()), (502, "{}".into()), (503, "{}".into())]);
        let (tx, rx) = unbounded();
        client(&endpoint).send_async(vec![ChatMessage::user("hi")], 50, tx);
        let events = collect(rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[2], AiEvent::Failed(msg) if msg.contains("HTTP 503")));
    }

    #[test]
    fn auth_failures_are_not_retried() {
        let endpoint = serve(vec![(401, r#"{"error":"invalid key"}"#.into())]);
        let (tx, rx) = unbounded();
        client(&endpoint).send_async(vec![ChatMessage::user("hi")], 50, tx);
        let events = collect(rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AiEvent::Failed(msg) if msg.contains("HTTP 401")));
    }
}
