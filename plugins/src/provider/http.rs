use std::{error::Error as StdError, fmt, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lumen_core::config::{HealthMethod, HttpProviderConfig};
use lumen_core::provider::{Locality, Provider, ProviderRequest, Response, Source};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderHttpErrorKind {
    Timeout,
    Network,
    Request,
    Body,
    Status,
    Unknown,
}

impl ProviderHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Request => "request",
            Self::Body => "body",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport or status failure. The rendered message carries the kind and
/// HTTP status so the orchestrator can classify it as transient.
#[derive(Debug)]
pub struct ProviderHttpError {
    kind: ProviderHttpErrorKind,
    status: Option<u16>,
    url: String,
    message: String,
    source: Option<reqwest::Error>,
}

impl ProviderHttpError {
    pub fn kind(&self) -> ProviderHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            ProviderHttpErrorKind::Timeout
        } else if err.is_connect() {
            ProviderHttpErrorKind::Network
        } else if err.is_request() {
            ProviderHttpErrorKind::Request
        } else if err.is_body() || err.is_decode() {
            ProviderHttpErrorKind::Body
        } else {
            ProviderHttpErrorKind::Unknown
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    fn status_error(status: u16, url: &str, preview: String) -> Self {
        Self {
            kind: ProviderHttpErrorKind::Status,
            status: Some(status),
            url: url.to_string(),
            message: preview,
            source: None,
        }
    }
}

impl fmt::Display for ProviderHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        write!(f, " url={}: {}", self.url, self.message)
    }
}

impl StdError for ProviderHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

/// Generic JSON endpoint provider.
///
/// Request body: `{prompt, kind, model, params, stream: false, system?, image?}`
/// with the image base64-encoded, which an Ollama `/api/generate` endpoint
/// accepts as is. The answer is taken from `text`, `content`, `response`,
/// `stdout` or an OpenAI-style `choices[0].message.content`; non-JSON bodies
/// are used verbatim.
pub struct HttpProvider {
    name: String,
    url: String,
    health_url: String,
    health_method: HealthMethod,
    api_key: String,
    model: Option<String>,
    system_prompt: Option<String>,
    locality: Locality,
    http: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &HttpProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            health_url: config
                .health_url
                .clone()
                .unwrap_or_else(|| config.url.clone()),
            health_method: config.health_method,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            locality: if config.local {
                Locality::Local
            } else {
                Locality::Remote
            },
            http,
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    fn payload(&self, request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "prompt": request.prompt,
            "kind": request.kind,
            "model": request.model.as_ref().or(self.model.as_ref()),
            "params": request.params,
            "stream": false,
        });
        if let Some(system) = request.system.as_ref().or(self.system_prompt.as_ref()) {
            payload["system"] = Value::String(system.clone());
        }
        if let Some(image) = &request.image {
            payload["image"] = Value::String(base64::engine::general_purpose::STANDARD.encode(image));
        }
        payload
    }

    async fn execute(&self, request: &ProviderRequest) -> Result<Response> {
        tracing::debug!(
            target: "lumen.http",
            provider = %self.name,
            url = %self.url,
            kind = %request.kind,
            prompt_len = request.prompt.len(),
            "provider request"
        );
        let req = self.http.post(&self.url).json(&self.payload(request));
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| ProviderHttpError::from_reqwest(err, &self.url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| ProviderHttpError::from_reqwest(err, &self.url))?;
        tracing::debug!(target: "lumen.http", provider = %self.name, status = %status, "provider response");

        if !status.is_success() {
            return Err(
                ProviderHttpError::status_error(status.as_u16(), &self.url, preview_body(&body))
                    .into(),
            );
        }
        Ok(self.parse_body(&body))
    }

    fn parse_body(&self, body: &str) -> Response {
        let Ok(v) = serde_json::from_str::<Value>(body) else {
            return Response::new(&self.name, body.trim_end());
        };

        let content = extract_textish(&v).unwrap_or_else(|| v.to_string());
        let mut response = Response::new(&self.name, content);
        if let Some(c) = v.get("confidence").and_then(Value::as_f64) {
            response = response.with_confidence(c);
        }
        if let Some(sources) = v.get("sources") {
            match serde_json::from_value::<Vec<Source>>(sources.clone()) {
                Ok(sources) => response = response.with_sources(sources),
                Err(err) => {
                    tracing::warn!(target: "lumen.http", provider = %self.name, error = %err, "ignoring malformed sources")
                }
            }
        }
        if let Some(lang) = v.get("language").and_then(Value::as_str) {
            response = response.with_metadata("language", lang);
        }
        response
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> Locality {
        self.locality
    }

    async fn is_available(&self) -> bool {
        match self.health_method {
            HealthMethod::Head => self
                .auth(self.http.head(&self.health_url))
                .send()
                .await
                .is_ok(),
            HealthMethod::Get => self
                .auth(self.http.get(&self.health_url))
                .send()
                .await
                .is_ok_and(|resp| resp.status().is_success()),
        }
    }

    async fn send_request(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => anyhow::bail!("request to {} cancelled", self.name),
            res = self.execute(request) => res,
        }
    }
}

fn extract_textish(v: &Value) -> Option<String> {
    for key in ["text", "content", "response", "stdout"] {
        if let Some(s) = v.get(key).and_then(|x| x.as_str()) {
            return Some(s.to_string());
        }
    }
    // OpenAI-ish: { choices: [ { message: { content: "..." } } ] }
    v.get("choices")
        .and_then(|x| x.get(0))
        .and_then(|x| x.get("message"))
        .and_then(|x| x.get("content"))
        .and_then(|x| x.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::provider::is_retryable_error;
    use pretty_assertions::assert_eq;

    fn provider(url: String) -> HttpProvider {
        HttpProvider::new(&HttpProviderConfig {
            name: "cloud".to_string(),
            url,
            api_key: "secret".to_string(),
            model: Some("small".to_string()),
            timeout_ms: 5_000,
            local: false,
            health_url: None,
            health_method: HealthMethod::Head,
            system_prompt: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn parses_json_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/complete")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::PartialJson(json!({
                "prompt": "hi",
                "model": "small",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"text":"hello","confidence":0.75,"sources":[{"title":"Rust","url":"https://rust-lang.org"}]}"#,
            )
            .create_async()
            .await;

        let p = provider(format!("{}/v1/complete", server.url()));
        let response = p
            .send_request(&ProviderRequest::ai("hi"), CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.provider, "cloud");
        assert_eq!(response.content, "hello");
        assert_eq!(response.confidence, Some(0.75));
        assert_eq!(response.sources.len(), 1);
        assert_eq!(p.locality(), Locality::Remote);
    }

    #[tokio::test]
    async fn plain_text_and_openai_shapes() {
        let mut server = mockito::Server::new_async().await;
        let _plain = server
            .mock("POST", "/plain")
            .with_status(200)
            .with_body("just text\n")
            .create_async()
            .await;
        let _chat = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"from choices"}}]}"#)
            .create_async()
            .await;

        let req = ProviderRequest::ai("hi");
        let plain = provider(format!("{}/plain", server.url()))
            .send_request(&req, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plain.content, "just text");

        let chat = provider(format!("{}/chat", server.url()))
            .send_request(&req, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(chat.content, "from choices");
    }

    #[tokio::test]
    async fn ollama_generate_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "llama3",
                "prompt": "hi",
                "system": "answer briefly",
                "stream": false,
            })))
            .with_status(200)
            .with_body(r#"{"model":"llama3","response":"hello","done":true}"#)
            .create_async()
            .await;

        let p = HttpProvider::new(&HttpProviderConfig {
            name: "ollama".to_string(),
            url: format!("{}/api/generate", server.url()),
            api_key: String::new(),
            model: Some("llama3".to_string()),
            timeout_ms: 5_000,
            local: true,
            health_url: None,
            health_method: HealthMethod::Get,
            system_prompt: Some("answer briefly".to_string()),
        })
        .unwrap();
        let response = p
            .send_request(&ProviderRequest::ai("hi"), CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hello");
        assert_eq!(p.locality(), Locality::Local);
    }

    #[test]
    fn request_system_prompt_overrides_configured_one() {
        let mut p = provider("http://localhost/v1".to_string());
        p.system_prompt = Some("default".to_string());
        let payload = p.payload(&ProviderRequest::ai("hi").with_system("custom"));
        assert_eq!(payload["system"], "custom");
        assert_eq!(payload["stream"], false);

        p.system_prompt = None;
        assert!(p.payload(&ProviderRequest::ai("hi")).get("system").is_none());
    }

    #[tokio::test]
    async fn get_health_check_requires_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[]}"#)
            .create_async()
            .await;
        let _down = server
            .mock("GET", "/down")
            .with_status(500)
            .create_async()
            .await;

        let mut p = provider(format!("{}/api/generate", server.url()));
        p.health_method = HealthMethod::Get;
        p.health_url = format!("{}/api/tags", server.url());
        assert!(p.is_available().await);

        p.health_url = format!("{}/down", server.url());
        assert!(!p.is_available().await);

        // HEAD treats any answer as reachable.
        p.health_method = HealthMethod::Head;
        let _head = server
            .mock("HEAD", "/down")
            .with_status(500)
            .create_async()
            .await;
        assert!(p.is_available().await);
    }

    #[tokio::test]
    async fn status_errors_classify_by_code() {
        let mut server = mockito::Server::new_async().await;
        let _busy = server
            .mock("POST", "/busy")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;
        let _denied = server
            .mock("POST", "/denied")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let req = ProviderRequest::ai("hi");
        let busy = provider(format!("{}/busy", server.url()))
            .send_request(&req, CancellationToken::new())
            .await
            .unwrap_err();
        let msg = format!("{busy:#}");
        assert!(msg.contains("status=503"), "{msg}");
        assert!(is_retryable_error(&msg));

        let denied = provider(format!("{}/denied", server.url()))
            .send_request(&req, CancellationToken::new())
            .await
            .unwrap_err();
        let msg = format!("{denied:#}");
        assert!(msg.contains("invalid api key"), "{msg}");
        assert!(!is_retryable_error(&msg));
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let server = mockito::Server::new_async().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider(format!("{}/never", server.url()))
            .send_request(&ProviderRequest::ai("hi"), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn image_is_base64_encoded() {
        let p = provider("http://localhost/ocr".to_string());
        let payload = p.payload(&ProviderRequest::ocr(bytes::Bytes::from_static(b"png")));
        assert_eq!(payload["image"], "cG5n");
        assert_eq!(payload["kind"], "ocr");
    }
}
