use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RecognitionError;
use crate::provider::{Locality, Provider, ProviderRequest, Response, DEFAULT_CONFIDENCE};

use super::hybrid::{HybridRouter, RouteOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizeOptions {
    /// Language hint, e.g. "eng" or "chi_sim".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RecognizeOptions {
    fn from_params(params: &serde_json::Value) -> Self {
        serde_json::from_value(params.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Local OCR engine.
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
    ) -> anyhow::Result<Recognition>;
}

/// Exposes a [`Recognizer`] as a local [`Provider`] so it can act as the
/// offline backend of a [`HybridRouter`].
pub struct RecognizerProvider {
    recognizer: Arc<dyn Recognizer>,
}

impl RecognizerProvider {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl Provider for RecognizerProvider {
    fn name(&self) -> &str {
        self.recognizer.name()
    }

    fn locality(&self) -> Locality {
        Locality::Local
    }

    async fn send_request(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Response> {
        let image = request
            .image
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ocr request carries no image"))?;
        let options = RecognizeOptions::from_params(&request.params);

        let recognition = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("recognition cancelled"),
            res = self.recognizer.recognize(image, &options) => res?,
        };

        let mut response = Response::new(self.name(), recognition.text)
            .with_confidence(recognition.confidence);
        if let Some(language) = recognition.language {
            response = response.with_metadata("language", language);
        }
        Ok(response)
    }
}

/// Decodes a base64 image as handed over by screenshot and clipboard
/// sources. A `data:image/...;base64,` prefix is stripped first.
pub fn decode_image_payload(input: &str) -> Result<Bytes, RecognitionError> {
    let input = input.trim();
    let encoded = match input.find(',') {
        Some(idx) if input.starts_with("data:") => &input[idx + 1..],
        _ => input,
    };
    if encoded.is_empty() {
        return Err(RecognitionError::InvalidImage("empty image data".to_string()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|err| RecognitionError::InvalidImage(err.to_string()))
}

impl HybridRouter {
    /// Routes an OCR request through the offline/online state machine.
    pub async fn recognize(
        &self,
        image: Bytes,
        options: &RecognizeOptions,
        route: &RouteOptions,
    ) -> Result<Recognition, RecognitionError> {
        let mut request = ProviderRequest::ocr(image);
        request.params = serde_json::to_value(options).unwrap_or_default();

        let response = self.route(&request, route).await?;
        Ok(Recognition {
            language: response
                .metadata
                .get("language")
                .cloned()
                .or_else(|| options.language.clone()),
            confidence: response.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            text: response.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixed;

    #[async_trait]
    impl Recognizer for Fixed {
        fn name(&self) -> &str {
            "tesseract"
        }

        async fn recognize(
            &self,
            image: &[u8],
            options: &RecognizeOptions,
        ) -> anyhow::Result<Recognition> {
            Ok(Recognition {
                text: format!("{} bytes", image.len()),
                confidence: 0.92,
                language: options.language.clone(),
            })
        }
    }

    #[tokio::test]
    async fn adapter_carries_language_in_metadata() {
        let provider = RecognizerProvider::new(Arc::new(Fixed));
        let mut request = ProviderRequest::ocr(Bytes::from_static(b"abcd"));
        request.params = serde_json::json!({ "language": "eng" });

        let response = provider
            .send_request(&request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.provider, "tesseract");
        assert_eq!(response.content, "4 bytes");
        assert_eq!(response.confidence, Some(0.92));
        assert_eq!(response.metadata.get("language").map(String::as_str), Some("eng"));
        assert_eq!(provider.locality(), Locality::Local);
    }

    #[test]
    fn decodes_data_urls_and_bare_base64() {
        assert_eq!(
            decode_image_payload("data:image/png;base64,cG5n").unwrap(),
            Bytes::from_static(b"png")
        );
        assert_eq!(
            decode_image_payload("  cG5n\n").unwrap(),
            Bytes::from_static(b"png")
        );
        assert!(matches!(
            decode_image_payload("data:image/png;base64,"),
            Err(RecognitionError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_image_payload("not base64!"),
            Err(RecognitionError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn adapter_rejects_missing_image() {
        let provider = RecognizerProvider::new(Arc::new(Fixed));
        let err = provider
            .send_request(&ProviderRequest::ai("no image"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no image"));
    }
}
