use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a provider runs. Drives `prefer_local` ordering and offline gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locality {
    Local,
    Remote,
}

/// One logical request. Providers interpret the fields they understand and
/// ignore the rest.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    /// Traffic category, also used as the scheduler task kind ("ai", "ocr").
    pub kind: String,
    pub prompt: String,
    pub image: Option<Bytes>,
    pub model: Option<String>,
    /// System instruction for chat-style models.
    pub system: Option<String>,
    pub params: serde_json::Value,
}

impl ProviderRequest {
    pub fn ai(prompt: impl Into<String>) -> Self {
        Self {
            kind: "ai".to_string(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn ocr(image: Bytes) -> Self {
        Self {
            kind: "ocr".to_string(),
            image: Some(image),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Source {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// URL when present and non-empty, otherwise the title.
    pub fn dedup_key(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.title.as_deref().filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub provider: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Response {
    pub fn new(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            content: content.into(),
            confidence: None,
            sources: Vec::new(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Clamps into `[0, 1]`; non-finite values are dropped.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.is_finite().then(|| confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
