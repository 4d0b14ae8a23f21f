use std::time::Duration;

use async_trait::async_trait;

use lumen_core::config::ConnectivityConfig;
use lumen_core::connectivity::ReachabilityProbe;
use lumen_core::error::ProbeError;

/// `HEAD` request against a stable endpoint. Any HTTP answer, whatever the
/// status, means the network is reachable.
pub struct HttpProbe {
    url: String,
    timeout_ms: u64,
    http: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: &ConnectivityConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.probe_timeout_ms))
            .build()?;
        Ok(Self {
            url: config.probe_url.clone(),
            timeout_ms: config.probe_timeout_ms,
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        match self.http.head(&self.url).send().await {
            Ok(resp) => {
                tracing::debug!(target: "lumen.connectivity", url = %self.url, status = %resp.status(), "probe answered");
                Ok(())
            }
            Err(err) if err.is_timeout() => Err(ProbeError::Timeout(self.timeout_ms)),
            Err(err) => Err(ProbeError::Request(err.to_string())),
        }
    }
}
