use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use lumen_core::config::CommandProviderConfig;
use lumen_core::provider::{Locality, Provider, ProviderRequest, Response};

const STDERR_TAIL_LIMIT: usize = 512;

/// Runs a local binary per request: the image (OCR) or prompt on stdin,
/// the answer on stdout. The child is killed when the attempt is cancelled
/// or times out.
pub struct CommandProvider {
    name: String,
    program: String,
    args: Vec<String>,
    envs: HashMap<String, String>,
    locality: Locality,
}

impl CommandProvider {
    pub fn new(config: &CommandProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            program: config.program.clone(),
            args: config.args.clone(),
            envs: config.envs.clone(),
            locality: if config.local {
                Locality::Local
            } else {
                Locality::Remote
            },
        }
    }

    async fn run(&self, request: &ProviderRequest) -> Result<Response> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(model) = &request.model {
            cmd.env("LUMEN_MODEL", model);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        tracing::debug!(target: "lumen.orchestrator", provider = %self.name, pid = child.id(), "command started");

        // Fed from its own task: a child that streams output while it reads
        // would otherwise fill stdout and stall the write.
        let feeder = child.stdin.take().map(|mut stdin| {
            let input = match &request.image {
                Some(image) => image.clone(),
                None => Bytes::from(request.prompt.clone()),
            };
            tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .trim()
                .chars()
                .rev()
                .take(STDERR_TAIL_LIMIT)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            anyhow::bail!(
                "{} exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                tail
            );
        }
        if let Some(feeder) = feeder {
            match feeder.await? {
                Ok(()) => {}
                // The child may exit successfully without draining stdin.
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("writing stdin of {}", self.program))
                }
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Response::new(&self.name, stdout.trim_end()))
    }
}

#[async_trait]
impl Provider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> Locality {
        self.locality
    }

    /// Only paths can be checked up front; bare program names are resolved
    /// at spawn time.
    async fn is_available(&self) -> bool {
        let path = Path::new(&self.program);
        if path.components().count() > 1 {
            path.exists()
        } else {
            true
        }
    }

    async fn send_request(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => anyhow::bail!("{} cancelled", self.name),
            res = self.run(request) => res,
        }
    }
}
