// src/units/http.rs

//! Producer that fetches a URL and stores the response body.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::errors::{Result, StagedagError, TaskError};
use crate::events::Event;
use crate::storage::{ArtifactRef, StagingArea};

use super::{Destination, TaskContext, TaskUnit, UnitFuture};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct HttpProducer {
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    content_type: String,
    dest: Destination,
    staging: Arc<dyn StagingArea>,
    client: reqwest::Client,
}

impl HttpProducer {
    pub fn new(
        url: impl Into<String>,
        dest: Destination,
        staging: Arc<dyn StagingArea>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StagedagError::Other(e.into()))?;
        Ok(Self {
            url: url.into(),
            headers: HeaderMap::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            dest,
            staging,
            client,
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StagedagError::ConfigError(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StagedagError::ConfigError(format!("invalid header value for '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    async fn fetch(&self) -> std::result::Result<Vec<u8>, TaskError> {
        let unavailable = |e: reqwest::Error| TaskError::source_unavailable(&self.url, e);

        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        debug!(url = %self.url, %status, "source responded");

        let body = response
            .error_for_status()
            .map_err(unavailable)?
            .bytes()
            .await
            .map_err(unavailable)?;
        Ok(body.to_vec())
    }
}

impl TaskUnit for HttpProducer {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> UnitFuture<'a> {
        Box::pin(async move {
            let body = self.fetch().await?;
            let size = body.len() as u64;
            let key = self.dest.resolve_key(ctx);

            self.staging
                .put(&self.dest.container, &key, body, &self.content_type)
                .await
                .map_err(|cause| TaskError::WriteFailure {
                    location: format!("{}/{}", self.dest.container, key),
                    cause,
                })?;

            ctx.events.record(
                Event::info("artifact.written")
                    .with("task", &ctx.task)
                    .with("source", &self.url)
                    .with("artifact", format!("{}/{}", self.dest.container, key))
                    .with("bytes", size),
            );

            let mut artifact = ArtifactRef::new(self.dest.container.clone(), key);
            artifact.size = Some(size);
            Ok(artifact)
        })
    }
}
