use serde_json::Value;
use tracing::debug;

use super::throttle::{is_throttled, retry_after};
use super::{BackendError, BackendFuture, TranslationBackend};

/// Google's public web translation endpoint for a fixed language pair.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
    source: String,
    target: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, base_url: &str, source: &str, target: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl TranslationBackend for GoogleTranslator {
    fn name(&self) -> String {
        format!("google:{}->{}", self.source, self.target)
    }

    fn translate(&self, text: String) -> BackendFuture {
        let this = self.clone();
        Box::pin(async move { call_translate(this, text).await })
    }
}

async fn call_translate(backend: GoogleTranslator, text: String) -> Result<String, BackendError> {
    let url = format!("{}/translate_a/single", backend.base_url);
    debug!(
        "google translate {} -> {} ({} chars)",
        backend.source,
        backend.target,
        text.chars().count()
    );
    let response = backend
        .client
        .get(&url)
        .query(&[
            ("client", "gtx"),
            ("sl", backend.source.as_str()),
            ("tl", backend.target.as_str()),
            ("dt", "t"),
            ("q", text.as_str()),
        ])
        .send()
        .await
        .map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                BackendError::Unreachable(err.to_string())
            } else {
                BackendError::Status {
                    status: 0,
                    body: err.to_string(),
                }
            }
        })?;

    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        return extract_translation(&body);
    }
    if is_throttled(status, &body) {
        return Err(BackendError::Throttled {
            status: status.as_u16(),
            retry_after,
        });
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        body: truncate(&body, 200),
    })
}

/// Joins the translated sentence fragments from a `translate_a/single` payload.
pub(crate) fn extract_translation(body: &str) -> Result<String, BackendError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| BackendError::Malformed(format!("invalid JSON: {}", err)))?;
    let sentences = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Malformed("missing sentence list".to_string()))?;
    let mut out = String::new();
    for sentence in sentences {
        if let Some(fragment) = sentence.get(0).and_then(Value::as_str) {
            out.push_str(fragment);
        }
    }
    if out.is_empty() {
        return Err(BackendError::Malformed("empty translation".to_string()));
    }
    Ok(out)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
