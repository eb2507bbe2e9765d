use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub type Checker = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Cached answer to "is the translation service reachable right now?".
///
/// Only used to fail fast; a positive answer does not promise a call will succeed.
#[derive(Clone)]
pub struct ReachabilityProbe {
    checker: Checker,
    ttl: Duration,
    cache: Arc<Mutex<Option<(Instant, bool)>>>,
}

impl std::fmt::Debug for ReachabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityProbe")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ReachabilityProbe {
    pub fn http(url: impl Into<String>, ttl: Duration) -> Self {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let checker: Checker = Arc::new(move || {
            let client = client.clone();
            let url = url.clone();
            async move {
                match client.get(&url).send().await {
                    Ok(response) => {
                        debug!("probe {} answered {}", url, response.status());
                        true
                    }
                    Err(err) => {
                        warn!("probe {} failed: {}", url, err);
                        false
                    }
                }
            }
            .boxed()
        });
        Self::with_checker(ttl, checker)
    }

    pub fn with_checker(ttl: Duration, checker: Checker) -> Self {
        Self {
            checker,
            ttl,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_reachable(&self) -> bool {
        let mut cache = self.cache.lock().await;
        if let Some((checked_at, reachable)) = *cache {
            if checked_at.elapsed() < self.ttl {
                return reachable;
            }
        }
        let reachable = (self.checker)().await;
        *cache = Some((Instant::now(), reachable));
        reachable
    }

    /// Drops the cached answer so the next query hits the network.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}
