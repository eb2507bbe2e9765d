use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TranslationError;
use crate::probe::ReachabilityProbe;
use crate::providers::{BackendError, BackendPair, TranslationBackend};
use crate::rate_limit::RateLimiter;
use crate::settings::Settings;

const BATCH_DELIMITER: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    EnglishToForeign,
    ForeignToEnglish,
}

impl Direction {
    pub fn from_to_english(to_english: bool) -> Self {
        if to_english {
            Direction::ForeignToEnglish
        } else {
            Direction::EnglishToForeign
        }
    }
}

/// Indexed texts bound for one batch call. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    entries: Vec<(usize, String)>,
    direction: Direction,
}

impl TranslationRequest {
    pub fn new(entries: Vec<(usize, String)>, direction: Direction) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        Some(Self { entries, direction })
    }

    pub fn entries(&self) -> &[(usize, String)] {
        &self.entries
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    pub index: usize,
    pub original: String,
    pub translated: String,
}

/// Rate-limited front door to the remote translator.
///
/// Holds one backend per direction and a single [`RateLimiter`] shared by
/// every call made through this instance.
#[derive(Debug, Clone)]
pub struct TranslationGateway<B> {
    backends: BackendPair<B>,
    limiter: RateLimiter,
    timeout: Duration,
    probe: Option<ReachabilityProbe>,
}

impl<B: TranslationBackend> TranslationGateway<B> {
    pub fn new(backends: BackendPair<B>, limiter: RateLimiter, timeout: Duration) -> Self {
        Self {
            backends,
            limiter,
            timeout,
            probe: None,
        }
    }

    /// Wires the limiter, timeout and probe from loaded settings.
    pub fn from_settings(settings: &Settings, backends: BackendPair<B>) -> Self {
        let limiter = RateLimiter::new(settings.effective_min_interval());
        let gateway = Self::new(backends, limiter, settings.timeout);
        if settings.probe_enabled {
            gateway.with_probe(ReachabilityProbe::http(
                settings.probe_url.clone(),
                settings.effective_probe_cache(),
            ))
        } else {
            gateway
        }
    }

    pub fn with_probe(mut self, probe: ReachabilityProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn probe(&self) -> Option<&ReachabilityProbe> {
        self.probe.as_ref()
    }

    pub async fn is_available(&self) -> bool {
        match &self.probe {
            Some(probe) => probe.is_reachable().await,
            None => true,
        }
    }

    fn backend(&self, direction: Direction) -> &B {
        match direction {
            Direction::EnglishToForeign => &self.backends.english_to_foreign,
            Direction::ForeignToEnglish => &self.backends.foreign_to_english,
        }
    }

    pub async fn translate_one(
        &self,
        text: &str,
        direction: Direction,
    ) -> Result<String, TranslationError> {
        if !self.is_available().await {
            return Err(TranslationError::Unavailable(
                "reachability probe reports the service down".to_string(),
            ));
        }
        self.limiter.try_acquire()?;

        let backend = self.backend(direction);
        debug!("translating via {} ({:?})", backend.name(), direction);
        match tokio::time::timeout(self.timeout, backend.translate(text.to_string())).await {
            Err(_) => {
                warn!(
                    "{} did not answer within {:.1}s",
                    backend.name(),
                    self.timeout.as_secs_f64()
                );
                Err(TranslationError::Timeout(self.timeout))
            }
            Ok(Err(err)) => {
                warn!("{} failed: {}", backend.name(), err);
                Err(map_backend_error(err))
            }
            Ok(Ok(translated)) => Ok(translated),
        }
    }

    /// Translates many texts with one rate-limited call.
    ///
    /// The texts travel newline-joined, so an input holding a line break is
    /// refused up front and a response whose line count differs from the
    /// input is refused as a whole.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        direction: Direction,
    ) -> Result<Vec<String>, TranslationError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(position) = texts
            .iter()
            .position(|text| text.contains(['\n', '\r']))
        {
            return Err(TranslationError::AmbiguousBatch(position));
        }

        let combined = texts.join(BATCH_DELIMITER);
        let response = self.translate_one(&combined, direction).await?;
        let lines = response
            .trim_end_matches(['\n', '\r'])
            .split(BATCH_DELIMITER)
            .map(|line| line.trim().to_string())
            .collect::<Vec<_>>();

        if lines.len() != texts.len() {
            warn!(
                "batch response split into {} lines for {} inputs; discarding",
                lines.len(),
                texts.len()
            );
            return Err(TranslationError::BatchMismatch {
                expected: texts.len(),
                got: lines.len(),
            });
        }
        info!("batch translated {} texts ({:?})", texts.len(), direction);
        Ok(lines)
    }

    pub async fn translate_request(
        &self,
        request: &TranslationRequest,
    ) -> Result<Vec<TranslationResult>, TranslationError> {
        let texts = request
            .entries()
            .iter()
            .map(|(_, text)| text.clone())
            .collect::<Vec<_>>();
        let translated = self.translate_batch(&texts, request.direction()).await?;
        Ok(request
            .entries()
            .iter()
            .zip(translated)
            .map(|((index, original), translated)| TranslationResult {
                index: *index,
                original: original.clone(),
                translated,
            })
            .collect())
    }
}

fn map_backend_error(err: BackendError) -> TranslationError {
    match err {
        BackendError::Unreachable(message) => TranslationError::Unavailable(message),
        throttled @ BackendError::Throttled { .. } => {
            TranslationError::Unavailable(throttled.to_string())
        }
        other => TranslationError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ManualClock, ScriptedBackend};
    use futures_util::FutureExt;
    use std::sync::Arc;

    fn open_gateway(
        english_to_foreign: ScriptedBackend,
        foreign_to_english: ScriptedBackend,
    ) -> TranslationGateway<ScriptedBackend> {
        TranslationGateway::new(
            BackendPair {
                english_to_foreign,
                foreign_to_english,
            },
            RateLimiter::new(Duration::ZERO),
            Duration::from_secs(5),
        )
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn translate_one_uses_the_backend_for_the_direction() {
        let to_foreign = ScriptedBackend::dictionary(&[("smile", "微笑")]);
        let to_english = ScriptedBackend::dictionary(&[("长发", "long hair")]);
        let gateway = open_gateway(to_foreign.clone(), to_english.clone());

        let zh = gateway
            .translate_one("smile", Direction::EnglishToForeign)
            .await
            .unwrap();
        let en = gateway
            .translate_one("长发", Direction::ForeignToEnglish)
            .await
            .unwrap();

        assert_eq!(zh, "微笑");
        assert_eq!(en, "long hair");
        assert_eq!(to_foreign.calls(), vec!["smile"]);
        assert_eq!(to_english.calls(), vec!["长发"]);
    }

    #[test]
    fn from_settings_applies_profile_defaults() {
        let settings = Settings {
            profile: crate::settings::Profile::Production,
            probe_enabled: false,
            timeout: Duration::from_secs(3),
            ..Settings::default()
        };
        let backend = ScriptedBackend::dictionary(&[]);

        let gateway = TranslationGateway::from_settings(
            &settings,
            BackendPair {
                english_to_foreign: backend.clone(),
                foreign_to_english: backend,
            },
        );

        assert_eq!(gateway.limiter().min_interval(), Duration::from_secs(2));
        assert_eq!(gateway.timeout, Duration::from_secs(3));
        assert!(gateway.probe().is_none());
    }

    #[tokio::test]
    async fn rate_limited_call_never_reaches_backend() {
        let backend = ScriptedBackend::dictionary(&[]);
        let clock = Arc::new(ManualClock::new());
        let gateway = TranslationGateway::new(
            BackendPair {
                english_to_foreign: backend.clone(),
                foreign_to_english: backend.clone(),
            },
            RateLimiter::with_clock(Duration::from_secs(1), clock.clone()),
            Duration::from_secs(5),
        );

        gateway
            .translate_one("a", Direction::EnglishToForeign)
            .await
            .unwrap();
        clock.advance(Duration::from_millis(300));
        let err = gateway
            .translate_one("b", Direction::EnglishToForeign)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TranslationError::RateLimited {
                retry_after: Duration::from_millis(700)
            }
        );
        assert_eq!(err.to_string(), "request too frequent, retry in 0.7s");
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn backend_failures_are_wrapped() {
        let gateway = open_gateway(
            ScriptedBackend::failing(BackendError::Status {
                status: 500,
                body: "oops".to_string(),
            }),
            ScriptedBackend::failing(BackendError::Unreachable("dns".to_string())),
        );

        let err = gateway
            .translate_one("a", Direction::EnglishToForeign)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "translation failed: backend returned HTTP 500: oops"
        );

        let err = gateway
            .translate_one("a", Direction::ForeignToEnglish)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let slow = ScriptedBackend::dictionary(&[]).with_delay(Duration::from_secs(30));
        let gateway = open_gateway(slow.clone(), slow);
        let err = gateway
            .translate_one("a", Direction::EnglishToForeign)
            .await
            .unwrap_err();
        assert_eq!(err, TranslationError::Timeout(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn empty_batch_consumes_no_budget() {
        let backend = ScriptedBackend::dictionary(&[]);
        let gateway = TranslationGateway::new(
            BackendPair {
                english_to_foreign: backend.clone(),
                foreign_to_english: backend.clone(),
            },
            RateLimiter::new(Duration::from_secs(3600)),
            Duration::from_secs(5),
        );

        let out = gateway
            .translate_batch(&[], Direction::EnglishToForeign)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(gateway.limiter().ready_in(), Duration::ZERO);
    }

    #[tokio::test]
    async fn batch_is_one_joined_call_with_trimmed_lines() {
        let backend = ScriptedBackend::new(|_| Ok(" long hair \r\nblue eyes\n".to_string()));
        let gateway = open_gateway(backend.clone(), backend.clone());

        let out = gateway
            .translate_batch(&texts(&["长发", "蓝眼睛"]), Direction::ForeignToEnglish)
            .await
            .unwrap();

        assert_eq!(out, vec!["long hair", "blue eyes"]);
        assert_eq!(backend.calls(), vec!["长发\n蓝眼睛"]);
    }

    #[tokio::test]
    async fn batch_with_fewer_lines_is_rejected_whole() {
        let backend = ScriptedBackend::new(|_| Ok("long hair blue eyes".to_string()));
        let gateway = open_gateway(backend.clone(), backend);

        let err = gateway
            .translate_batch(&texts(&["长发", "蓝眼睛"]), Direction::ForeignToEnglish)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TranslationError::BatchMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[tokio::test]
    async fn translated_line_break_desynchronizes_and_is_rejected() {
        let backend = ScriptedBackend::new(|_| Ok("long\nhair\nblue eyes".to_string()));
        let gateway = open_gateway(backend.clone(), backend);

        let err = gateway
            .translate_batch(&texts(&["长发", "蓝眼睛"]), Direction::ForeignToEnglish)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TranslationError::BatchMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[tokio::test]
    async fn input_line_break_is_refused_before_any_call() {
        let backend = ScriptedBackend::dictionary(&[]);
        let gateway = open_gateway(backend.clone(), backend.clone());

        let err = gateway
            .translate_batch(&texts(&["长发", "蓝\n眼睛"]), Direction::ForeignToEnglish)
            .await
            .unwrap_err();

        assert_eq!(err, TranslationError::AmbiguousBatch(1));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_probe_short_circuits() {
        let backend = ScriptedBackend::dictionary(&[]);
        let probe = ReachabilityProbe::with_checker(
            Duration::from_secs(60),
            Arc::new(|| async { false }.boxed()),
        );
        let gateway = open_gateway(backend.clone(), backend.clone()).with_probe(probe);

        let err = gateway
            .translate_one("smile", Direction::EnglishToForeign)
            .await
            .unwrap_err();

        assert!(matches!(err, TranslationError::Unavailable(_)));
        assert!(backend.calls().is_empty());
        assert_eq!(gateway.limiter().ready_in(), Duration::ZERO);
    }

    #[tokio::test]
    async fn request_results_keep_explicit_indices() {
        let backend = ScriptedBackend::dictionary(&[("smile", "微笑"), ("1girl", "1个女孩")]);
        let gateway = open_gateway(backend.clone(), backend);
        let request = TranslationRequest::new(
            vec![(4, "smile".to_string()), (9, "1girl".to_string())],
            Direction::EnglishToForeign,
        )
        .expect("non-empty");

        let results = gateway.translate_request(&request).await.unwrap();

        assert_eq!(
            results,
            vec![
                TranslationResult {
                    index: 4,
                    original: "smile".to_string(),
                    translated: "微笑".to_string(),
                },
                TranslationResult {
                    index: 9,
                    original: "1girl".to_string(),
                    translated: "1个女孩".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_request_cannot_be_built() {
        assert!(TranslationRequest::new(Vec::new(), Direction::ForeignToEnglish).is_none());
    }
}
