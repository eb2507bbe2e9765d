use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::providers::{BackendError, BackendFuture, TranslationBackend};
use crate::rate_limit::Clock;

pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: Mutex<()> = Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: HOME_MUTEX serializes every test that touches the environment.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    unsafe {
        match old_home {
            Some(old) => std::env::set_var("HOME", old),
            None => std::env::remove_var("HOME"),
        }
    }
    result
}

#[derive(Debug)]
pub(crate) struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().expect("clock lock");
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().expect("clock lock")
    }
}

type Responder = Arc<dyn Fn(&str) -> Result<String, BackendError> + Send + Sync>;

/// Backend double that answers from a closure and records every request body.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    responder: Responder,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub(crate) fn new(
        responder: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Translates each line through the table; unknown lines come back unchanged.
    pub(crate) fn dictionary(pairs: &[(&str, &str)]) -> Self {
        let table = pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect::<HashMap<_, _>>();
        Self::new(move |text| {
            Ok(text
                .split('\n')
                .map(|line| table.get(line).cloned().unwrap_or_else(|| line.to_string()))
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }

    pub(crate) fn failing(err: BackendError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn translate(&self, text: String) -> BackendFuture {
        self.calls.lock().expect("calls lock").push(text.clone());
        let responder = self.responder.clone();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            responder(&text)
        })
    }
}
