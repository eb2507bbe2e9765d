use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod google;
mod throttle;

pub use google::GoogleTranslator;

use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend throttled the request (HTTP {status})")]
    Throttled {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

pub type BackendFuture = Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send>>;

/// One configured translation direction of a remote service.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> String;
    fn translate(&self, text: String) -> BackendFuture;
}

impl<T: TranslationBackend + ?Sized> TranslationBackend for Arc<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn translate(&self, text: String) -> BackendFuture {
        (**self).translate(text)
    }
}

/// A pair of backends, one per direction. They are never mixed within a call.
#[derive(Debug, Clone)]
pub struct BackendPair<B> {
    pub english_to_foreign: B,
    pub foreign_to_english: B,
}

impl<B: TranslationBackend + 'static> BackendPair<B> {
    /// Erases the backend type so adapters can hold any implementation.
    pub fn into_shared(self) -> BackendPair<SharedBackend> {
        BackendPair {
            english_to_foreign: Arc::new(self.english_to_foreign),
            foreign_to_english: Arc::new(self.foreign_to_english),
        }
    }
}

pub type SharedBackend = Arc<dyn TranslationBackend>;

pub fn build_google_backends(settings: &Settings) -> BackendPair<GoogleTranslator> {
    let client = reqwest::Client::new();
    BackendPair {
        english_to_foreign: GoogleTranslator::new(
            client.clone(),
            &settings.base_url,
            &settings.english_lang,
            &settings.foreign_lang,
        ),
        foreign_to_english: GoogleTranslator::new(
            client,
            &settings.base_url,
            &settings.foreign_lang,
            &settings.english_lang,
        ),
    }
}
