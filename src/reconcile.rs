use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::TranslationError;
use crate::gateway::{Direction, TranslationGateway, TranslationRequest};
use crate::normalize::{compose, contains_cjk, normalize};
use crate::providers::TranslationBackend;

pub const DEFAULT_WEIGHT: f32 = 1.0;
pub const MIN_WEIGHT: f32 = 0.1;
pub const MAX_WEIGHT: f32 = 10.0;

/// A tag with its annotation, keyed by the position it had in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedTagEntry {
    pub original_index: usize,
    pub text: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub disabled: bool,
}

fn default_weight() -> f32 {
    DEFAULT_WEIGHT
}

impl OrderedTagEntry {
    pub fn new(
        original_index: usize,
        text: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            original_index,
            text: text.into(),
            translation: translation.into(),
            weight: DEFAULT_WEIGHT,
            disabled: false,
        }
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = if weight.is_finite() {
            weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
        } else {
            DEFAULT_WEIGHT
        };
    }

    pub fn has_translation(&self) -> bool {
        !self.translation.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub entries: Vec<OrderedTagEntry>,
    /// Set when the batch failed and CJK tags were carried through untranslated.
    pub error: Option<TranslationError>,
}

impl ReconcileOutcome {
    pub fn prompt(&self) -> String {
        compose(&self.entries)
    }
}

#[derive(Debug)]
pub struct PromptListReconciler<B> {
    gateway: Arc<TranslationGateway<B>>,
}

impl<B> Clone for PromptListReconciler<B> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<B: TranslationBackend> PromptListReconciler<B> {
    pub fn new(gateway: Arc<TranslationGateway<B>>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<TranslationGateway<B>> {
        &self.gateway
    }

    pub async fn reconcile_text(&self, raw: &str) -> ReconcileOutcome {
        self.reconcile(&normalize(raw)).await
    }

    /// Builds one entry per tag, in input order, translating CJK tags to English.
    ///
    /// A translated CJK tag keeps its source as the annotation. When the batch
    /// fails those tags pass through untranslated and the error is reported
    /// next to the complete list.
    pub async fn reconcile(&self, tags: &[String]) -> ReconcileOutcome {
        let mut entries = Vec::with_capacity(tags.len());
        let mut pending = Vec::new();
        for (index, tag) in tags.iter().enumerate() {
            if contains_cjk(tag) {
                pending.push((index, tag.clone()));
            } else {
                entries.push(OrderedTagEntry::new(index, tag.as_str(), ""));
            }
        }

        let mut error = None;
        if let Some(request) = TranslationRequest::new(pending, Direction::ForeignToEnglish) {
            match self.gateway.translate_request(&request).await {
                Ok(results) => {
                    for result in results {
                        if result.translated.is_empty() {
                            entries.push(OrderedTagEntry::new(result.index, result.original, ""));
                        } else {
                            entries.push(OrderedTagEntry::new(
                                result.index,
                                result.translated,
                                result.original,
                            ));
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "translating {} tags failed, keeping originals: {}",
                        request.len(),
                        err
                    );
                    for (index, tag) in request.entries() {
                        entries.push(OrderedTagEntry::new(*index, tag.as_str(), ""));
                    }
                    error = Some(err);
                }
            }
        }

        entries.sort_by_key(|entry| entry.original_index);
        info!("reconciled {} tags", entries.len());
        ReconcileOutcome { entries, error }
    }

    /// Fills empty annotations with one English-to-foreign batch.
    ///
    /// Results are written back in submission order. A failed batch writes
    /// nothing. Returns how many entries received an annotation.
    pub async fn reconcile_missing_only(
        &self,
        entries: &mut [OrderedTagEntry],
    ) -> Result<usize, TranslationError> {
        let positions = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.has_translation())
            .map(|(position, _)| position)
            .collect::<Vec<_>>();
        if positions.is_empty() {
            return Ok(0);
        }

        let texts = positions
            .iter()
            .map(|position| entries[*position].text.clone())
            .collect::<Vec<_>>();
        let translated = self
            .gateway
            .translate_batch(&texts, Direction::EnglishToForeign)
            .await?;

        let mut filled = 0;
        for (position, translation) in positions.into_iter().zip(translated) {
            if !translation.is_empty() {
                entries[position].translation = translation;
                filled += 1;
            }
        }
        Ok(filled)
    }

    /// Re-annotates a single entry from its current text.
    pub async fn retranslate_entry(
        &self,
        entry: &mut OrderedTagEntry,
    ) -> Result<(), TranslationError> {
        let translation = self
            .gateway
            .translate_one(&entry.text, Direction::EnglishToForeign)
            .await?;
        entry.translation = translation.trim().to_string();
        Ok(())
    }
}
