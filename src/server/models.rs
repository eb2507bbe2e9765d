use serde::{Deserialize, Serialize};

use crate::reconcile::OrderedTagEntry;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    pub(crate) text: Option<String>,
    pub(crate) to_english: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) translation: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ReconcileRequest {
    pub(crate) text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReconcileResponse {
    pub(crate) entries: Vec<OrderedTagEntry>,
    pub(crate) prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NetworkStatus {
    pub(crate) available: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportResponse {
    pub(crate) categories: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
