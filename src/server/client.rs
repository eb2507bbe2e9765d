use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

use crate::settings::Settings;

const CLIENT_TEMPLATE: &str = include_str!("../templates/client.html.tera");

pub(crate) fn render_client_html(settings: &Settings, api_base: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("title", "Prompt translator");
    context.insert("english_lang", &settings.english_lang);
    context.insert("foreign_lang", &settings.foreign_lang);
    context.insert("api_base_json", &serde_json::to_string(api_base)?);
    Tera::one_off(CLIENT_TEMPLATE, &context, true)
        .with_context(|| "failed to render client template")
}
