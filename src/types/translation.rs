//! Translation result type

use serde::{Deserialize, Serialize};

/// A translated text and the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    /// Name of the provider that served the request.
    pub provider: String,
    /// Source language reported by the provider, when it detected one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_source: Option<String>,
}

impl Translation {
    pub fn new(text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            detected_source: None,
        }
    }

    pub fn detected_source(mut self, lang: impl Into<String>) -> Self {
        self.detected_source = Some(lang.into());
        self
    }
}
