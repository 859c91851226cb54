//! Common types shared by the image studio services
//!
//! Each service crate carries its own error enum; this crate holds only the
//! result types that cross service boundaries.

use serde::{Deserialize, Serialize};

/// Generated caption for an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caption {
    /// Caption text, trimmed of surrounding whitespace
    pub text: String,
}

impl Caption {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
        }
    }

    /// Whether the caption carries any text
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A classification label with its confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    /// Confidence in [0, 1]
    pub score: f32,
}

impl LabelScore {
    #[must_use]
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}
