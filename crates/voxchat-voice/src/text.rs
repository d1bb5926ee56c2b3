//! Text handed between stages: the STT transcript and the LLM response.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output of the STT stage, input of the LLM stage. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct TranscriptText(String);

impl TranscriptText {
    /// Trims surrounding whitespace; `None` when nothing is left.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        non_empty(text.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Output of the LLM stage, input of the TTS stage. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct ResponseText(String);

impl ResponseText {
    /// Trims surrounding whitespace; `None` when nothing is left.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        non_empty(text.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

const EMPTY_TEXT: &str = "text must not be empty";

impl TryFrom<String> for TranscriptText {
    type Error = &'static str;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::new(text).ok_or(EMPTY_TEXT)
    }
}

impl TryFrom<String> for ResponseText {
    type Error = &'static str;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::new(text).ok_or(EMPTY_TEXT)
    }
}

impl fmt::Display for TranscriptText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ResponseText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TranscriptText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResponseText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank() {
        assert_eq!(
            TranscriptText::new("  What is the capital of France?\n").unwrap().as_str(),
            "What is the capital of France?"
        );
        assert!(TranscriptText::new(" \n\t").is_none());
        assert!(ResponseText::new("").is_none());
        assert_eq!(ResponseText::new("Paris.").unwrap().to_string(), "Paris.");
    }

    #[test]
    fn deserialize_enforces_non_empty() {
        assert!(serde_json::from_str::<TranscriptText>(r#""""#).is_err());
        assert!(serde_json::from_str::<ResponseText>(r#"" \n ""#).is_err());
        let text: ResponseText = serde_json::from_str(r#"" Paris. ""#).unwrap();
        assert_eq!(text.as_str(), "Paris.");
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""Paris.""#);
    }
}
