//! Component health: whether an engine looks usable without running inference.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
}

impl ComponentHealth {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

/// Health of all three stages, keyed the way `/status` reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub stt: ComponentHealth,
    pub llm: ComponentHealth,
    pub tts: ComponentHealth,
}

impl PipelineHealth {
    pub fn all_ok(&self) -> bool {
        self.stt.is_ok() && self.llm.is_ok() && self.tts.is_ok()
    }
}

/// Health from a list of `(description, path)` files that must exist.
pub(crate) fn required_files(files: &[(&str, &Path)]) -> ComponentHealth {
    let missing: Vec<String> = files
        .iter()
        .filter(|(_, p)| !p.exists())
        .map(|(desc, p)| format!("{} not found at {}", desc, p.display()))
        .collect();
    if missing.is_empty() {
        let names: Vec<&str> = files.iter().map(|(desc, _)| *desc).collect();
        ComponentHealth::ok(format!("{} present", names.join(", ")))
    } else {
        ComponentHealth::error(missing.join("; "))
    }
}

/// True when `binary` is a path that exists, or a bare name found on `PATH`.
pub(crate) fn binary_available(binary: &Path) -> bool {
    if binary.components().count() > 1 || binary.is_absolute() {
        return binary.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_files_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("model.bin");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("config.json");

        let ok = required_files(&[("Model file", present.as_path())]);
        assert!(ok.is_ok());

        let err = required_files(&[
            ("Model file", present.as_path()),
            ("Config file", absent.as_path()),
        ]);
        assert_eq!(err.status, HealthStatus::Error);
        assert!(err.message.contains("Config file not found"));
        assert!(!err.message.contains("Model file"));
    }

    #[test]
    fn binary_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("whisper-cli");
        assert!(!binary_available(&bin));
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        assert!(binary_available(&bin));
        assert!(!binary_available(Path::new("voxchat-no-such-binary-on-path")));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(ComponentHealth::ok("Binary exists: true")).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["message"], "Binary exists: true");
    }
}
