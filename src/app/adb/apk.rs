use std::fs::File;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::app::error::AppError;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

pub fn normalize_apk_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(trimmed)
}

/// Checks that `path` is a readable APK before any tool is launched for it.
pub fn validate_apk(path: &str, trace_id: &str) -> Result<PathBuf, AppError> {
    if path.trim().is_empty() {
        return Err(AppError::validation("apk_path is required", trace_id));
    }
    let normalized = normalize_apk_path(path);
    if !normalized.is_file() {
        return Err(AppError::validation(
            format!("APK not found: {}", normalized.display()),
            trace_id,
        ));
    }
    check_archive(&normalized).map_err(|message| AppError::validation(message, trace_id))?;
    Ok(normalized)
}

fn check_archive(path: &Path) -> Result<(), String> {
    let file = File::open(path).map_err(|err| format!("Failed to open APK: {err}"))?;
    let mut archive = ZipArchive::new(file).map_err(|err| format!("Invalid APK: {err}"))?;
    if archive.by_name(MANIFEST_ENTRY).is_err() {
        return Err(format!("Invalid APK: missing {MANIFEST_ENTRY}"));
    }
    Ok(())
}
