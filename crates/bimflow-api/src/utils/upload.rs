//! Validation helpers for incoming design files

use bimflow_core::AppError;
use std::path::Path;

const MAX_FILENAME_LENGTH: usize = 255;

/// Lowercased extension of `filename`, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| !ext.is_empty())
}

/// Check the extension against the allow-list and return it.
pub fn validate_file_extension(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<String, AppError> {
    match file_extension(filename) {
        Some(ext) if allowed_extensions.contains(&ext) => Ok(ext),
        Some(ext) => Err(AppError::InvalidType(format!(
            "Invalid file type: .{}. Allowed types: {}",
            ext,
            allowed_extensions.join(", ")
        ))),
        None => Err(AppError::InvalidType(format!(
            "File has no extension. Allowed types: {}",
            allowed_extensions.join(", ")
        ))),
    }
}

/// Strip MIME parameters (`application/ifc; charset=utf-8` → `application/ifc`).
fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

/// Validate a MIME hint against the allow-list.
pub fn validate_content_type(content_type: &str, allowed_types: &[String]) -> Result<(), AppError> {
    let normalized = normalize_mime_type(content_type);
    if allowed_types.iter().any(|ct| ct.eq_ignore_ascii_case(&normalized)) {
        return Ok(());
    }
    Err(AppError::InvalidType(format!(
        "Invalid content type: {}. Allowed types: {}",
        normalized,
        allowed_types.join(", ")
    )))
}

pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), AppError> {
    if size > max_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File too large: {:.2}MB. Maximum size: {:.2}MB",
            size as f64 / 1024.0 / 1024.0,
            max_size as f64 / 1024.0 / 1024.0
        )));
    }
    Ok(())
}

/// Reduce a client-supplied name to its final path component with only
/// safe characters. Path traversal is rejected outright.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    let filename_only = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if filename_only.contains("..") {
        return Err(AppError::InvalidInput(
            "Filename contains invalid path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        return Err(AppError::InvalidInput("Filename is empty".to_string()));
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        ["ifc", "dwg", "rvt", "step", "obj", "gltf", "glb"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(validate_file_extension("Tower.IFC", &allowed()).unwrap(), "ifc");
    }

    #[test]
    fn rejects_unknown_or_missing_extension() {
        let err = validate_file_extension("setup.exe", &allowed()).unwrap_err();
        assert!(matches!(err, AppError::InvalidType(msg) if msg.contains(".exe")));
        assert!(matches!(
            validate_file_extension("Makefile", &allowed()),
            Err(AppError::InvalidType(_))
        ));
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let types = vec!["application/ifc".to_string()];
        assert!(validate_content_type("application/IFC; charset=utf-8", &types).is_ok());
        assert!(validate_content_type("application/x-msdownload", &types).is_err());
    }

    #[test]
    fn size_ceiling() {
        assert!(validate_file_size(100, 100).is_ok());
        assert!(matches!(
            validate_file_size(101, 100),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("models/tower.ifc").unwrap(), "tower.ifc");
        assert_eq!(sanitize_filename("level 1 (a).dwg").unwrap(), "level 1 _a_.dwg");
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("").is_err());
    }
}
