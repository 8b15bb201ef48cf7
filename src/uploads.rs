//! Image upload handling.
//!
//! [`UploadStore`] owns the upload directory: it persists at most one file
//! per write request under a timestamp-qualified name and hands back the
//! `/uploads/<filename>` URL the row stores. A failed directory create or
//! file write aborts the request before any database mutation happens.
//!
//! [`WriteForm`] is the extractor the write handlers share. It accepts
//! either a JSON body or `multipart/form-data` (when an image accompanies
//! the request) and exposes the text fields plus the optional file
//! uniformly. The upload-or-keep decision is an explicit [`ImagePatch`]
//! value rather than ad-hoc field sniffing.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header,
    Json,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ApiError;

const DEFAULT_UPLOAD_DIR: &str = "uploads";
const PUBLIC_PREFIX: &str = "/uploads/";
const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// A file received in a multipart write request, not yet on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Bytes,
}

/// How a write request affects the stored image path.
#[derive(Debug, Clone)]
pub enum ImagePatch {
    /// A new file was uploaded; store it and use its URL.
    Replace(UploadedFile),
    /// The caller resent an existing path; keep it verbatim.
    Set(String),
    /// No file and no path field; the column becomes NULL.
    Clear,
}

impl ImagePatch {
    /// Resolve the patch to the value written to the image column,
    /// performing the file-system side effect for `Replace`.
    pub async fn resolve(self, store: &UploadStore) -> Result<Option<String>, ApiError> {
        match self {
            ImagePatch::Replace(file) => Ok(Some(store.save(file).await?)),
            ImagePatch::Set(url) => Ok(Some(url)),
            ImagePatch::Clear => Ok(None),
        }
    }
}

/// Fixed-directory store for uploaded images.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `UPLOAD_DIR`, defaulting to `uploads/`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an uploaded file and return its public `/uploads/...` URL.
    ///
    /// The stored name is `<unix-millis>-<original name>`; two uploads of
    /// the same name within one millisecond would collide, which is
    /// accepted as practically unreachable.
    pub async fn save(&self, file: UploadedFile) -> Result<String, ApiError> {
        if !is_safe_filename(&file.original_name) {
            return Err(ApiError::Validation("Invalid upload filename".to_string()));
        }

        let ext = file
            .original_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ApiError::Validation(
                "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.".to_string(),
            ));
        }

        if file.bytes.is_empty() {
            return Err(ApiError::Validation("Empty file".to_string()));
        }
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(ApiError::Validation(
                "File too large. Maximum size is 5MB.".to_string(),
            ));
        }
        if image_mime_from_magic_bytes(&file.bytes).is_none() {
            return Err(ApiError::Validation(
                "File content does not match an allowed image type.".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = format!("{}-{}", Utc::now().timestamp_millis(), file.original_name);
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, &file.bytes).await?;

        tracing::info!("image uploaded: {} ({} bytes)", filename, file.bytes.len());
        Ok(format!("{}{}", PUBLIC_PREFIX, filename))
    }

    /// Delete the file a stored `/uploads/...` URL points at, if it exists.
    /// Returns whether a file was actually removed. URLs outside the public
    /// prefix (absolute URLs, traversal attempts) are ignored.
    pub async fn remove_by_url(&self, url: &str) -> Result<bool, ApiError> {
        let filename = match url.strip_prefix(PUBLIC_PREFIX) {
            Some(name) if is_safe_filename(name) => name,
            _ => return Ok(false),
        };

        let path = self.dir.join(filename);
        if !path.exists() {
            return Ok(false);
        }

        tokio::fs::remove_file(&path).await?;
        tracing::info!("image deleted: {}", filename);
        Ok(true)
    }
}

fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

fn image_mime_from_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

/// Text fields plus at most one file, decoded from either a JSON or a
/// multipart write request.
#[derive(Debug, Default)]
pub struct WriteForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl WriteForm {
    /// Take a text field out of the form.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    /// Take the uploaded file, if the request carried one.
    pub fn take_file(&mut self) -> Option<UploadedFile> {
        self.file.take()
    }

    /// Decide how the image column changes: an uploaded file wins,
    /// otherwise a non-empty path field under `key` is kept, otherwise
    /// the column is cleared.
    pub fn image_patch(&mut self, key: &str) -> ImagePatch {
        if let Some(file) = self.file.take() {
            return ImagePatch::Replace(file);
        }
        match self.fields.remove(key) {
            Some(url) if !url.is_empty() => ImagePatch::Set(url),
            _ => ImagePatch::Clear,
        }
    }

    #[cfg(test)]
    pub fn from_parts(fields: &[(&str, &str)], file: Option<UploadedFile>) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            file,
        }
    }
}

impl<S> FromRequest<S> for WriteForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(format!("Invalid multipart data: {}", e)))?;

            let mut form = WriteForm::default();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::Validation(format!("Invalid multipart data: {}", e)))?
            {
                let name = field.name().unwrap_or("").to_string();
                match field.file_name().map(|f| f.to_string()) {
                    Some(original_name) if !original_name.is_empty() => {
                        if form.file.is_some() {
                            return Err(ApiError::Validation(
                                "Only one file may be uploaded per request".to_string(),
                            ));
                        }
                        let bytes = field.bytes().await.map_err(|e| {
                            ApiError::Validation(format!("Failed to read file data: {}", e))
                        })?;
                        form.file = Some(UploadedFile {
                            original_name,
                            bytes,
                        });
                    }
                    // Browsers send filename="" for an untouched file
                    // input; that reads as "no file uploaded".
                    Some(_) => {
                        field.bytes().await.map_err(|e| {
                            ApiError::Validation(format!("Invalid multipart data: {}", e))
                        })?;
                    }
                    None => {
                        let text = field.text().await.map_err(|e| {
                            ApiError::Validation(format!("Invalid multipart data: {}", e))
                        })?;
                        form.fields.insert(name, text);
                    }
                }
            }
            return Ok(form);
        }

        if content_type.starts_with("application/json") {
            let Json(value) = Json::<serde_json::Value>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(format!("Invalid JSON body: {}", e)))?;

            let mut form = WriteForm::default();
            if let serde_json::Value::Object(map) = value {
                for (key, value) in map {
                    match value {
                        serde_json::Value::String(s) => {
                            form.fields.insert(key, s);
                        }
                        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                            form.fields.insert(key, value.to_string());
                        }
                        // null and nested values read as absent fields
                        _ => {}
                    }
                }
            }
            return Ok(form);
        }

        // No recognized body; all fields read as absent.
        Ok(WriteForm::default())
    }
}
