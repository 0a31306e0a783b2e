use std::path::Path;

use chrono::Utc;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FilenameError {
    #[error("invalid url: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pick a filename (not a path) under `dest_dir` for the body fetched from `url`.
///
/// The name comes from the last segment of the URL path. When the path has no usable
/// last segment (`http://host`, `http://host/dir/`) a name is generated from the
/// current nanosecond timestamp plus an extension looked up from `content_type`. A
/// name already taken in `dest_dir` gets the timestamp inserted between its stem and
/// its extension.
///
/// The returned name never contains a path separator and did not exist in
/// `dest_dir` at the time of the call. Callers that write concurrently still need
/// create-new semantics when opening the file, since another writer may claim the
/// same name in between.
pub fn resolve_filename(
    url: &str,
    content_type: Option<&str>,
    dest_dir: &Path,
) -> Result<String, FilenameError> {
    let parsed = Url::parse(url)?;

    let Some(candidate) = last_path_segment(&parsed) else {
        return unused_name(dest_dir, || generated_name(content_type));
    };

    if !dest_dir.join(&candidate).try_exists()? {
        return Ok(candidate);
    }

    let (stem, ext) = split_extension(&candidate);
    log::debug!("{candidate} already exists in {}, adding timestamp", dest_dir.display());
    unused_name(dest_dir, || format!("{stem}{}{ext}", timestamp_nanos()))
}

/// Extension (with leading dot) registered for a MIME type, e.g. `application/pdf` -> `.pdf`.
///
/// Parameters such as `; charset=utf-8` are ignored. When several extensions are
/// registered the first one in the table wins.
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}

/// Percent-decoded last path segment, or `None` when it is empty or unusable.
fn last_path_segment(url: &Url) -> Option<String> {
    let raw = url.path_segments()?.next_back()?;
    if raw.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let name = decoded.replace(['/', '\\'], "_");
    match name.as_str() {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}

/// Split `report.pdf` into (`report`, `.pdf`). Leading-dot names like `.env` have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn generated_name(content_type: Option<&str>) -> String {
    let ext = content_type
        .and_then(extension_for_content_type)
        .unwrap_or_default();
    format!("{}{ext}", timestamp_nanos())
}

fn unused_name<F>(dest_dir: &Path, mut make: F) -> Result<String, FilenameError>
where
    F: FnMut() -> String,
{
    loop {
        let name = make();
        if !dest_dir.join(&name).try_exists()? {
            return Ok(name);
        }
    }
}

fn timestamp_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
