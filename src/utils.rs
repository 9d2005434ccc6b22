use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use url::Url;

/// Last non-empty path segment of `url`, or a generated `download_<uuid>` name.
pub fn get_filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|name| sanitize_filename(&percent_decode(name)))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(
        |c: char| !c.is_alphanumeric() && !matches!(c, '.' | '-' | '_' | '+'),
        "_",
    )
}

/// Where the file for `url` should land: `output` itself, or a file named after
/// the URL inside `output` when it is an existing directory. Defaults to the
/// current directory.
pub fn resolve_destination(url: &Url, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(get_filename_from_url(url)),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(get_filename_from_url(url)),
    }
}

/// Path segments are not form data: `+` stays a literal plus.
fn percent_decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
