use log::{debug, error, info, trace};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::crawler::errors::{CrawlerResult, FileOperationError};

/// Extension appended to every saved page.
pub const OUTPUT_EXTENSION: &str = "md";

/// Mirrors crawled URLs into a directory tree of markdown files.
pub struct FileManager {
    output_dir: PathBuf,
    base_url: String,
}

impl FileManager {
    /// Create the output root (and any missing parents) up front.
    pub fn new<P: AsRef<Path>>(output_dir: P, base_url: &str) -> CrawlerResult<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        trace!("Creating FileManager with output directory: {}", output_dir.display());

        if output_dir.as_os_str().is_empty() {
            error!("Output directory path is empty");
            return Err(FileOperationError::InvalidPath("Empty path".to_string()).into());
        }

        fs::create_dir_all(&output_dir).map_err(|e| {
            error!("Failed to create output directory '{}': {}", output_dir.display(), e);
            FileOperationError::DirectoryCreationFailed(e)
        })?;

        info!("Writing pages under {}", output_dir.display());
        Ok(FileManager {
            output_dir,
            base_url: base_url.to_string(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path for `url` relative to the output root.
    ///
    /// The base URL prefix is stripped and each remaining `/` becomes a
    /// directory level. URLs outside the base are mirrored under their host.
    pub fn relative_path_for(&self, url: &str) -> PathBuf {
        let remainder = match url.strip_prefix(self.base_url.as_str()) {
            Some(rest) => rest.to_string(),
            None => foreign_remainder(url),
        };

        let mut segments: Vec<String> = remainder
            .split('/')
            .filter(|s| !s.is_empty())
            .map(sanitize_segment)
            .collect();

        let last = segments.pop().unwrap_or_else(|| "index".to_string());

        let mut path: PathBuf = segments.into_iter().collect();
        path.push(format!("{}.{}", last, OUTPUT_EXTENSION));
        path
    }

    pub fn output_path_for(&self, url: &str) -> PathBuf {
        self.output_dir.join(self.relative_path_for(url))
    }

    /// Write `content` for `url`, creating parent directories and overwriting
    /// any previous file at the same path.
    pub fn save(&self, url: &str, content: &str) -> CrawlerResult<PathBuf> {
        let file_path = self.output_path_for(url);
        debug!("Saving {} -> {}", url, file_path.display());

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create directory '{}': {}", parent.display(), e);
                FileOperationError::DirectoryCreationFailed(e)
            })?;
        }

        fs::write(&file_path, content).map_err(|e| {
            error!("Failed to write '{}': {}", file_path.display(), e);
            FileOperationError::FileWriteFailed(e)
        })?;

        Ok(file_path)
    }
}

/// `host/path` for a URL that does not start with the base prefix; query and
/// fragment are dropped. Unparseable input is used verbatim minus any scheme.
fn foreign_remainder(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!("{}{}", parsed.host_str().unwrap_or("unknown"), parsed.path()),
        Err(_) => match url.split_once("://") {
            Some((_, rest)) => rest.to_string(),
            None => url.to_string(),
        },
    }
}

/// Replace characters that are invalid in file names on common platforms.
fn sanitize_segment(segment: &str) -> String {
    let sanitized: String = segment
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}
