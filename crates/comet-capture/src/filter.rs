//! Exempting static assets from capture.

use std::collections::HashSet;

/// Extensions treated as static assets unless configured otherwise
pub const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "map", "css", "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "ico", "woff",
    "woff2", "ttf", "otf", "eot",
];

/// Decides whether a request path names a static asset
///
/// Matching looks only at the extension of the last path segment and
/// ignores ASCII case, so `/img/Logo.PNG` is an asset while `/api/v1.2/items`
/// is not.
#[derive(Debug, Clone)]
pub struct StaticAssetFilter {
    extensions: HashSet<String>,
}

impl Default for StaticAssetFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticAssetFilter {
    /// Filter with the default script, stylesheet, image, icon and font extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_STATIC_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    /// Filter that matches nothing
    pub fn empty() -> Self {
        Self {
            extensions: HashSet::new(),
        }
    }

    /// Treat another extension as static; a leading `.` is ignored
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        let ext = extension.as_ref().trim_start_matches('.');
        if !ext.is_empty() {
            self.extensions.insert(ext.to_ascii_lowercase());
        }
        self
    }

    /// Whether `path` ends in one of the configured extensions
    pub fn is_static_asset(&self, path: &str) -> bool {
        let segment = path.rsplit('/').next().unwrap_or(path);
        match segment.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => {
                self.extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// Configured extensions, lowercase and without the dot
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}
