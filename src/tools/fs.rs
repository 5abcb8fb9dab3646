//! Filesystem collaborator: preview discovery, fingerprints, resource inlining.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::{Captures, Regex};
use sha2::{Digest, Sha512};

use crate::bus::Preview;
use crate::runtime::BuildTarget;
use crate::tools::types::{ExtractionError, PreviewInfo, PreviewSource};

const PREVIEW_DECLARATION: &str =
    r"(?m)\bclass\s+([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(?:[A-Za-z_][A-Za-z0-9_.]*\s*,\s*)*WebPreview\b";
const RESOURCE_ATTRIBUTE: &str = r#"\b(src|href)\s*=\s*"([^"]+)""#;

/// Lowercase hex SHA-512 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha512::digest(bytes))
}

/// Reads source files straight from disk.
///
/// A preview is a class conforming to `WebPreview`; its name is what the
/// build tool is asked to render.
pub struct SourcePreviewScanner {
    source_root_marker: String,
    declaration: Regex,
    resource: Regex,
}

impl SourcePreviewScanner {
    pub fn new(source_root_marker: impl Into<String>) -> Self {
        Self {
            source_root_marker: source_root_marker.into(),
            declaration: Regex::new(PREVIEW_DECLARATION).expect("valid preview regex"),
            resource: Regex::new(RESOURCE_ATTRIBUTE).expect("valid resource regex"),
        }
    }

    /// Preview class names in declaration order, without duplicates.
    pub fn preview_names(&self, source: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in self.declaration.captures_iter(source) {
            let name = &caps[1];
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Directories a relative resource reference may be resolved against,
    /// most specific first.
    fn search_roots(&self, path: &Path) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(parent) = path.parent() {
            roots.push(parent.to_path_buf());
        }
        if let Some(target) = BuildTarget::from_path(path, &self.source_root_marker) {
            roots.push(target.module_dir(&self.source_root_marker));
            roots.push(target.project_root);
        }
        roots.dedup();
        roots
    }

    fn inline_markup<'a>(&self, markup: &'a str, roots: &[PathBuf]) -> Cow<'a, str> {
        self.resource.replace_all(markup, |caps: &Captures| {
            let attribute = &caps[1];
            let reference = &caps[2];
            match locate_resource(reference, roots).and_then(|file| data_uri(&file)) {
                Some(uri) => format!(r#"{attribute}="{uri}""#),
                None => caps[0].to_string(),
            }
        })
    }
}

impl PreviewSource for SourcePreviewScanner {
    fn extract_preview_info(&self, path: &Path) -> Result<PreviewInfo, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| ExtractionError::Parse(path.to_path_buf()))?;
        Ok(PreviewInfo {
            preview_names: self.preview_names(text),
            fingerprint: fingerprint(&bytes),
        })
    }

    fn resolve_embedded_resources(&self, path: &Path, previews: Vec<Preview>) -> Vec<Preview> {
        let roots = self.search_roots(path);
        previews
            .into_iter()
            .map(|mut preview| {
                let Ok(decoded) = BASE64.decode(preview.html.as_bytes()) else {
                    return preview;
                };
                let Ok(markup) = String::from_utf8(decoded) else {
                    return preview;
                };
                if let Cow::Owned(inlined) = self.inline_markup(&markup, &roots) {
                    preview.html = BASE64.encode(inlined.as_bytes());
                }
                preview
            })
            .collect()
    }
}

fn locate_resource(reference: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    const EXTERNAL: &[&str] = &["data:", "http:", "https:", "//", "#", "mailto:", "javascript:"];
    if EXTERNAL.iter().any(|prefix| reference.starts_with(prefix)) {
        return None;
    }
    let relative = reference.trim_start_matches("./").trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }

    let absolute = Path::new(reference);
    if absolute.is_absolute() && absolute.is_file() {
        return Some(absolute.to_path_buf());
    }
    roots
        .iter()
        .map(|root| root.join(relative))
        .find(|candidate| candidate.is_file())
}

fn data_uri(file: &Path) -> Option<String> {
    let bytes = std::fs::read(file).ok()?;
    Some(format!(
        "data:{};base64,{}",
        mime_for(file),
        BASE64.encode(bytes)
    ))
}

fn mime_for(file: &Path) -> &'static str {
    let ext = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "js" => "text/javascript",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}
