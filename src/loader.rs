//! Template document loading.
//! Reads a document from the local filesystem or over HTTP and resolves its
//! imports recursively, composing them underneath the importing document.
use crate::document::TemplateDocument;
use crate::error::{Error, Result};
use log::debug;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Where a template document lives.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// Local filesystem path
    FileSystem(PathBuf),
    /// http(s) URL
    Http(String),
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSource::FileSystem(path) => write!(f, "{}", path.display()),
            DocumentSource::Http(url) => write!(f, "{url}"),
        }
    }
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s).is_ok_and(|url| url.scheme() == "http" || url.scheme() == "https")
}

impl DocumentSource {
    /// Classifies a locator: http(s) URLs are fetched, anything else is a path.
    pub fn from_string(s: &str) -> Self {
        if is_http_url(s) {
            Self::Http(s.to_string())
        } else {
            Self::FileSystem(PathBuf::from(s))
        }
    }

    /// Resolves an import relative to this document.
    pub fn resolve(&self, locator: &str) -> Self {
        if is_http_url(locator) {
            return Self::Http(locator.to_string());
        }
        match self {
            DocumentSource::FileSystem(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                Self::FileSystem(base.join(locator))
            }
            DocumentSource::Http(base) => match Url::parse(base).and_then(|url| url.join(locator)) {
                Ok(url) => Self::Http(url.to_string()),
                Err(_) => Self::FileSystem(PathBuf::from(locator)),
            },
        }
    }

    /// Directory relative copy sources resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        match self {
            DocumentSource::FileSystem(path) => {
                Some(path.parent().map(Path::to_path_buf).unwrap_or_default())
            }
            DocumentSource::Http(_) => None,
        }
    }

    /// Identity used to detect import cycles.
    fn identity(&self) -> String {
        match self {
            DocumentSource::FileSystem(path) => fs::canonicalize(path)
                .unwrap_or_else(|_| path.clone())
                .display()
                .to_string(),
            DocumentSource::Http(url) => url.clone(),
        }
    }
}

/// Fetches the raw bytes of a document.
pub trait DocumentLoader {
    fn load(&self, source: &DocumentSource) -> Result<Vec<u8>>;
}

/// Reads documents from disk.
pub struct LocalLoader;

impl LocalLoader {
    fn read(path: &Path) -> Result<Vec<u8>> {
        if !path.is_file() {
            return Err(Error::DocumentNotFoundError { path: path.display().to_string() });
        }
        Ok(fs::read(path)?)
    }
}

/// Fetches documents over HTTP. Certificates are not verified.
pub struct HttpLoader {
    client: Client,
}

impl HttpLoader {
    pub fn new() -> Result<Self> {
        let client = Client::builder().danger_accept_invalid_certs(true).build().map_err(|e| {
            Error::ImportError { locator: String::new(), message: e.to_string() }
        })?;
        Ok(Self { client })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fail = |message: String| Error::ImportError { locator: url.to_string(), message };
        debug!("Fetching document {url}");
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| fail(e.to_string()))?;
        Ok(response.bytes().map_err(|e| fail(e.to_string()))?.to_vec())
    }
}

/// Dispatches to the local or HTTP loader by source kind.
pub struct SourceLoader {
    http: HttpLoader,
}

impl SourceLoader {
    pub fn new() -> Result<Self> {
        Ok(Self { http: HttpLoader::new()? })
    }
}

impl DocumentLoader for SourceLoader {
    fn load(&self, source: &DocumentSource) -> Result<Vec<u8>> {
        match source {
            DocumentSource::FileSystem(path) => LocalLoader::read(path),
            DocumentSource::Http(url) => self.http.fetch(url),
        }
    }
}

impl DocumentLoader for LocalLoader {
    fn load(&self, source: &DocumentSource) -> Result<Vec<u8>> {
        match source {
            DocumentSource::FileSystem(path) => LocalLoader::read(path),
            DocumentSource::Http(url) => Err(Error::ImportError {
                locator: url.clone(),
                message: "remote documents are not available to this loader".to_string(),
            }),
        }
    }
}

/// Loads `source` and everything it imports.
///
/// # Errors
/// * `Error::DocumentNotFoundError` if the top-level document is missing
/// * `Error::ParseError` if the top-level document is malformed
/// * `Error::ImportError` if an import is unreachable, malformed or cyclic
pub fn load_document(source: &DocumentSource) -> Result<TemplateDocument> {
    load_document_with(&SourceLoader::new()?, source)
}

pub fn load_document_with(
    loader: &dyn DocumentLoader,
    source: &DocumentSource,
) -> Result<TemplateDocument> {
    let mut chain = Vec::new();
    load_recursive(loader, source, &mut chain)
}

fn as_import_error(source: &DocumentSource, err: Error) -> Error {
    match err {
        Error::ImportError { .. } => err,
        other => Error::ImportError { locator: source.to_string(), message: other.to_string() },
    }
}

fn load_recursive(
    loader: &dyn DocumentLoader,
    source: &DocumentSource,
    chain: &mut Vec<String>,
) -> Result<TemplateDocument> {
    let identity = source.identity();
    if chain.contains(&identity) {
        return Err(Error::ImportError {
            locator: source.to_string(),
            message: format!("import cycle: {} -> {identity}", chain.join(" -> ")),
        });
    }

    let is_import = !chain.is_empty();
    debug!("Loading document {source}");
    let document = loader
        .load(source)
        .and_then(|bytes| TemplateDocument::from_slice(&bytes))
        .map_err(|e| if is_import { as_import_error(source, e) } else { e })?;

    if document.imports.is_empty() {
        return Ok(document);
    }

    chain.push(identity);
    let mut imported = Vec::with_capacity(document.imports.len());
    for locator in &document.imports {
        imported.push(load_recursive(loader, &source.resolve(locator), chain)?);
    }
    chain.pop();

    Ok(TemplateDocument::compose(imported, document))
}
