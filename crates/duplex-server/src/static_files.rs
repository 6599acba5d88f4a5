//! Static file serving.
//!
//! [`StaticFiles`] serves a directory under a path prefix, with:
//!
//! - Index file for directory requests
//! - Optional index fallback for unknown paths, for single-page apps whose
//!   router runs in the browser
//! - `ETag` revalidation through `If-None-Match`
//! - MIME type detection by extension
//!
//! Paths with `..` components or hidden (dot-prefixed) segments are refused,
//! and resolved paths must stay inside the root.
//!
//! # Example
//!
//! ```rust
//! use duplex_server::StaticFiles;
//!
//! let route = StaticFiles::new("./public")
//!     .index("index.html")
//!     .fallback_to_index(true)
//!     .cache_control("max-age=3600")
//!     .route("/app");
//!
//! assert!(route.spec().is_prefix());
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use duplex_core::Status;
use duplex_middleware::types::{full, json_response, status_response, HttpResponse};
use http::header::{HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use http::{HeaderMap, Method, Response, StatusCode};
use thiserror::Error;

use crate::route::HttpRoute;

/// Why a static file could not be served.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// No file at the requested path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is refused.
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Only `GET` and `HEAD` are served.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the error as a JSON status body.
    pub fn into_response(self) -> HttpResponse {
        match self {
            Self::NotFound(_) => status_response(&Status::not_found("Not Found")),
            Self::Forbidden(reason) => status_response(&Status::permission_denied(reason)),
            Self::MethodNotAllowed => json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                Status::unimplemented("method not allowed").to_json_bytes(),
            ),
            Self::Io(e) => {
                tracing::warn!(error = %e, "failed to read static file");
                status_response(&Status::internal("internal server error"))
            }
        }
    }
}

/// Serves files below a root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: Option<String>,
    fallback_to_index: bool,
    cache_control: Option<String>,
    serve_hidden: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Serves `root`. Hidden files are refused and there is no index.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: None,
            fallback_to_index: false,
            cache_control: None,
            serve_hidden: false,
            mime_types: HashMap::new(),
        }
    }

    /// File served for directory requests, e.g. `index.html`.
    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index_file = Some(index.into()).filter(|index| !index.is_empty());
        self
    }

    /// Serves the root index instead of `404` when no file matches.
    #[must_use]
    pub fn fallback_to_index(mut self, enabled: bool) -> Self {
        self.fallback_to_index = enabled;
        self
    }

    /// `Cache-Control` value sent with every file.
    #[must_use]
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Allows files and directories whose name starts with a dot.
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Maps an extension (without the dot) to a content type.
    #[must_use]
    pub fn mime_type(mut self, extension: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.mime_types.insert(extension.into().to_ascii_lowercase(), mime_type.into());
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mounts the files as a prefix route. The prefix is stripped before the
    /// remaining path is resolved against the root.
    pub fn route(self, prefix: &str) -> HttpRoute {
        let files = Arc::new(self);
        let mount = prefix.trim_end_matches('/').to_string();
        HttpRoute::new(prefix, move |call| {
            let files = Arc::clone(&files);
            let mount = mount.clone();
            async move {
                let path = call.request.uri().path();
                let relative = path.strip_prefix(mount.as_str()).unwrap_or(path);
                let relative = match urlencoding::decode(relative) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(_) => return StaticFileError::Forbidden("path is not valid UTF-8".into()).into_response(),
                };
                files
                    .serve(&relative, call.request.headers(), call.request.method())
                    .await
                    .unwrap_or_else(StaticFileError::into_response)
            }
        })
        .prefix()
    }

    /// Serves `request_path`, relative to the root.
    ///
    /// # Errors
    ///
    /// Returns [`StaticFileError`] for methods other than `GET` and `HEAD`,
    /// refused paths, missing files and read failures.
    pub async fn serve(
        &self,
        request_path: &str,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<HttpResponse, StaticFileError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed);
        }

        match self.locate(request_path).await {
            Ok(path) => self.serve_file(&path, headers, method).await,
            Err(StaticFileError::NotFound(_)) if self.fallback_to_index => {
                let index = self.locate("/").await?;
                self.serve_file(&index, headers, method).await
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a request path to a file, applying the index for
    /// directories.
    async fn locate(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let path = self.resolve_path(request_path).await?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        if !metadata.is_dir() {
            return Ok(path);
        }
        if let Some(index) = &self.index_file {
            let index_path = path.join(index);
            if tokio::fs::metadata(&index_path).await.is_ok_and(|m| m.is_file()) {
                return Ok(index_path);
            }
        }
        Err(StaticFileError::NotFound(request_path.to_string()))
    }

    async fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden("directory traversal not allowed".into()));
                }
                Component::Normal(name) if !self.serve_hidden && name.to_string_lossy().starts_with('.') => {
                    return Err(StaticFileError::Forbidden("hidden files not allowed".into()));
                }
                _ => {}
            }
        }

        let canonical = tokio::fs::canonicalize(self.root.join(relative))
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        let root = tokio::fs::canonicalize(&self.root).await.map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("static root {} unavailable: {e}", self.root.display()),
            )
        })?;
        if !canonical.starts_with(&root) {
            return Err(StaticFileError::Forbidden("path escapes root directory".into()));
        }
        Ok(canonical)
    }

    async fn serve_file(&self, path: &Path, headers: &HeaderMap, method: &Method) -> Result<HttpResponse, StaticFileError> {
        let metadata = tokio::fs::metadata(path).await?;
        let etag = etag(&metadata);

        if let Some(etag) = &etag {
            let matches = headers
                .get(IF_NONE_MATCH)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == "*" || value.split(',').any(|tag| tag.trim() == etag));
            if matches {
                return Ok(self.respond(StatusCode::NOT_MODIFIED, Bytes::new(), None, Some(etag.as_str())));
            }
        }

        let content_type = self.detect_mime_type(path);
        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(tokio::fs::read(path).await?)
        };
        let mut response = self.respond(StatusCode::OK, body, Some(&content_type), etag.as_deref());
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
        Ok(response)
    }

    fn respond(&self, status: StatusCode, body: Bytes, content_type: Option<&str>, etag: Option<&str>) -> HttpResponse {
        let mut response = Response::new(full(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        if let Some(value) = content_type.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(CONTENT_TYPE, value);
        }
        if let Some(value) = etag.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(ETAG, value);
        }
        if let Some(value) = self.cache_control.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(CACHE_CONTROL, value);
        }
        response
    }

    fn detect_mime_type(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if let Some(mime) = self.mime_types.get(&extension) {
            return mime.clone();
        }

        match extension.as_str() {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "pdf" => "application/pdf",
            "wasm" => "application/wasm",
            "webmanifest" => "application/manifest+json",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

/// Weak validator from modification time and size.
fn etag(metadata: &std::fs::Metadata) -> Option<String> {
    let modified = metadata.modified().ok()?;
    let since_epoch = modified.duration_since(SystemTime::UNIX_EPOCH).ok()?;
    Some(format!("\"{:x}-{:x}\"", since_epoch.as_nanos(), metadata.len()))
}
