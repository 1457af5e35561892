//! WebDAV storage backend.
//!
//! Talks to a single WebDAV collection (Nextcloud, Jianguoyun, Apache
//! mod_dav and friends) over plain HTTP verbs: `PROPFIND` for listings and
//! metadata, `GET`/`PUT`/`DELETE` for content, `MKCOL` to create parent
//! collections before an upload.
//!
//! Listings are one level deep (`Depth: 1`); nested collections are not
//! descended into.

use crate::{
    FileInfo, StorageBackend,
    backend::FileInfoStream,
    error::{ErrorKind, Result},
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

const DAV_NAMESPACE: &str = "DAV:";
const PROPFIND_BODY: &str = "<?xml version='1.0' encoding='utf-8'?>\n\
<d:propfind xmlns:d='DAV:'>\n  <d:allprop/>\n</d:propfind>";

/// WebDAV storage backend.
///
/// All paths are relative to the collection URL given at construction.
///
/// ```no_run
/// use bidsort_storage::backend::WebDavBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = WebDavBackend::new(
///     "webdav",
///     "https://dav.example.com/remote.php/dav/files/alice/投标",
///     Some("alice".to_string()),
///     Some("app-password".to_string()),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebDavBackend {
    name: String,
    /// Collection URL, always with a trailing slash so relative joins land
    /// inside it.
    base: Url,
    username: Option<String>,
    password: Option<String>,
    client: Client,
}

impl WebDavBackend {
    pub fn new(
        name: impl Into<String>,
        url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let mut url = url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base = Url::parse(&url).or_raise(|| ErrorKind::BackendError(format!("invalid WebDAV URL `{url}`")))?;
        if !matches!(base.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::BackendError(format!("unsupported WebDAV URL scheme `{}`", base.scheme())));
        }
        let client = Client::builder()
            .build()
            .or_raise(|| ErrorKind::BackendError("could not build HTTP client".to_string()))?;
        Ok(Self { name: name.into(), base, username, password, client })
    }

    /// Build the URL for a relative storage path, percent-encoding each
    /// component.
    fn url(&self, path: &Path) -> Result<Url> {
        let validated = validate_path(path)?;
        let encoded = validated
            .components()
            .map(|component| urlencoding::encode(&component.as_os_str().to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.base
            .join(&encoded)
            .or_raise(|| ErrorKind::InvalidPath(validated.clone()))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match (&self.username, &self.password) {
            (None, None) => builder,
            (username, password) => builder.basic_auth(username.clone().unwrap_or_default(), password.clone()),
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &Path) -> Result<Response> {
        let response = builder
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("WebDAV request for `{}` failed", path.display())))?;
        check_status(response, path)
    }

    async fn propfind(&self, url: Url, path: &Path) -> Result<Vec<FileInfo>> {
        let method = Method::from_bytes(b"PROPFIND").or_raise(|| ErrorKind::BackendError("PROPFIND".to_string()))?;
        let builder = self
            .request(method, url)
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);
        let body = self
            .send(builder, path)
            .await?
            .text()
            .await
            .or_raise(|| ErrorKind::Network("could not read PROPFIND response".to_string()))?;
        parse_multistatus(&body, &self.base)
    }

    /// Create every parent collection of `path`. Servers answer 405 or 409
    /// for collections that already exist; both are fine.
    async fn ensure_parents(&self, path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mkcol = Method::from_bytes(b"MKCOL").or_raise(|| ErrorKind::BackendError("MKCOL".to_string()))?;
        let mut current = PathBuf::new();
        for component in parent.components() {
            current.push(component);
            let mut url = self.url(&current)?;
            url.set_path(&format!("{}/", url.path().trim_end_matches('/')));
            let response = self
                .request(mkcol.clone(), url)
                .send()
                .await
                .or_raise(|| ErrorKind::Network(format!("MKCOL `{}` failed", current.display())))?;
            let status = response.status();
            if !(status.is_success() || matches!(status, StatusCode::METHOD_NOT_ALLOWED | StatusCode::CONFLICT)) {
                tracing::debug!(collection = %current.display(), %status, "Unexpected MKCOL status");
            }
        }
        Ok(())
    }
}

fn check_status(response: Response, path: &Path) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let kind = match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound(path.to_path_buf()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Network(format!("{} returned {status}", path.display())),
    };
    Err(exn::Exn::from(kind))
}

/// Decode an href (absolute URL or absolute path) into a path relative to
/// `base`. Returns `None` for the collection itself and for anything outside
/// it.
fn relative_href(href: &str, base: &Url) -> Option<PathBuf> {
    let href_path = match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    let decoded = urlencoding::decode(&href_path).ok()?;
    let base_path = urlencoding::decode(base.path()).ok()?;
    let relative = decoded.strip_prefix(base_path.as_ref())?.trim_matches('/');
    if relative.is_empty() {
        return None;
    }
    validate_path(relative).ok()
}

/// Parse a `207 Multi-Status` body into file metadata, skipping collections.
fn parse_multistatus(xml: &str, base: &Url) -> Result<Vec<FileInfo>> {
    let doc = roxmltree::Document::parse(xml)
        .or_raise(|| ErrorKind::BackendError("malformed PROPFIND response".to_string()))?;
    let mut files = Vec::new();
    for response in doc.descendants().filter(|n| n.has_tag_name((DAV_NAMESPACE, "response"))) {
        let find = |tag: &str| response.descendants().find(|n| n.has_tag_name((DAV_NAMESPACE, tag)));
        let Some(href) = find("href").and_then(|n| n.text()) else {
            continue;
        };
        let is_collection = href.ends_with('/') || find("collection").is_some();
        if is_collection {
            continue;
        }
        let Some(path) = relative_href(href, base) else {
            continue;
        };
        let size = find("getcontentlength")
            .and_then(|n| n.text())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let modified = find("getlastmodified")
            .and_then(|n| n.text())
            .and_then(|s| OffsetDateTime::parse(s.trim(), &Rfc2822).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        files.push(FileInfo::new(path, size, modified));
    }
    Ok(files)
}

#[async_trait]
impl StorageBackend for WebDavBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            match self.propfind(self.base.clone(), Path::new("/")).await {
                Ok(files) => {
                    for info in files {
                        if validated_prefix.as_ref().is_none_or(|pfx| info.path.starts_with(pfx)) {
                            yield Ok(info);
                        }
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let url = self.url(path)?;
        match self.send(self.request(Method::HEAD, url), path).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let url = self.url(path)?;
        tracing::debug!(backend = self.name(), %url, "Downloading");
        let bytes = self
            .send(self.request(Method::GET, url), path)
            .await?
            .bytes()
            .await
            .or_raise(|| ErrorKind::Network(format!("download of `{}` interrupted", path.display())))?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let validated = validate_path(path)?;
        self.ensure_parents(&validated).await?;
        let url = self.url(&validated)?;
        tracing::debug!(backend = self.name(), %url, bytes = data.len(), "Uploading");
        self.send(self.request(Method::PUT, url).body(data.to_vec()), path).await?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let url = self.url(path)?;
        self.send(self.request(Method::DELETE, url), path).await?;
        Ok(())
    }
}
