//! Remote workspace backend.
//!
//! Talks to the workspace files API:
//!
//! ```text
//! GET    {base}/workspaces/{id}/files                -> {"files": [...]}
//! GET    {base}/workspaces/{id}/files/{path}         -> {"path", "content"}
//! PUT    {base}/workspaces/{id}/files/{path}         <- {"content"}
//! DELETE {base}/workspaces/{id}/files/{path}
//! POST   {base}/workspaces/{id}/files/{path}/rename  <- {"new_path"}
//! ```

use super::{FileEntry, FileStore, normalize_path};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP-backed file store.
pub struct HttpStore {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL, e.g. `http://localhost:8000/api`.
    base_url: String,
    /// Optional bearer token.
    token: Option<String>,
}

impl HttpStore {
    /// Create a store against an API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn files_url(&self, workspace: &str) -> String {
        format!(
            "{}/workspaces/{}/files",
            self.base_url,
            urlencoding::encode(workspace)
        )
    }

    fn file_url(&self, workspace: &str, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        Ok(format!("{}/{}", self.files_url(workspace), encode_path(&path)))
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

impl FileStore for HttpStore {
    fn read_file(&self, workspace: &str, path: &str) -> Result<Option<String>> {
        let url = self.file_url(workspace, path)?;
        match self.authorize(self.agent.get(&url)).call() {
            Ok(mut response) => {
                let file: WireFile = response.body_mut().read_json()?;
                Ok(Some(file.content))
            }
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<()> {
        let url = self.file_url(workspace, path)?;
        self.authorize(self.agent.put(&url))
            .send_json(&WireWrite { content })?;
        log::debug!("PUT {url}");
        Ok(())
    }

    fn delete_file(&self, workspace: &str, path: &str) -> Result<()> {
        let url = self.file_url(workspace, path)?;
        match self.authorize(self.agent.delete(&url)).call() {
            Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn rename_file(&self, workspace: &str, from: &str, to: &str) -> Result<()> {
        let url = format!("{}/rename", self.file_url(workspace, from)?);
        let new_path = normalize_path(to)?;
        match self
            .authorize(self.agent.post(&url))
            .send_json(&WireRename { new_path: &new_path })
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(404)) => Err(Error::NotFound {
                path: from.to_string(),
            }),
            Err(ureq::Error::StatusCode(409)) => Err(Error::Conflict { path: new_path }),
            Err(err) => Err(err.into()),
        }
    }

    fn list_files(&self, workspace: &str) -> Result<Vec<FileEntry>> {
        let url = self.files_url(workspace);
        let listing: WireListing = self
            .authorize(self.agent.get(&url))
            .call()?
            .body_mut()
            .read_json()?;
        Ok(listing.files.into_iter().map(Into::into).collect())
    }
}

/// Percent-encode each segment of a workspace-relative path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireListing {
    files: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    path: String,
    #[serde(default)]
    is_dir: bool,
    size: Option<u64>,
    modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    content: String,
}

#[derive(Debug, Serialize)]
struct WireWrite<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRename<'a> {
    new_path: &'a str,
}

impl From<WireEntry> for FileEntry {
    fn from(e: WireEntry) -> Self {
        Self {
            path: e.path,
            is_dir: e.is_dir,
            size: e.size.unwrap_or_default(),
            modified_at: e
                .modified_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = HttpStore::new("http://localhost:8000/api/");
        assert_eq!(store.base_url(), "http://localhost:8000/api");
        assert_eq!(
            store.file_url("abc123", "/host_vars/web.yml").unwrap(),
            "http://localhost:8000/api/workspaces/abc123/files/host_vars/web.yml"
        );
        assert!(store.file_url("abc123", "../secrets").is_err());
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("host_vars/my host.yml"), "host_vars/my%20host.yml");
        assert_eq!(encode_path("a?b#c"), "a%3Fb%23c");
        assert_eq!(encode_path("secrets/ssh_keys/web~1"), "secrets/ssh_keys/web~1");
    }

    #[test]
    fn test_workspace_id_is_one_segment() {
        let store = HttpStore::new("http://localhost:8000/api");
        assert_eq!(
            store.files_url("team/prod"),
            "http://localhost:8000/api/workspaces/team%2Fprod/files"
        );
    }

    #[test]
    fn test_listing_entry_conversion() {
        let json = r#"{"files":[
            {"path":"host_vars","is_dir":true,"modified_at":"2026-01-02T03:04:05Z"},
            {"path":"host_vars/web.yml","is_dir":false,"size":42,"modified_at":"2026-01-02T03:04:05Z"},
            {"path":"inventory.yml","is_dir":false,"size":null}
        ]}"#;
        let listing: WireListing = serde_json::from_str(json).unwrap();
        let entries: Vec<FileEntry> = listing.files.into_iter().map(Into::into).collect();

        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, 42);
        assert!(entries[1].modified_at.is_some());
        assert_eq!(entries[2].size, 0);
        assert_eq!(entries[2].modified_at, None);
    }
}
