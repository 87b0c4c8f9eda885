//! Resource service
//!
//! Single-resource operations: direct fetch (open by link), download,
//! owner saves, moderation approval and soft delete. Payload bytes never
//! pass through here; callers get a time-limited retrieval URL from a
//! [`PayloadLocator`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::engagement::EngagementLedger;
use crate::error::{Error, Result};
use crate::models::{Resource, Viewer};
use crate::store::ResourceStore;
use crate::visibility;

/// A time-limited URL for a stored payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object storage boundary
pub trait PayloadLocator: Send + Sync {
    fn retrieval_url(&self, storage_key: &str, ttl: Duration) -> Result<RetrievalUrl>;
}

/// Resolves storage keys against a public base URL with an expiry stamp
#[derive(Debug, Clone)]
pub struct BaseUrlLocator {
    base_url: String,
}

impl BaseUrlLocator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl PayloadLocator for BaseUrlLocator {
    fn retrieval_url(&self, storage_key: &str, ttl: Duration) -> Result<RetrievalUrl> {
        let key = storage_key.trim_start_matches('/');
        if key.is_empty() {
            return Err(Error::invalid_format("resource has no stored payload"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::config(format!("retrieval URL lifetime out of range: {}", e)))?;
        let expires_at = Utc::now() + ttl;
        Ok(RetrievalUrl {
            url: format!("{}/{}?expires={}", self.base_url, key, expires_at.timestamp()),
            expires_at,
        })
    }
}

/// A directly fetched resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: Resource,
    /// Absent when the storage backend could not produce a URL
    pub file_url: Option<RetrievalUrl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub resource_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub download_url: RetrievalUrl,
}

/// Trim, drop empties, dedupe (keeping first occurrence)
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t: &String| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

#[derive(Clone)]
pub struct ResourceService {
    store: Arc<dyn ResourceStore>,
    ledger: EngagementLedger,
    locator: Arc<dyn PayloadLocator>,
    storage: StorageConfig,
}

impl ResourceService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        ledger: EngagementLedger,
        locator: Arc<dyn PayloadLocator>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            locator,
            storage,
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<Resource> {
        self.store
            .find_by_id(id)
            .await?
            .filter(visibility::is_fetchable)
            .ok_or_else(|| Error::not_found("resource", id))
    }

    /// Open a resource by id. Approval and sharing scope are not checked.
    #[instrument(skip(self))]
    pub async fn get_resource(&self, id: Uuid) -> Result<ResourceView> {
        let resource = self.fetch(id).await?;

        if let Err(e) = self.ledger.increment_view(id).await {
            warn!(resource_id = %id, error = %e, "failed to count view");
        }

        let file_url = match self
            .locator
            .retrieval_url(&resource.storage_key, self.storage.view_url_ttl)
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(resource_id = %id, error = %e, "no retrieval URL for resource");
                None
            }
        };

        Ok(ResourceView { resource, file_url })
    }

    #[instrument(skip(self))]
    pub async fn download_resource(&self, id: Uuid) -> Result<DownloadLink> {
        let resource = self.fetch(id).await?;

        if let Err(e) = self.ledger.increment_download(id).await {
            warn!(resource_id = %id, error = %e, "failed to count download");
        }

        let download_url = self
            .locator
            .retrieval_url(&resource.storage_key, self.storage.download_url_ttl)?;

        Ok(DownloadLink {
            resource_id: resource.id,
            file_name: resource.file_name,
            file_type: resource.file_type,
            file_size: resource.file_size,
            download_url,
        })
    }

    /// Create a resource owned by the viewer, or update one they own.
    /// Counters and approval are not writable through this path.
    #[instrument(skip(self, viewer, resource), fields(viewer_id = %viewer.id, resource_id = %resource.id))]
    pub async fn save_resource(&self, viewer: &Viewer, mut resource: Resource) -> Result<Resource> {
        resource.validate()?;
        resource.tags = normalize_tags(&resource.tags);

        match self.store.find_by_id(resource.id).await? {
            Some(existing) => {
                if existing.owner_id != viewer.id {
                    return Err(Error::forbidden("only the owner can edit this resource"));
                }
                resource.owner_id = existing.owner_id;
                resource.is_approved = existing.is_approved;
                resource.created_at = existing.created_at;
            }
            None => {
                resource.owner_id = viewer.id;
                resource.is_approved = true;
                resource.download_count = 0;
                resource.view_count = 0;
            }
        }

        let saved = self.store.save(&resource).await?;
        info!(resource_id = %saved.id, "resource saved");
        Ok(saved)
    }

    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn set_approval(&self, viewer: &Viewer, id: Uuid, approved: bool) -> Result<()> {
        if !viewer.can_moderate() {
            return Err(Error::forbidden("moderator role required"));
        }
        if !self.store.set_approval(id, approved).await? {
            return Err(Error::not_found("resource", id));
        }
        info!(resource_id = %id, approved, "resource approval changed");
        Ok(())
    }

    /// Soft delete; allowed for the owner and for admins
    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn delete_resource(&self, viewer: &Viewer, id: Uuid) -> Result<()> {
        let resource = self.fetch(id).await?;
        if resource.owner_id != viewer.id && !viewer.is_admin() {
            return Err(Error::forbidden("only the owner or an admin can delete this resource"));
        }
        if !self.store.soft_delete(id).await? {
            return Err(Error::not_found("resource", id));
        }
        info!(resource_id = %id, "resource deleted");
        Ok(())
    }
}
