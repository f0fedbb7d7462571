//! Progress sources for the monitor loop.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::gateway::client::HttpGateway;
use crate::gateway::error::GatewayResult;
use crate::tracker::StatusSnapshot;

/// Where the monitor loop reads aggregate progress from.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch_progress(&self) -> GatewayResult<StatusSnapshot>;
}

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct RepoEntry {
    name: String,
}

/// Counts inventory repositories that already exist in the target
/// organization. Names compare case-insensitively.
pub struct TargetOrgProgress {
    gateway: Arc<HttpGateway>,
    organization: String,
    expected: Vec<String>,
}

impl TargetOrgProgress {
    pub fn new(
        gateway: Arc<HttpGateway>,
        organization: impl Into<String>,
        expected: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            gateway,
            organization: organization.into(),
            expected: expected.into_iter().collect(),
        }
    }

    async fn list_target_repos(&self) -> GatewayResult<HashSet<String>> {
        let mut names = HashSet::new();
        let mut page = 1usize;
        loop {
            let path = format!(
                "/orgs/{}/repos?per_page={PAGE_SIZE}&page={page}",
                self.organization
            );
            let entries: Vec<RepoEntry> = self.gateway.get_json(&path).await?;
            let count = entries.len();
            names.extend(entries.into_iter().map(|e| e.name.to_lowercase()));
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!(org = %self.organization, pages = page, repos = names.len(), "listed target repos");
        Ok(names)
    }
}

#[async_trait]
impl ProgressSource for TargetOrgProgress {
    async fn fetch_progress(&self) -> GatewayResult<StatusSnapshot> {
        let present = self.list_target_repos().await?;
        let migrated = self
            .expected
            .iter()
            .filter(|name| present.contains(&name.to_lowercase()))
            .count() as u64;

        let mut snapshot = StatusSnapshot::from_counts(self.expected.len() as u64, migrated, 0);
        snapshot.updated_at = Utc::now();
        Ok(snapshot)
    }
}
