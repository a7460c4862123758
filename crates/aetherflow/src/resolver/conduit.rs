//! Conduit mounting: concurrent fetch, transactional commit.

use super::Run;
use crate::History;
use crate::context::SessionContext;
use crate::events::ResolverEvent;
use crate::syntax::MountDirective;
use futures::future::join_all;
use tracing::{info, warn};

impl Run<'_, '_> {
    /// Fetch every mount concurrently and commit the successful ones.
    ///
    /// All fetches settle before anything is committed. Commits then happen
    /// in directive order, so a repeated alias keeps the last successful
    /// fetch. A failed mount never touches the table and never raises.
    pub(super) async fn mount_all(&self, ctx: &mut SessionContext, mounts: &[MountDirective]) {
        if mounts.is_empty() {
            return;
        }
        for m in mounts {
            self.emit(ResolverEvent::MountStarted {
                alias: m.alias.clone(),
                source: m.source.clone(),
            });
        }

        let results = join_all(mounts.iter().map(|m| self.fetch_conduit(m))).await;

        let mut committed = 0usize;
        for (m, result) in mounts.iter().zip(results) {
            match result {
                Ok(history) => {
                    self.emit(ResolverEvent::MountSucceeded {
                        alias: m.alias.clone(),
                        source: m.source.clone(),
                        turns: history.len(),
                    });
                    ctx.commit_conduit(m.alias.clone(), history);
                    committed += 1;
                }
                Err(error) => {
                    warn!("Conduit '{}' from '{}' not mounted: {error}", m.alias, m.source);
                    self.emit(ResolverEvent::MountFailed {
                        alias: m.alias.clone(),
                        source: m.source.clone(),
                        error,
                    });
                }
            }
        }
        info!("Mounted {committed}/{} conduit(s)", mounts.len());
    }

    async fn fetch_conduit(&self, mount: &MountDirective) -> Result<History, String> {
        let config = self.config();
        let fetch = self
            .resolver
            .surface
            .fetch_conversation(&mount.source, &config.selectors);
        match config.mount_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| format!("timed out after {}ms", limit.as_millis()))?,
            None => fetch.await,
        }
    }
}
