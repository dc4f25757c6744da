use tracing::{info, instrument, warn};

use crate::catalog::{RemoteCatalog, RemotePlaylist};
use crate::db::{self, Pool};
use crate::error::{Result, SyncError};
use crate::model::{Playlist, PlaylistSync, SyncOptions};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedPlaylist {
    pub remote: RemotePlaylist,
    /// Created during this run, so it is known to be empty.
    pub created: bool,
}

/// Makes sure the remote mirror of a local playlist exists.
pub struct RemotePlaylistProvisioner<'a> {
    pool: &'a Pool,
    catalog: &'a dyn RemoteCatalog,
    retry: RetryPolicy,
}

impl<'a> RemotePlaylistProvisioner<'a> {
    pub fn new(pool: &'a Pool, catalog: &'a dyn RemoteCatalog, retry: RetryPolicy) -> Self {
        Self {
            pool,
            catalog,
            retry,
        }
    }

    /// Reuse the mapped remote playlist when it can still be fetched,
    /// otherwise create one under the authenticated account (if allowed) and
    /// record its id on the sync row.
    #[instrument(skip_all, fields(playlist_id = playlist.id, sync_id = sync.id))]
    pub async fn provision(
        &self,
        playlist: &Playlist,
        sync: &PlaylistSync,
        options: &SyncOptions,
    ) -> Result<ProvisionedPlaylist> {
        if let Some(external_id) = sync.external_id.as_deref() {
            match self
                .retry
                .run("get_playlist", || self.catalog.get_playlist(external_id))
                .await
            {
                Ok(Some(remote)) => {
                    return Ok(ProvisionedPlaylist {
                        remote,
                        created: false,
                    })
                }
                Ok(None) => warn!(external_id, "mapped remote playlist no longer exists"),
                Err(err) => warn!(external_id, error = %err, "failed to fetch mapped remote playlist"),
            }
        }

        if !options.create_if_not_exists {
            return Err(SyncError::RemotePlaylistUnavailable {
                playlist_id: playlist.id,
            });
        }

        let account = self
            .retry
            .run("current_account", || self.catalog.current_account())
            .await?;
        let remote = self
            .retry
            .run("create_playlist", || {
                self.catalog.create_playlist(
                    &account,
                    &playlist.name,
                    playlist.description.as_deref(),
                    playlist.is_public,
                )
            })
            .await?;
        db::set_sync_external_id(self.pool, sync.id, &remote.id).await?;
        info!(external_id = %remote.id, "created remote playlist");

        Ok(ProvisionedPlaylist {
            remote,
            created: true,
        })
    }
}
