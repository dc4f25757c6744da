#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use playlist_sync::catalog::{CatalogError, RemoteCatalog, RemotePlaylist, TrackCandidate};
use playlist_sync::db::{self, NewPlaylist, NewSong, Pool};
use playlist_sync::model::Platform;

pub async fn setup_pool() -> Pool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn track_uri(n: usize) -> String {
    format!("spotify:track:{:0>22}", n)
}

pub fn candidate(n: usize) -> TrackCandidate {
    TrackCandidate {
        id: format!("{:0>22}", n),
        name: format!("Track {}", n),
        artists: vec!["Artist".into()],
        uri: track_uri(n),
    }
}

pub fn song(title: &str, uri: Option<String>) -> NewSong {
    NewSong {
        title: title.to_string(),
        artist: "Artist".to_string(),
        spotify_uri: uri,
    }
}

pub async fn import(pool: &Pool, owner_id: i64, name: &str, songs: Vec<NewSong>) -> i64 {
    db::import_playlist(
        pool,
        &NewPlaylist {
            owner_id,
            name: name.to_string(),
            description: Some(format!("{} description", name)),
            is_public: false,
            songs,
        },
    )
    .await
    .unwrap()
}

pub async fn count(pool: &Pool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCall {
    pub external_id: String,
    pub uris: Vec<String>,
}

#[derive(Default)]
struct CatalogState {
    playlists: HashMap<String, Vec<String>>,
    search_results: HashMap<String, Result<Vec<TrackCandidate>, ()>>,
    add_failures: VecDeque<bool>,
    fail_create_for: HashSet<String>,
    panic_create_for: HashSet<String>,
    created: Vec<String>,
    add_calls: Vec<AddCall>,
    remove_calls: Vec<Vec<String>>,
    searches: Vec<String>,
}

/// In-memory remote catalog recording every call it receives.
#[derive(Clone, Default)]
pub struct RecordingCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_search(&self, title: &str, candidates: Vec<TrackCandidate>) {
        self.state
            .lock()
            .await
            .search_results
            .insert(title.to_string(), Ok(candidates));
    }

    pub async fn with_failing_search(&self, title: &str) {
        self.state
            .lock()
            .await
            .search_results
            .insert(title.to_string(), Err(()));
    }

    /// Outcome of the next add calls, in order: `true` fails the call.
    pub async fn with_add_failures(&self, failures: Vec<bool>) {
        self.state.lock().await.add_failures = VecDeque::from(failures);
    }

    pub async fn fail_create_for(&self, name: &str) {
        self.state.lock().await.fail_create_for.insert(name.to_string());
    }

    pub async fn panic_create_for(&self, name: &str) {
        self.state.lock().await.panic_create_for.insert(name.to_string());
    }

    pub async fn remote_tracks(&self, external_id: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .playlists
            .get(external_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn created(&self) -> Vec<String> {
        self.state.lock().await.created.clone()
    }

    pub async fn add_calls(&self) -> Vec<AddCall> {
        self.state.lock().await.add_calls.clone()
    }

    pub async fn remove_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().await.remove_calls.clone()
    }

    pub async fn searches(&self) -> Vec<String> {
        self.state.lock().await.searches.clone()
    }

    pub async fn total_calls(&self) -> usize {
        let state = self.state.lock().await;
        state.created.len() + state.add_calls.len() + state.remove_calls.len() + state.searches.len()
    }
}

#[async_trait]
impl RemoteCatalog for RecordingCatalog {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn get_playlist(&self, external_id: &str) -> Result<Option<RemotePlaylist>, CatalogError> {
        let state = self.state.lock().await;
        Ok(state.playlists.contains_key(external_id).then(|| RemotePlaylist {
            id: external_id.to_string(),
            name: external_id.to_string(),
            public: Some(false),
        }))
    }

    async fn create_playlist(
        &self,
        _owner_account_id: &str,
        name: &str,
        _description: Option<&str>,
        public: bool,
    ) -> Result<RemotePlaylist, CatalogError> {
        let mut state = self.state.lock().await;
        if state.panic_create_for.contains(name) {
            panic!("catalog exploded creating {}", name);
        }
        if state.fail_create_for.contains(name) {
            return Err(CatalogError::Api {
                status: 403,
                body: "{\"error\":\"forbidden\"}".into(),
            });
        }
        let id = format!("remote-{}", state.created.len() + 1);
        state.created.push(name.to_string());
        state.playlists.insert(id.clone(), Vec::new());
        Ok(RemotePlaylist {
            id,
            name: name.to_string(),
            public: Some(public),
        })
    }

    async fn get_playlist_tracks(&self, external_id: &str) -> Result<Vec<String>, CatalogError> {
        let state = self.state.lock().await;
        state
            .playlists
            .get(external_id)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }

    async fn add_tracks(
        &self,
        external_id: &str,
        uris: &[String],
        _position: Option<u32>,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        state.add_calls.push(AddCall {
            external_id: external_id.to_string(),
            uris: uris.to_vec(),
        });
        if state.add_failures.pop_front().unwrap_or(false) {
            return Err(CatalogError::Transient("502 bad gateway".into()));
        }
        state
            .playlists
            .entry(external_id.to_string())
            .or_default()
            .extend(uris.iter().cloned());
        Ok(())
    }

    async fn remove_tracks(&self, external_id: &str, uris: &[String]) -> Result<(), CatalogError> {
        let mut state = self.state.lock().await;
        state.remove_calls.push(uris.to_vec());
        if let Some(tracks) = state.playlists.get_mut(external_id) {
            tracks.retain(|t| !uris.contains(t));
        }
        Ok(())
    }

    async fn search_track(
        &self,
        title: &str,
        _artist: &str,
    ) -> Result<Vec<TrackCandidate>, CatalogError> {
        let mut state = self.state.lock().await;
        state.searches.push(title.to_string());
        match state.search_results.get(title) {
            Some(Ok(candidates)) => Ok(candidates.clone()),
            Some(Err(())) => Err(CatalogError::Transient("connection reset".into())),
            None => Ok(Vec::new()),
        }
    }

    async fn current_account(&self) -> Result<String, CatalogError> {
        Ok("account-1".into())
    }
}
