//! Spotify Web API client implementing [`RemoteCatalog`].
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, warn};

use crate::catalog::{CatalogError, RemoteCatalog, RemotePlaylist, TrackCandidate};
use crate::config::Config;
use crate::error::SyncError;
use crate::model::Platform;

pub mod model;

use model::{
    AddTracksBody, CreatePlaylistBody, PlaylistResp, PlaylistTracksPage, RemoveTracksBody,
    SearchResp, UriRef, UserResp,
};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/";

/// Candidates fetched per search. Only the count and the first hit matter.
const SEARCH_LIMIT: u32 = 10;

static TRACK_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^spotify:track:[0-9A-Za-z]{22}$").expect("valid track URI regex"));

/// Whether `uri` is a catalog track URI (local files and episodes are not).
pub fn is_track_uri(uri: &str) -> bool {
    TRACK_URI.is_match(uri)
}

/// Exact field query for a title and artist. Quotes inside the values would
/// end the phrase early, so they are dropped.
pub fn search_query(title: &str, artist: &str) -> String {
    let clean = |s: &str| s.replace('"', "").trim().to_string();
    format!("track:\"{}\" artist:\"{}\"", clean(title), clean(artist))
}

#[derive(Clone)]
pub struct SpotifyClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SpotifyClient {
    pub fn new(token: String) -> Result<Self, SyncError> {
        let base_url = Url::parse(SPOTIFY_API_BASE).expect("valid default Spotify URL");
        Self::with_base_url(token, base_url)
    }

    pub fn with_base_url(token: String, base_url: Url) -> Result<Self, SyncError> {
        let http = Client::builder()
            .user_agent(concat!("playlist-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SyncError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build a client from configuration. A missing token means the caller
    /// never connected a Spotify account.
    pub fn from_config(cfg: &Config) -> Result<Self, SyncError> {
        let token = cfg.access_token().ok_or(SyncError::NotAuthenticated)?;
        let base_url = Url::parse(&cfg.spotify.api_base)
            .map_err(|err| SyncError::Config(format!("invalid spotify.api_base: {err}")))?;
        Self::with_base_url(token, base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base_url
            .join(path)
            .map_err(|err| CatalogError::InvalidResponse(format!("invalid endpoint {path}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    pub fn build_search_request(&self, title: &str, artist: &str) -> Result<reqwest::Request, CatalogError> {
        let limit = SEARCH_LIMIT.to_string();
        let query = search_query(title, artist);
        self.request(Method::GET, self.endpoint("v1/search")?)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", limit.as_str())])
            .build()
            .map_err(transport)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, CatalogError> {
        let request = builder.build().map_err(transport)?;
        self.execute(request).await
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Response, CatalogError> {
        debug!(method = %request.method(), url = %request.url(), "sending spotify request");
        let res = self.http.execute(request).await.map_err(transport)?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = res.text().await.unwrap_or_default();
        warn!(%status, body = %body, "spotify API error");
        Err(error_for_status(status, retry_after, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, CatalogError> {
        let res = self.send(builder).await?;
        decode(res).await
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, CatalogError> {
    res.json::<T>()
        .await
        .map_err(|err| CatalogError::InvalidResponse(err.to_string()))
}

fn transport(err: reqwest::Error) -> CatalogError {
    CatalogError::Transient(err.to_string())
}

/// Map a non-success response onto the catalog error kinds.
pub fn error_for_status(status: StatusCode, retry_after: Option<u64>, body: String) -> CatalogError {
    match status {
        StatusCode::UNAUTHORIZED => CatalogError::Unauthorized,
        StatusCode::NOT_FOUND => CatalogError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited { retry_after },
        s if s.is_server_error() => CatalogError::Transient(format!("server error {}", s.as_u16())),
        s => CatalogError::Api {
            status: s.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl RemoteCatalog for SpotifyClient {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn get_playlist(&self, external_id: &str) -> Result<Option<RemotePlaylist>, CatalogError> {
        let url = self.endpoint(&format!("v1/playlists/{}", external_id))?;
        let builder = self
            .request(Method::GET, url)
            .query(&[("fields", "id,name,public")]);
        match self.send_json::<PlaylistResp>(builder).await {
            Ok(p) => Ok(Some(RemotePlaylist {
                id: p.id,
                name: p.name,
                public: p.public,
            })),
            Err(CatalogError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_playlist(
        &self,
        owner_account_id: &str,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> Result<RemotePlaylist, CatalogError> {
        let url = self.endpoint(&format!("v1/users/{}/playlists", owner_account_id))?;
        let body = CreatePlaylistBody {
            name,
            description: description.filter(|d| !d.trim().is_empty()),
            public,
        };
        let p: PlaylistResp = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(RemotePlaylist {
            id: p.id,
            name: p.name,
            public: p.public.or(Some(public)),
        })
    }

    async fn get_playlist_tracks(&self, external_id: &str) -> Result<Vec<String>, CatalogError> {
        let mut url = self.endpoint(&format!("v1/playlists/{}/tracks", external_id))?;
        url.query_pairs_mut()
            .append_pair("fields", "items(track(uri)),next")
            .append_pair("limit", "100");

        let mut uris = Vec::new();
        loop {
            let page: PlaylistTracksPage =
                self.send_json(self.request(Method::GET, url.clone())).await?;
            uris.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|t| t.uri)),
            );
            match page.next {
                Some(next) => {
                    url = Url::parse(&next)
                        .map_err(|err| CatalogError::InvalidResponse(format!("bad next link: {err}")))?;
                }
                None => break,
            }
        }
        Ok(uris)
    }

    async fn add_tracks(
        &self,
        external_id: &str,
        uris: &[String],
        position: Option<u32>,
    ) -> Result<(), CatalogError> {
        let url = self.endpoint(&format!("v1/playlists/{}/tracks", external_id))?;
        let body = AddTracksBody { uris, position };
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn remove_tracks(&self, external_id: &str, uris: &[String]) -> Result<(), CatalogError> {
        let url = self.endpoint(&format!("v1/playlists/{}/tracks", external_id))?;
        let body = RemoveTracksBody {
            tracks: uris.iter().map(|uri| UriRef { uri }).collect(),
        };
        self.send(self.request(Method::DELETE, url).json(&body)).await?;
        Ok(())
    }

    async fn search_track(&self, title: &str, artist: &str) -> Result<Vec<TrackCandidate>, CatalogError> {
        let request = self.build_search_request(title, artist)?;
        let resp: SearchResp = decode(self.execute(request).await?).await?;
        Ok(resp
            .tracks
            .items
            .into_iter()
            .filter(|t| is_track_uri(&t.uri))
            .map(|t| TrackCandidate {
                id: t.id,
                name: t.name,
                artists: t.artists.into_iter().map(|a| a.name).collect(),
                uri: t.uri,
            })
            .collect())
    }

    async fn current_account(&self) -> Result<String, CatalogError> {
        let user: UserResp = self
            .send_json(self.request(Method::GET, self.endpoint("v1/me")?))
            .await?;
        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve the JSON bodies built by `pages` in order, one request per
    /// connection. Returns the base URL and a handle yielding the request
    /// lines received.
    async fn serve_pages(
        pages: impl FnOnce(&Url) -> Vec<String>,
    ) -> (Url, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let pages = pages(&base);
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for body in pages {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let head = String::from_utf8_lossy(&buf);
                seen.push(head.lines().next().unwrap_or_default().to_string());
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            seen
        });
        (base, handle)
    }

    #[test]
    fn client_construction_reports_errors() {
        let mut cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        cfg.spotify.access_token = "token".into();
        let client = SpotifyClient::from_config(&cfg).unwrap();
        assert_eq!(client.base_url.as_str(), SPOTIFY_API_BASE);

        cfg.spotify.api_base = "not a url".into();
        match SpotifyClient::from_config(&cfg) {
            Err(SyncError::Config(msg)) => assert!(msg.contains("spotify.api_base")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn playlist_tracks_follow_next_links() {
        let (base, handle) = serve_pages(|base| {
            let next = base
                .join("v1/playlists/pl/tracks?offset=2&limit=2")
                .unwrap()
                .to_string();
            vec![
                json!({
                    "items": [
                        { "track": { "uri": "spotify:track:a" } },
                        { "track": null }
                    ],
                    "next": next
                })
                .to_string(),
                json!({
                    "items": [ { "track": { "uri": "spotify:track:b" } } ],
                    "next": null
                })
                .to_string(),
            ]
        })
        .await;
        let client = SpotifyClient::with_base_url("token".into(), base).unwrap();

        let uris = client.get_playlist_tracks("pl").await.unwrap();

        assert_eq!(uris, vec!["spotify:track:a".to_string(), "spotify:track:b".to_string()]);
        let seen = handle.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("GET /v1/playlists/pl/tracks?"));
        assert!(seen[1].contains("offset=2"));
    }

    #[tokio::test]
    async fn bad_next_link_is_an_invalid_response() {
        let (base, handle) = serve_pages(|_| {
            vec![json!({
                "items": [ { "track": { "uri": "spotify:track:a" } } ],
                "next": "not a url"
            })
            .to_string()]
        })
        .await;
        let client = SpotifyClient::with_base_url("token".into(), base).unwrap();

        let err = client.get_playlist_tracks("pl").await.unwrap_err();

        assert!(matches!(err, CatalogError::InvalidResponse(ref msg) if msg.contains("bad next link")));
        handle.await.unwrap();
    }

    #[test]
    fn search_request_uses_exact_field_query() {
        let client = SpotifyClient::new("token".into()).unwrap();
        let request = client.build_search_request("Blue \"Monday\"", "New Order").unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/v1/search");
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&(
            "q".to_string(),
            "track:\"Blue Monday\" artist:\"New Order\"".to_string()
        )));
        assert!(pairs.contains(&("type".to_string(), "track".to_string())));
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
    }

    #[test]
    fn status_codes_map_to_catalog_errors() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, String::new()),
            CatalogError::Unauthorized
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(3), String::new()),
            CatalogError::RateLimited { retry_after: Some(3) }
        ));
        let err = error_for_status(StatusCode::BAD_GATEWAY, None, String::new());
        assert!(err.is_retryable());
        match error_for_status(StatusCode::FORBIDDEN, None, "nope".into()) {
            CatalogError::Api { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn track_uri_shape() {
        assert!(is_track_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC"));
        assert!(!is_track_uri("spotify:local:Artist:Album:Song:215"));
        assert!(!is_track_uri("spotify:track:short"));
    }

    #[test]
    fn parses_search_and_tracks_payloads() {
        let search: SearchResp = serde_json::from_value(json!({
            "tracks": { "items": [
                { "id": "4uLU6hMCjMI75M1A2tKUQC", "name": "Song", "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
                  "artists": [ { "name": "Band" } ] }
            ] }
        }))
        .unwrap();
        assert_eq!(search.tracks.items[0].artists[0].name, "Band");

        let page: PlaylistTracksPage = serde_json::from_value(json!({
            "items": [ { "track": { "uri": "spotify:track:a" } }, { "track": null } ],
            "next": null
        }))
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items[1].track.is_none());
        assert!(page.next.is_none());
    }

    #[test]
    fn request_bodies_match_api_shape() {
        let uris = vec!["spotify:track:a".to_string()];
        let add = serde_json::to_value(AddTracksBody {
            uris: &uris,
            position: None,
        })
        .unwrap();
        assert_eq!(add, json!({ "uris": ["spotify:track:a"] }));

        let remove = serde_json::to_value(RemoveTracksBody {
            tracks: vec![UriRef { uri: "spotify:track:a" }],
        })
        .unwrap();
        assert_eq!(remove, json!({ "tracks": [ { "uri": "spotify:track:a" } ] }));
    }
}
