use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct PlaylistResp {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct UserResp {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    pub next: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PlaylistItem {
    /// Null for tracks removed from the catalog.
    pub track: Option<TrackRef>,
}

#[derive(Deserialize, Debug)]
pub struct TrackRef {
    pub uri: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SearchResp {
    pub tracks: SearchTracks,
}

#[derive(Deserialize, Debug)]
pub struct SearchTracks {
    #[serde(default)]
    pub items: Vec<SearchTrack>,
}

#[derive(Deserialize, Debug)]
pub struct SearchTrack {
    pub id: String,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Deserialize, Debug)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Serialize, Debug)]
pub struct CreatePlaylistBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub public: bool,
}

#[derive(Serialize, Debug)]
pub struct AddTracksBody<'a> {
    pub uris: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct RemoveTracksBody<'a> {
    pub tracks: Vec<UriRef<'a>>,
}

#[derive(Serialize, Debug)]
pub struct UriRef<'a> {
    pub uri: &'a str,
}
