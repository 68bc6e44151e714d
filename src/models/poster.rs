use serde::Serialize;

/// One movie returned by a poster search, before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosterCandidate {
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
}

/// Search result shown in the admin poster picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviePosterResult {
    pub title: String,
    pub year: Option<String>,
    pub poster_url: String,
    pub thumbnail_url: String,
}
