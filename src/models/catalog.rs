//! The in-memory gallery catalog and the JSON feed projected from it.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A playable item, or a thumbnail with no matching video yet.
///
/// Either object key may be missing but never both. `url` is empty when
/// there is no video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub name: String,
    pub category: String,
    pub gallery: String,
    pub video_object_key: Option<String>,
    pub thumbnail_object_key: Option<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
}

impl Video {
    pub fn new(category: &str, gallery: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            gallery: gallery.to_string(),
            video_object_key: None,
            thumbnail_object_key: None,
            url: String::new(),
            thumbnail_url: None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_object_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub name: String,
    pub category: String,
    /// Short opaque identifier used in `/gallery/{stub}` links.
    pub stub: String,
    pub videos: Vec<Video>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    /// Same as `name`; categories are not access controlled.
    pub stub: String,
    pub galleries: Vec<Gallery>,
}

/// Snapshot of the bucket at `built_at`. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub categories: Vec<Category>,
    pub built_at: DateTime<Utc>,
}

impl Catalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories,
            built_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn galleries(&self) -> impl Iterator<Item = &Gallery> {
        self.categories.iter().flat_map(|category| category.galleries.iter())
    }

    pub fn videos(&self) -> impl Iterator<Item = &Video> {
        self.galleries().flat_map(|gallery| gallery.videos.iter())
    }

    /// First gallery, in catalog order, carrying `stub`.
    pub fn find_gallery(&self, stub: &str) -> Option<&Gallery> {
        self.galleries().find(|gallery| gallery.stub == stub)
    }

    pub fn video_count(&self) -> usize {
        self.videos().count()
    }

    pub fn to_feed(&self) -> Vec<FeedCategory> {
        self.categories
            .iter()
            .map(|category| FeedCategory {
                name: category.name.clone(),
                stub: category.stub.clone(),
                galleries: category
                    .galleries
                    .iter()
                    .map(|gallery| FeedGallery {
                        name: gallery.name.clone(),
                        videos: gallery
                            .videos
                            .iter()
                            .map(|video| FeedVideo {
                                name: video.name.clone(),
                                url: video.url.clone(),
                                thumbnail: video.thumbnail_url.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCategory {
    pub name: String,
    pub stub: String,
    pub galleries: Vec<FeedGallery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedGallery {
    pub name: String,
    pub videos: Vec<FeedVideo>,
}

/// `thumbnail` serializes as `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedVideo {
    pub name: String,
    pub url: String,
    pub thumbnail: Option<String>,
}
