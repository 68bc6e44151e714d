#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream, stream::BoxStream};
use image::{Rgb, RgbImage};
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use video_gallery::{
    config::{AppConfig, Args},
    models::poster::PosterCandidate,
    services::{
        frame_extractor::{ExtractError, FrameExtractor},
        object_store::{ObjectByteStream, ObjectEntry, ObjectStoreClient, StoreError, StoreResult},
        poster_service::{PosterError, PosterLookup, PosterSize},
    },
    state::AppState,
};

pub const SECRET: &str = "s3cret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// In-memory bucket with switchable failures.
#[derive(Default)]
pub struct MockBucket {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    unsignable: Mutex<HashSet<String>>,
    undeletable: Mutex<HashSet<String>>,
    unwritable: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    pub list_calls: AtomicUsize,
    pub sign_calls: AtomicUsize,
}

impl MockBucket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_keys(keys: &[&str]) -> Arc<Self> {
        let bucket = Self::new();
        for key in keys {
            bucket.insert(key, Bytes::from_static(b"video-bytes"), "application/octet-stream");
        }
        bucket
    }

    pub fn insert(&self, key: &str, data: Bytes, content_type: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn insert_sized(&self, key: &str, size: usize) {
        self.insert(key, Bytes::from(vec![0u8; size]), "video/mp4");
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn fail_signing(&self, key: &str) {
        self.unsignable.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.undeletable.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_write(&self, key: &str) {
        self.unwritable.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStoreClient for MockBucket {
    fn bucket(&self) -> &str {
        "mock-bucket"
    }

    fn list_objects(&self) -> BoxStream<'_, StoreResult<ObjectEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return stream::iter(vec![Err(StoreError::Backend("listing unavailable".into()))])
                .boxed();
        }
        let entries: Vec<StoreResult<ObjectEntry>> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, object)| {
                Ok(ObjectEntry {
                    key: key.clone(),
                    size: object.data.len() as u64,
                })
            })
            .collect();
        stream::iter(entries).boxed()
    }

    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.unsignable.lock().unwrap().contains(key) {
            return Err(StoreError::Backend(format!("cannot sign {key}")));
        }
        Ok(format!(
            "https://signed.example/{}?ttl={}",
            key.replace(' ', "%20"),
            ttl.as_secs()
        ))
    }

    async fn read_object(&self, key: &str) -> StoreResult<ObjectByteStream> {
        let object = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let chunks: Vec<StoreResult<Bytes>> = object
            .data
            .chunks(4)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn write_object(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<()> {
        if self.unwritable.lock().unwrap().contains(key) {
            return Err(StoreError::Backend(format!("cannot write {key}")));
        }
        self.insert(key, data, content_type);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        if self.undeletable.lock().unwrap().contains(key) {
            return Err(StoreError::Backend(format!("cannot delete {key}")));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A busy frame that passes validation.
    Checkerboard,
    /// A flat frame that validation rejects.
    Solid,
    /// The tool exits with an error.
    Crash,
}

/// Writes a synthetic JPEG instead of running ffmpeg.
pub struct FakeExtractor {
    kind: FrameKind,
    available: bool,
    failing_inputs: Mutex<HashSet<String>>,
    pub extract_calls: AtomicUsize,
    pub offsets: Mutex<Vec<u64>>,
}

impl FakeExtractor {
    pub fn new(kind: FrameKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            available: true,
            failing_inputs: Mutex::new(HashSet::new()),
            extract_calls: AtomicUsize::new(0),
            offsets: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            kind: FrameKind::Checkerboard,
            available: false,
            failing_inputs: Mutex::new(HashSet::new()),
            extract_calls: AtomicUsize::new(0),
            offsets: Mutex::new(Vec::new()),
        })
    }

    /// Local filenames (as produced for scratch files) that should crash.
    pub fn fail_for(&self, local_name: &str) {
        self.failing_inputs
            .lock()
            .unwrap()
            .insert(local_name.to_string());
    }
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn probe(&self) -> Result<(), ExtractError> {
        if self.available {
            Ok(())
        } else {
            Err(ExtractError::Unavailable {
                binary: "fake-ffmpeg".into(),
                reason: "not installed".into(),
            })
        }
    }

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        offset_ms: u64,
    ) -> Result<(), ExtractError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().unwrap().push(offset_ms);
        assert!(input.exists(), "video should be downloaded before extraction");

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.kind == FrameKind::Crash || self.failing_inputs.lock().unwrap().contains(&name) {
            return Err(ExtractError::Failed {
                status: "exit status: 1".into(),
                stderr: "Invalid data found when processing input".into(),
            });
        }

        let frame = match self.kind {
            FrameKind::Solid => RgbImage::from_pixel(160, 90, Rgb([0, 0, 0])),
            _ => RgbImage::from_fn(160, 90, |x, y| {
                if (x / 16 + y / 16) % 2 == 0 {
                    Rgb([0, 0, 0])
                } else {
                    Rgb([255, 255, 255])
                }
            }),
        };
        frame
            .save_with_format(output, image::ImageFormat::Jpeg)
            .map_err(|err| ExtractError::Io(std::io::Error::other(err)))?;
        Ok(())
    }
}

/// Canned search results and poster bytes.
pub struct FakePosterLookup {
    results: Vec<PosterCandidate>,
    image: Bytes,
    pub queries: Mutex<Vec<String>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakePosterLookup {
    pub fn new(results: Vec<PosterCandidate>) -> Arc<Self> {
        Arc::new(Self {
            results,
            image: Bytes::from_static(b"\xff\xd8\xff\xe0poster-jpeg"),
            queries: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn image(&self) -> Bytes {
        self.image.clone()
    }
}

pub fn candidate(title: &str, poster_path: Option<&str>, release_date: Option<&str>) -> PosterCandidate {
    PosterCandidate {
        title: title.to_string(),
        poster_path: poster_path.map(str::to_string),
        release_date: release_date.map(str::to_string),
    }
}

#[async_trait]
impl PosterLookup for FakePosterLookup {
    async fn search(&self, title: &str) -> Result<Vec<PosterCandidate>, PosterError> {
        self.queries.lock().unwrap().push(title.to_string());
        Ok(self.results.clone())
    }

    fn image_url(&self, poster_path: &str, size: PosterSize) -> String {
        format!("https://images.example/{}{}", size.token(), poster_path)
    }

    async fn fetch_image(&self, poster_path: &str, size: PosterSize) -> Result<Bytes, PosterError> {
        self.fetched
            .lock()
            .unwrap()
            .push(self.image_url(poster_path, size));
        Ok(self.image.clone())
    }
}

pub fn test_config(scratch: &Path) -> AppConfig {
    let scratch = scratch.to_string_lossy().to_string();
    AppConfig::from_lookup(&Args::default(), true, move |name| match name {
        "SECRET_KEY" => Some(SECRET.to_string()),
        "BUCKET_NAME" => Some("mock-bucket".to_string()),
        "SCRATCH_DIR" => Some(scratch.clone()),
        "STATIC_DIR" => Some("/nonexistent/static".to_string()),
        "BULK_CONCURRENCY" => Some("4".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn test_state(
    scratch: &Path,
    bucket: Arc<MockBucket>,
    extractor: Arc<FakeExtractor>,
    lookup: Option<Arc<FakePosterLookup>>,
) -> AppState {
    let lookup = lookup.map(|lookup| lookup as Arc<dyn PosterLookup>);
    AppState::new(test_config(scratch), bucket, extractor, lookup).expect("test state")
}

/// Entries left under the scratch root after runs complete.
pub fn scratch_leftovers(scratch: &Path) -> Vec<String> {
    match std::fs::read_dir(scratch) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}
