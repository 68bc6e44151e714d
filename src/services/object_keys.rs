//! Object key conventions.
//!
//! Media lives at exactly three levels: `Category/Gallery/Filename`. A video
//! and its thumbnail share the key up to the extension, which is how the
//! catalog pairs them.

use std::cmp::Ordering;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "mov", "avi"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extension written for generated thumbnails and posters.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

const MAX_LOCAL_NAME_LEN: usize = 200;
const SHORT_NAME_CHARS: usize = 20;
const MAX_KEPT_EXTENSION_LEN: usize = 16;
const HASH_HEX_CHARS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

/// A key split into its catalog coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    pub category: &'a str,
    pub gallery: &'a str,
    pub filename: &'a str,
    /// Filename without its final extension.
    pub base_name: &'a str,
    /// `None` when the extension is not a recognized video or image type.
    pub kind: Option<MediaKind>,
}

/// Splits `Category/Gallery/Filename`. Keys with more or fewer segments, or
/// with an empty filename, are not catalog media.
pub fn parse_key(key: &str) -> Option<ParsedKey<'_>> {
    let mut parts = key.split('/');
    let category = parts.next()?;
    let gallery = parts.next()?;
    let filename = parts.next()?;
    if parts.next().is_some() || filename.is_empty() {
        return None;
    }

    let (base_name, extension) = split_extension(filename);
    Some(ParsedKey {
        category,
        gallery,
        filename,
        base_name,
        kind: extension.and_then(media_kind),
    })
}

/// Classifies an extension (without the dot), ignoring ASCII case.
pub fn media_kind(extension: &str) -> Option<MediaKind> {
    let matches = |list: &[&str]| list.iter().any(|ext| ext.eq_ignore_ascii_case(extension));
    if matches(VIDEO_EXTENSIONS) {
        Some(MediaKind::Video)
    } else if matches(IMAGE_EXTENSIONS) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

pub fn is_video_key(key: &str) -> bool {
    parse_key(key).is_some_and(|parsed| parsed.kind == Some(MediaKind::Video))
}

pub fn is_image_key(key: &str) -> bool {
    parse_key(key).is_some_and(|parsed| parsed.kind == Some(MediaKind::Image))
}

/// The key with the extension of its last segment removed.
pub fn base_key(key: &str) -> &str {
    let segment_start = key.rfind('/').map_or(0, |idx| idx + 1);
    match key[segment_start..].rfind('.') {
        Some(dot) => &key[..segment_start + dot],
        None => key,
    }
}

/// Where the thumbnail for `video_key` lives: same path, `.jpg` extension.
pub fn thumbnail_key(video_key: &str) -> String {
    format!("{}.{THUMBNAIL_EXTENSION}", base_key(video_key))
}

/// Filename without its extension. Used as a poster search fallback.
pub fn file_stem(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    split_extension(name).0
}

/// Maps an object key (or URL path) to a flat local filename.
///
/// Query strings are dropped and only the final segment is kept. Overlong or
/// unusable names collapse to a short readable prefix plus a hash of the
/// whole input, so distinct keys stay distinct and the result is bounded.
pub fn safe_local_name(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or(path);
    let name = without_query.rsplit('/').next().unwrap_or(without_query);

    if !name.is_empty() && name != "." && name != ".." && name.len() <= MAX_LOCAL_NAME_LEN {
        return name.to_string();
    }

    let (stem, extension) = split_extension(name);
    let short: String = stem
        .chars()
        .take(SHORT_NAME_CHARS)
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '.' => '_',
            other => other,
        })
        .collect();
    let digest = format!("{:x}", md5::compute(path.as_bytes()));
    let hash = &digest[..HASH_HEX_CHARS];

    match extension.filter(|ext| !ext.is_empty() && ext.len() <= MAX_KEPT_EXTENSION_LEN) {
        Some(ext) => format!("{short}-{hash}.{ext}"),
        None => format!("{short}-{hash}"),
    }
}

/// Formats a millisecond offset as `HH:MM:SS.mmm` for ffmpeg's `-ss`.
pub fn format_offset(offset_ms: u64) -> String {
    let hours = offset_ms / 3_600_000;
    let minutes = (offset_ms / 60_000) % 60;
    let seconds = (offset_ms / 1_000) % 60;
    let millis = offset_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Orders names so embedded numbers compare by value: `Part 2` sorts before
/// `Part 10`. Names that compare equal that way fall back to byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut left, mut right) = (a.as_bytes(), b.as_bytes());
    loop {
        match (left.first(), right.first()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (left_num, left_rest) = split_digits(left);
                let (right_num, right_rest) = split_digits(right);
                let ord = compare_digit_runs(left_num, right_num);
                if ord != Ordering::Equal {
                    return ord;
                }
                left = left_rest;
                right = right_rest;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                left = &left[1..];
                right = &right[1..];
            }
        }
    }
}

fn split_digits(bytes: &[u8]) -> (&[u8], &[u8]) {
    let len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    bytes.split_at(len)
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let trim = |run: &[u8]| -> usize { run.iter().take_while(|b| **b == b'0').count() };
    let (a, b) = (&a[trim(a)..], &b[trim(b)..]);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(dot) => (&filename[..dot], Some(&filename[dot + 1..])),
        None => (filename, None),
    }
}
