use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Extensions picked up by the batch, compared case-insensitively
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "flv", "wmv"];

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn has_ignored_suffix(path: &Path, ignore_suffix: Option<&str>) -> bool {
    match (ignore_suffix, path.file_stem().and_then(|s| s.to_str())) {
        (Some(suffix), Some(stem)) if !suffix.is_empty() => stem.ends_with(suffix),
        _ => false,
    }
}

fn video_entries(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_video(entry.path()))
}

/// All video files under `root`, sorted. Files whose stem ends with
/// `ignore_suffix` are skipped with a warning.
pub fn find_videos(root: &Path, ignore_suffix: Option<&str>) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = video_entries(root)
        .filter(|entry| {
            if has_ignored_suffix(entry.path(), ignore_suffix) {
                warn!("Ignoring: {}", entry.path().display());
                return false;
            }
            true
        })
        .map(|entry| entry.into_path())
        .collect();

    videos.sort();
    videos
}

/// Combined size in bytes of every video file under `root`
pub fn total_video_size(root: &Path) -> u64 {
    video_entries(root)
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Size of a single file, 0 when it cannot be read
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
