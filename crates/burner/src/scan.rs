//! Folder discovery.
//!
//! Walks a root directory for folders that directly hold video files, loads
//! their resumable state, probes the tracks of the first video and picks
//! default subtitle and audio tracks.

use crate::context::WorkFolder;
use crate::probe::{probe_streams, StreamDescriptor, StreamListing};
use crate::state::StateStore;
use crate::toolkit::MediaToolkit;
use batchburn_config::Config;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Video file extensions recognised by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "webm"];

/// Default suffix of output directories and files
pub const DEFAULT_OUTPUT_SUFFIX: &str = "-burned";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("scan root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Knobs that shape a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Languages matched against track language tags and titles
    pub preferred_languages: Vec<String>,
    /// Directories ending with this suffix are previous outputs and skipped
    pub output_suffix: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            preferred_languages: vec!["jpn".to_string(), "japanese".to_string()],
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preferred_languages: config.scan.preferred_languages.clone(),
            output_suffix: config.scan.output_suffix.clone(),
        }
    }
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// First descriptor matching a preferred language, else the first one.
///
/// A descriptor matches when its language tag, title or display label
/// contains any preferred language, case-insensitively.
pub fn auto_select(descriptors: &[StreamDescriptor], preferred_languages: &[String]) -> Option<u32> {
    let wanted: Vec<String> = preferred_languages
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    descriptors
        .iter()
        .find(|d| {
            let label = d.to_string().to_lowercase();
            d.matches_language(preferred_languages) || wanted.iter().any(|w| label.contains(w))
        })
        .or_else(|| descriptors.first())
        .map(|d| d.index)
}

#[derive(Debug, Default)]
struct FolderFiles {
    videos: Vec<(String, u64)>,
}

/// Group video files under `root` by their parent directory.
fn collect_video_files(root: &Path, output_suffix: &str) -> BTreeMap<PathBuf, FolderFiles> {
    let mut folders: BTreeMap<PathBuf, FolderFiles> = BTreeMap::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // The root itself is always walked
            if entry.depth() == 0 || output_suffix.is_empty() || !entry.file_type().is_dir() {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .map(|name| !name.ends_with(output_suffix))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        // Symlinked videos count; the walk itself does not follow links
        if !is_video_file(entry.path()) || !entry.path().is_file() {
            continue;
        }

        let (Some(parent), Some(name)) = (entry.path().parent(), entry.file_name().to_str()) else {
            continue;
        };

        let size = fs::metadata(entry.path()).map(|m| m.len()).unwrap_or(0);
        folders
            .entry(parent.to_path_buf())
            .or_default()
            .videos
            .push((name.to_string(), size));
    }

    for files in folders.values_mut() {
        files.videos.sort_by(|a, b| a.0.cmp(&b.0));
    }

    folders
}

/// Discover work folders under `root`.
///
/// Folders whose state cannot be written are logged and left out. Probe
/// failures leave the folder with empty track lists.
pub fn scan_folders<T: MediaToolkit + ?Sized>(
    root: &Path,
    options: &ScanOptions,
    toolkit: &T,
    store: &StateStore,
) -> Result<BTreeMap<PathBuf, WorkFolder>, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    // Burns run inside each folder, so folder paths must be absolute
    let root = fs::canonicalize(root).map_err(|_| ScanError::RootNotFound(root.to_path_buf()))?;

    let mut folders = BTreeMap::new();

    for (path, files) in collect_video_files(&root, &options.output_suffix) {
        let names: Vec<String> = files.videos.iter().map(|(n, _)| n.clone()).collect();
        let Some(first) = names.first() else {
            continue;
        };

        let state = match store.load(&path, &names) {
            Ok(state) => state,
            Err(e) => {
                error!("Skipping folder {}: {}", path.display(), e);
                continue;
            }
        };

        let listing = match probe_streams(toolkit, &path.join(first)) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Could not probe tracks in {}: {}", path.display(), e);
                StreamListing::default()
            }
        };

        let mut folder = WorkFolder::new(path.clone());
        folder.video_count = names.len();
        folder.total_bytes = files.videos.iter().map(|(_, size)| size).sum();
        folder.selected_subtitle = auto_select(&listing.subtitles, &options.preferred_languages);
        folder.selected_audio = auto_select(&listing.audios, &options.preferred_languages);
        folder.subtitles = listing.subtitles;
        folder.audios = listing.audios;
        folder.apply_state(state);

        debug!(
            "Found {}: {} video(s), {} pending",
            path.display(),
            folder.video_count,
            folder.pending.len()
        );
        folders.insert(path, folder);
    }

    info!("Scan of {} found {} folder(s)", root.display(), folders.len());
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeToolkit;
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    const TRACKS_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "eng"}},
            {"index": 2, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "jpn"}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "ass", "tags": {"language": "eng"}},
            {"index": 4, "codec_type": "subtitle", "codec_name": "ass", "tags": {"title": "Japanese Full"}}
        ]
    }"#;

    fn descriptor(index: u32, language: &str, title: Option<&str>) -> StreamDescriptor {
        StreamDescriptor {
            index,
            codec_name: "ass".to_string(),
            language: language.to_string(),
            title: title.map(String::from),
        }
    }

    fn write_video(path: &Path, bytes: usize) {
        let mut f = File::create(path).unwrap();
        f.write_all(&vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/media/movie.mkv")));
        assert!(is_video_file(Path::new("/media/movie.MKV"))); // case-insensitive
        assert!(is_video_file(Path::new("/media/movie.WebM")));
        assert!(!is_video_file(Path::new("/media/movie.ts")));
        assert!(!is_video_file(Path::new("/media/movie.ass")));
        assert!(!is_video_file(Path::new("/media/movie"))); // no extension
    }

    #[test]
    fn test_auto_select_prefers_language() {
        let preferred = vec!["jpn".to_string(), "japanese".to_string()];
        let tracks = [descriptor(3, "eng", None), descriptor(5, "jpn", None)];
        assert_eq!(auto_select(&tracks, &preferred), Some(5));

        let tracks = [descriptor(3, "eng", None), descriptor(4, "und", Some("Japanese Full"))];
        assert_eq!(auto_select(&tracks, &preferred), Some(4));

        let tracks = [descriptor(3, "eng", None), descriptor(4, "fre", None)];
        assert_eq!(auto_select(&tracks, &preferred), Some(3));

        assert_eq!(auto_select(&[], &preferred), None);
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = scan_folders(
            &dir.path().join("nope"),
            &ScanOptions::default(),
            &FakeToolkit::new(),
            &StateStore::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
    }

    #[test]
    fn test_scan_discovers_folders() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let show = root.join("Show");
        fs::create_dir_all(&show).unwrap();
        write_video(&show.join("b.mkv"), 20);
        write_video(&show.join("a.mkv"), 10);
        write_video(&show.join("notes.txt"), 5);

        // Previous outputs and folders without videos are ignored
        let burned = root.join("Show-burned");
        fs::create_dir_all(&burned).unwrap();
        write_video(&burned.join("a-burned.mp4"), 10);
        let hidden = root.join(".cache");
        fs::create_dir_all(&hidden).unwrap();
        write_video(&hidden.join("x.mkv"), 10);
        fs::create_dir_all(root.join("Empty")).unwrap();

        let nested = root.join("Season").join("Disc 1");
        fs::create_dir_all(&nested).unwrap();
        write_video(&nested.join("ep.mp4"), 7);

        let toolkit = FakeToolkit::new().with_streams("a.mkv", TRACKS_JSON);
        let store = StateStore::default();
        let folders = scan_folders(root, &ScanOptions::default(), &toolkit, &store).unwrap();

        let show = fs::canonicalize(&show).unwrap();
        let nested = fs::canonicalize(&nested).unwrap();
        let hidden = fs::canonicalize(&hidden).unwrap();
        let keys: Vec<&PathBuf> = folders.keys().collect();
        assert_eq!(keys, vec![&hidden, &nested, &show]);

        let folder = &folders[&show];
        assert_eq!(folder.pending, vec!["a.mkv", "b.mkv"]);
        assert!(folder.finished.is_empty());
        assert_eq!(folder.video_count, 2);
        assert_eq!(folder.total_bytes, 30);
        assert_eq!(folder.subtitles.len(), 2);
        assert_eq!(folder.selected_subtitle, Some(4));
        assert_eq!(folder.selected_audio, Some(2));
        assert!(store.state_path(&show).exists());

        // Probe failed for the nested folder: no tracks, no selection
        let folder = &folders[&nested];
        assert!(folder.subtitles.is_empty());
        assert_eq!(folder.selected_subtitle, None);
        assert_eq!(folder.selected_audio, None);
    }

    #[test]
    fn test_scan_resumes_from_state() {
        let dir = TempDir::new().unwrap();
        for name in ["a.mkv", "b.mkv", "c.mkv"] {
            write_video(&dir.path().join(name), 1);
        }
        let store = StateStore::default();
        store.mark_done(dir.path(), "a.mkv").unwrap();

        let folders = scan_folders(
            dir.path(),
            &ScanOptions::default(),
            &FakeToolkit::new(),
            &store,
        )
        .unwrap();

        let folder = folders.values().next().unwrap();
        assert_eq!(folder.finished, vec!["a.mkv"]);
        assert_eq!(folder.pending, vec!["b.mkv", "c.mkv"]);
    }

    #[test]
    fn test_hidden_folder_is_scanned() {
        let dir = TempDir::new().unwrap();
        let season = dir.path().join(".Season1");
        fs::create_dir_all(&season).unwrap();
        write_video(&season.join("ep.mkv"), 3);

        let folders = scan_folders(
            dir.path(),
            &ScanOptions::default(),
            &FakeToolkit::new(),
            &StateStore::default(),
        )
        .unwrap();

        assert_eq!(folders.len(), 1);
        let folder = &folders[&fs::canonicalize(&season).unwrap()];
        assert_eq!(folder.pending, vec!["ep.mkv"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_video_is_listed() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        let show = dir.path().join("Show");
        fs::create_dir_all(&store_dir).unwrap();
        fs::create_dir_all(&show).unwrap();
        write_video(&store_dir.join("real.bin"), 42);
        std::os::unix::fs::symlink(store_dir.join("real.bin"), show.join("ep1.mkv")).unwrap();

        let folders = scan_folders(
            dir.path(),
            &ScanOptions::default(),
            &FakeToolkit::new(),
            &StateStore::default(),
        )
        .unwrap();

        let folder = &folders[&fs::canonicalize(&show).unwrap()];
        assert_eq!(folder.pending, vec!["ep1.mkv"]);
        // Size of the target, not of the link
        assert_eq!(folder.total_bytes, 42);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_video_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("mkv"), Just("MKV"), Just("mp4"), Just("Mp4"),
                Just("avi"), Just("mov"), Just("MOV"), Just("m4v"),
                Just("webm"), Just("WEBM"),
                Just("txt"), Just("jpg"), Just("srt"), Just("ass"),
                Just("ts"), Just("json"),
            ],
        ) {
            let path = PathBuf::from(format!("/media/{}.{}", basename, ext));
            let expected = matches!(
                ext.to_lowercase().as_str(),
                "mkv" | "mp4" | "avi" | "mov" | "m4v" | "webm"
            );
            prop_assert_eq!(is_video_file(&path), expected);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_hidden_dirs_walked_output_dirs_excluded(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();

            for dir in [visible_dir.clone(), hidden_dir.clone(), format!("{}-burned", visible_dir)] {
                let path = root.join(&dir);
                fs::create_dir_all(&path).unwrap();
                File::create(path.join(format!("{}.mkv", filename))).unwrap();
            }

            let folders = scan_folders(
                root,
                &ScanOptions::default(),
                &FakeToolkit::new(),
                &StateStore::default(),
            )
            .unwrap();

            let mut expected = vec![
                fs::canonicalize(root.join(&visible_dir)).unwrap(),
                fs::canonicalize(root.join(&hidden_dir)).unwrap(),
            ];
            expected.sort();
            let keys: Vec<PathBuf> = folders.keys().cloned().collect();
            prop_assert_eq!(keys, expected);
        }
    }
}
