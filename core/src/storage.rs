//! Destination paths and the temporary part file a transfer writes into.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use url::Url;

const FALLBACK_FILENAME: &str = "download.bin";
/// Leaves room under the usual 255-byte name limit for ` (n)` suffixes.
const MAX_FILENAME_BYTES: usize = 200;
const MAX_EXTENSION_BYTES: usize = 16;
const PART_PREFIX_BYTES: usize = 64;

/// Final file path for a job. A directory destination (existing, empty, or
/// ending in a separator) receives `suggested_filename`.
pub fn final_destination(destination: &Path, suggested_filename: &str) -> PathBuf {
    let raw = destination.to_string_lossy();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return PathBuf::from(".").join(sanitize_filename(suggested_filename));
    }
    let treat_as_dir = trimmed.ends_with('/') || trimmed.ends_with('\\') || destination.is_dir();
    if treat_as_dir {
        return destination.join(sanitize_filename(suggested_filename));
    }
    destination.to_path_buf()
}

/// Filename for a direct download: `Content-Disposition` first, then the URL path.
pub fn suggest_filename(url: &str, content_disposition: Option<&str>) -> String {
    let name = filename_from_content_disposition(content_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
    sanitize_filename(&name)
}

pub fn filename_from_content_disposition(value: Option<&str>) -> Option<String> {
    let value = value?;
    let mut filename_star: Option<String> = None;
    let mut filename: Option<String> = None;

    for part in value.split(';') {
        let part = part.trim();
        let lower = part.to_ascii_lowercase();
        if lower.starts_with("filename*=") {
            let raw = part.split_once('=')?.1.trim().trim_matches('"');
            let decoded = match raw.find("''") {
                Some(idx) => percent_decode(&raw[idx + 2..]),
                None => percent_decode(raw),
            };
            if !decoded.is_empty() {
                filename_star = Some(decoded);
            }
        } else if lower.starts_with("filename=") {
            let raw = part.split_once('=')?.1.trim().trim_matches('"');
            if !raw.is_empty() {
                filename = Some(raw.to_string());
            }
        }
    }

    filename_star.or(filename)
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path().rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        return None;
    }
    Some(percent_decode(name).replace('+', " "))
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[index + 1]), hex_value(bytes[index + 2])) {
                out.push((hi << 4) | lo);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out)
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
        .collect()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Maps a title or remote name onto a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for ch in name.chars() {
        let normalized = if ch == '+' { ' ' } else { ch };
        let allowed = normalized.is_alphanumeric()
            || matches!(normalized, '.' | '_' | '-' | ' ' | '(' | ')' | '[' | ']');
        let mapped = if allowed { normalized } else { '_' };
        if mapped == '_' || mapped == ' ' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches(&[' ', '.', '_'][..]);
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        truncate_filename(trimmed, MAX_FILENAME_BYTES)
    }
}

/// Shortens `name` to at most `max` bytes on a char boundary, keeping a
/// short extension intact.
fn truncate_filename(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= MAX_EXTENSION_BYTES => name.split_at(idx),
        _ => (name, ""),
    };
    let mut cut = max.saturating_sub(ext.len()).min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    let stem = stem[..cut].trim_end_matches(&[' ', '.', '_'][..]);
    if stem.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }
    format!("{}{}", stem, ext)
}

/// Absolute form of `path` with `.` and `..` resolved lexically, so two
/// spellings of one file compare equal.
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Final paths claimed by the jobs of one batch.
#[derive(Debug, Default)]
pub struct DestinationLedger {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DestinationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`, or `name (n).ext` with the smallest free `n` if taken.
    /// The returned path is absolute.
    pub fn claim(&self, path: &Path) -> PathBuf {
        let path = normalize_path(path);
        let mut claimed = self.claimed.lock().unwrap_or_else(|err| err.into_inner());
        if claimed.insert(path.clone()) {
            return path;
        }
        let mut n = 1usize;
        loop {
            let candidate = numbered(&path, n);
            if claimed.insert(candidate.clone()) {
                tracing::debug!(
                    "destination {} already claimed, using {}",
                    path.display(),
                    candidate.display()
                );
                return candidate;
            }
            n += 1;
        }
    }
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

/// Temporary file beside the final path. Dropping it without `commit`
/// deletes it, so no partial file survives a failed or canceled transfer.
pub struct PartFile {
    file: NamedTempFile,
    written: u64,
}

impl PartFile {
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let parent = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let name = final_path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
        let file = tempfile::Builder::new()
            .prefix(&format!(".{}.", truncate_filename(&name, PART_PREFIX_BYTES)))
            .suffix(".part")
            .tempfile_in(&parent)?;
        Ok(Self { file, written: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes, syncs and atomically renames onto `final_path`.
    pub fn commit(mut self, final_path: &Path) -> io::Result<u64> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        let written = self.written;
        self.file.persist(final_path).map_err(|err| err.error)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_destination_gets_suggested_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = final_destination(dir.path(), "My Video: Part 1.mp4");
        assert_eq!(path, dir.path().join("My Video_Part 1.mp4"));
    }

    #[test]
    fn file_destination_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("clip.mp4");
        assert_eq!(final_destination(&dest, "other.mp4"), dest);
    }

    #[test]
    fn trailing_separator_means_directory() {
        let path = final_destination(Path::new("not-yet-created/"), "a.mp4");
        assert_eq!(path, Path::new("not-yet-created/").join("a.mp4"));
    }

    #[test]
    fn content_disposition_wins_over_url() {
        let name = suggest_filename(
            "https://cdn.example.com/v/raw.bin",
            Some("attachment; filename=\"fallback.mp4\"; filename*=UTF-8''real%20name.mp4"),
        );
        assert_eq!(name, "real name.mp4");
    }

    #[test]
    fn url_path_names_the_file() {
        assert_eq!(
            suggest_filename("https://cdn.example.com/videos/my%20clip.webm?x=1", None),
            "my clip.webm"
        );
        assert_eq!(suggest_filename("https://cdn.example.com/", None), FALLBACK_FILENAME);
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_filename("../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("日本語 動画"), "日本語 動画");
        assert_eq!(sanitize_filename("???"), FALLBACK_FILENAME);
    }

    #[test]
    fn ledger_disambiguates_duplicates() {
        let ledger = DestinationLedger::new();
        let path = Path::new("/downloads/video.mp4");
        assert_eq!(ledger.claim(path), PathBuf::from("/downloads/video.mp4"));
        assert_eq!(ledger.claim(path), PathBuf::from("/downloads/video (1).mp4"));
        assert_eq!(ledger.claim(path), PathBuf::from("/downloads/video (2).mp4"));
        assert_eq!(
            ledger.claim(Path::new("/downloads/noext")),
            PathBuf::from("/downloads/noext")
        );
        assert_eq!(
            ledger.claim(Path::new("/downloads/noext")),
            PathBuf::from("/downloads/noext (1)")
        );
    }

    #[test]
    fn ledger_matches_different_spellings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = DestinationLedger::new();
        let plain = dir.path().join("clip.mp4");
        let dotted = dir.path().join("sub").join("..").join(".").join("clip.mp4");
        assert_eq!(ledger.claim(&plain), plain);
        assert_eq!(ledger.claim(&dotted), dir.path().join("clip (1).mp4"));

        let relative = Path::new("relative-clip.mp4");
        let first = ledger.claim(relative);
        assert!(first.is_absolute());
        let cwd = std::env::current_dir().expect("cwd");
        assert_eq!(
            ledger.claim(&cwd.join("relative-clip.mp4")),
            cwd.join("relative-clip (1).mp4")
        );
    }

    #[test]
    fn long_names_are_capped_keeping_extension() {
        let long = format!("{}.mp4", "a".repeat(300));
        let name = sanitize_filename(&long);
        assert_eq!(name.len(), MAX_FILENAME_BYTES);
        assert!(name.ends_with("a.mp4"));

        let wide = "é".repeat(150);
        let name = sanitize_filename(&wide);
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert_eq!(name, "é".repeat(MAX_FILENAME_BYTES / 2));

        let no_ext = format!("{}.{}", "b".repeat(150), "c".repeat(100));
        let name = sanitize_filename(&no_ext);
        assert_eq!(name.len(), MAX_FILENAME_BYTES);
        assert!(name.starts_with("bbb"));
    }

    #[test]
    fn part_file_fits_beside_long_final_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let final_path = dir.path().join(format!("{}.mp4", "x".repeat(246)));
        let mut part = PartFile::create(&final_path).expect("create");
        let part_name = part.path().file_name().expect("name").len();
        assert!(part_name < 100, "part name is {} bytes", part_name);
        part.write_chunk(b"data").expect("write");
        part.commit(&final_path).expect("commit");
        assert_eq!(fs::read(&final_path).expect("read"), b"data");
    }

    #[test]
    fn part_file_is_removed_without_commit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let final_path = dir.path().join("out.bin");
        let part_path = {
            let mut part = PartFile::create(&final_path).expect("create");
            part.write_chunk(b"partial").expect("write");
            assert_eq!(part.written(), 7);
            part.path().to_path_buf()
        };
        assert!(!part_path.exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn part_file_commit_renames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let final_path = dir.path().join("nested").join("out.bin");
        let mut part = PartFile::create(&final_path).expect("create");
        let part_path = part.path().to_path_buf();
        assert_eq!(part_path.parent(), final_path.parent());
        part.write_chunk(b"abc").expect("write");
        part.write_chunk(b"def").expect("write");
        assert_eq!(part.commit(&final_path).expect("commit"), 6);
        assert!(!part_path.exists());
        assert_eq!(fs::read(&final_path).expect("read"), b"abcdef");
    }
}
