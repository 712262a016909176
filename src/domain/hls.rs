//! HLS manifest model, rendering and header parsing.

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::fs;

pub const PLAYLIST_NAME: &str = "audio.m3u8";
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const INIT_SEGMENT_NAME: &str = "init.mp4";
/// printf-style pattern handed to ffmpeg for media segments.
pub const SEGMENT_PATTERN: &str = "segment_%03d.m4s";

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^segment_(\d+)\.m4s$").expect("static regex"))
}

/// Index of a media segment file, if `name` is one.
pub fn segment_index(name: &str) -> Option<u64> {
    segment_regex()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn segment_file_name(index: u64) -> String {
    format!("segment_{:03}.m4s", index)
}

/// Media segments present in `dir`, in playback order.
pub fn list_segments(dir: &Path) -> io::Result<Vec<String>> {
    let mut found: Vec<(u64, String)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .filter_map(|name| segment_index(&name).map(|idx| (idx, name)))
        .collect();
    found.sort();
    Ok(found.into_iter().map(|(_, name)| name).collect())
}

pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
    pub independent_segments: bool,
    /// Initialization segment for fMP4 (EXT-X-MAP)
    pub init_segment: Option<String>,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 7, // Version 7 for fMP4 support
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: false,
            playlist_type: None,
            independent_segments: false,
            init_segment: None,
        }
    }

    /// Header-only manifest, optionally listing segments already on disk.
    ///
    /// Never carries the terminal marker: the stream may still grow once a
    /// transcoder picks the directory up again.
    pub fn minimal(dir: &Path, target_duration: u64, playlist_type: Option<&str>) -> Self {
        let mut playlist = Self::new(target_duration);
        playlist.playlist_type = playlist_type.map(String::from);

        let segments = list_segments(dir).unwrap_or_else(|e| {
            tracing::warn!(dir = %dir.display(), "Could not list segments: {}", e);
            Vec::new()
        });
        if !segments.is_empty() && dir.join(INIT_SEGMENT_NAME).exists() {
            playlist.init_segment = Some(INIT_SEGMENT_NAME.to_string());
        }
        for name in segments {
            playlist.add_segment(target_duration as f64, name);
        }
        playlist
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment { duration, uri });
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));

        if let Some(pt) = &self.playlist_type {
            out.push_str(&format!("#EXT-X-PLAYLIST-TYPE:{}\n", pt));
        }

        if self.independent_segments {
            out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        }

        // fMP4 initialization segment
        if let Some(init) = &self.init_segment {
            out.push_str(&format!("#EXT-X-MAP:URI=\"{}\"\n", init));
        }

        for segment in &self.segments {
            // Using {:.6} for reasonable precision on float duration
            out.push_str(&format!("#EXTINF:{:.6},\n", segment.duration));
            out.push_str(&segment.uri);
            out.push('\n');
        }

        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }

        out
    }

    /// Replace `path` atomically: readers see either the old or the new file.
    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        write_atomic(path, self.render().as_bytes()).await
    }
}

/// Master playlist pointing at the single audio rendition.
pub fn master_playlist(bandwidth: u32) -> String {
    format!(
        "#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-STREAM-INF:BANDWIDTH={},CODECS=\"mp4a.40.2\"\n{}\n",
        bandwidth, PLAYLIST_NAME
    )
}

pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Error, PartialEq)]
pub enum PlaylistParseError {
    #[error("missing #EXTM3U header")]
    MissingHeader,
    #[error("missing #EXT-X-TARGETDURATION")]
    MissingTargetDuration,
    #[error("malformed tag: {0}")]
    Malformed(String),
}

/// What a polling client learns from reading a media playlist.
#[derive(Debug, Default, PartialEq)]
pub struct PlaylistInfo {
    pub version: Option<u8>,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub playlist_type: Option<String>,
    pub segments: Vec<String>,
    pub ended: bool,
}

pub fn parse(content: &str) -> Result<PlaylistInfo, PlaylistParseError> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some("#EXTM3U") {
        return Err(PlaylistParseError::MissingHeader);
    }

    let mut info = PlaylistInfo::default();
    let mut has_target = false;
    for line in lines {
        if let Some(v) = line.strip_prefix("#EXT-X-VERSION:") {
            info.version = Some(number(line, v)?);
        } else if let Some(v) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            info.target_duration = number(line, v)?;
            has_target = true;
        } else if let Some(v) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            info.media_sequence = number(line, v)?;
        } else if let Some(v) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
            info.playlist_type = Some(v.to_string());
        } else if line == "#EXT-X-ENDLIST" {
            info.ended = true;
        } else if !line.starts_with('#') {
            info.segments.push(line.to_string());
        }
    }

    if !has_target {
        return Err(PlaylistParseError::MissingTargetDuration);
    }
    Ok(info)
}

fn number<T: std::str::FromStr>(line: &str, value: &str) -> Result<T, PlaylistParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| PlaylistParseError::Malformed(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_playlist_metadata() {
        let mut playlist = MediaPlaylist::new(2);
        playlist.playlist_type = Some("EVENT".to_string());
        playlist.independent_segments = true;
        playlist.add_segment(1.5, "segment_000.m4s".to_string());

        let dir = tempdir().unwrap();
        let path = dir.path().join(PLAYLIST_NAME);
        playlist.write_to(&path).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("#EXT-X-PLAYLIST-TYPE:EVENT"));
        assert!(content.contains("#EXT-X-INDEPENDENT-SEGMENTS"));
        assert!(content.contains("#EXT-X-TARGETDURATION:2"));
        assert!(content.contains("#EXTINF:1.500000,"));
        assert!(!content.contains("#EXT-X-ENDLIST"));
        assert!(!dir.path().join("audio.m3u8.tmp").exists());
    }

    #[test]
    fn test_minimal_playlist_is_parseable_and_open() {
        let dir = tempdir().unwrap();
        let content = MediaPlaylist::minimal(dir.path(), 2, None).render();
        let info = parse(&content).unwrap();
        assert_eq!(info.target_duration, 2);
        assert_eq!(info.version, Some(7));
        assert!(info.segments.is_empty());
        assert!(!info.ended);
    }

    #[test]
    fn test_minimal_playlist_lists_existing_segments_in_order() {
        let dir = tempdir().unwrap();
        for name in ["segment_010.m4s", "segment_002.m4s", "init.mp4", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let content = MediaPlaylist::minimal(dir.path(), 2, Some("EVENT")).render();
        let info = parse(&content).unwrap();
        assert_eq!(info.segments, vec!["segment_002.m4s", "segment_010.m4s"]);
        assert!(content.contains("#EXT-X-MAP:URI=\"init.mp4\""));
        assert_eq!(info.playlist_type.as_deref(), Some("EVENT"));
    }

    #[test]
    fn test_parse_rejects_truncated_manifest() {
        assert_eq!(parse(""), Err(PlaylistParseError::MissingHeader));
        assert_eq!(
            parse("#EXTM3U\n#EXT-X-VERSION:7\n"),
            Err(PlaylistParseError::MissingTargetDuration)
        );
        assert!(matches!(
            parse("#EXTM3U\n#EXT-X-TARGETDURATION:two\n"),
            Err(PlaylistParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_ffmpeg_style_playlist() {
        let content = "#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:3\n\
            #EXT-X-INDEPENDENT-SEGMENTS\n#EXT-X-MAP:URI=\"init.mp4\"\n\
            #EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00.000+0000\n#EXTINF:2.000000,\nsegment_003.m4s\n\
            #EXT-X-ENDLIST\n";
        let info = parse(content).unwrap();
        assert_eq!(info.media_sequence, 3);
        assert_eq!(info.segments, vec!["segment_003.m4s"]);
        assert!(info.ended);
    }

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_file_name(7), "segment_007.m4s");
        assert_eq!(segment_index("segment_007.m4s"), Some(7));
        assert_eq!(segment_index("segment_1234.m4s"), Some(1234));
        assert_eq!(segment_index("segment_007.m4s.tmp"), None);
        assert_eq!(segment_index("init.mp4"), None);
    }

    #[test]
    fn test_master_playlist_references_media_playlist() {
        let master = master_playlist(128_000);
        assert!(master.starts_with("#EXTM3U\n"));
        assert!(master.contains("BANDWIDTH=128000"));
        assert!(master.trim_end().ends_with(PLAYLIST_NAME));
    }
}
