//! ID3v2.4 metadata for finished segments.

use std::fs;
use std::path::{Path, PathBuf};

use id3::frame::{Comment, Picture, PictureType};
use id3::{ErrorKind, Tag, TagLike, Version};
use tracing::debug;

use crate::error::TagError;

/// Metadata stamped onto one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    /// Stream title, used as the album.
    pub album: String,
    /// `"k/n"`
    pub track: String,
    /// `YYYY-MM-DD`, when the recording date is known.
    pub date: Option<String>,
    pub genre: String,
    pub comment: Option<String>,
    /// JPEG cover art.
    pub cover: Option<PathBuf>,
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

fn read_existing(path: &Path) -> Result<Tag, TagError> {
    let read = if is_wav(path) {
        Tag::read_from_wav_path(path)
    } else {
        Tag::read_from_path(path)
    };
    match read {
        Ok(tag) => Ok(tag),
        Err(id3::Error {
            kind: ErrorKind::NoTag,
            ..
        }) => Ok(Tag::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write `tags` into the file at `path`.
///
/// Frames not managed here are preserved. Re-tagging a file replaces the
/// managed frames instead of duplicating them. WAV files get the tag as an
/// `ID3 ` chunk, everything else gets it prepended.
pub fn write_tags(path: &Path, tags: &TrackTags) -> Result<(), TagError> {
    let cover = match &tags.cover {
        Some(cover) => Some(fs::read(cover).map_err(|source| TagError::CoverImage {
            path: cover.clone(),
            source,
        })?),
        None => None,
    };

    let mut tag = read_existing(path)?;
    tag.set_title(tags.title.as_str());
    tag.set_artist(tags.artist.as_str());
    tag.set_album(tags.album.as_str());
    tag.set_text("TRCK", tags.track.as_str());
    tag.set_genre(tags.genre.as_str());
    match &tags.date {
        Some(date) => tag.set_text("TDRC", date.as_str()),
        None => {
            tag.remove("TDRC");
        }
    }

    tag.remove_comment(Some(""), None);
    if let Some(text) = &tags.comment {
        tag.add_frame(Comment {
            lang: "eng".to_string(),
            description: String::new(),
            text: text.clone(),
        });
    }

    if let Some(data) = cover {
        tag.remove_picture_by_type(PictureType::CoverFront);
        tag.add_frame(Picture {
            mime_type: "image/jpeg".to_string(),
            picture_type: PictureType::CoverFront,
            description: "Cover".to_string(),
            data,
        });
    }

    if is_wav(path) {
        tag.write_to_wav_path(path, Version::Id3v24)?;
    } else {
        tag.write_to_path(path, Version::Id3v24)?;
    }
    debug!("Tagged {} as track {}", path.display(), tags.track);
    Ok(())
}
