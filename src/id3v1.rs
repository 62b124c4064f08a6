// ID3v1 container module
// The legacy 128-byte trailer at the end of a file. Fixed-width latin-1
// fields, with ID3v1.1 reusing the last two comment bytes for a track number.

use tracing::debug;

use crate::charset;
use crate::formats::{ReadOptions, TagError, TagFormat, TagFrame, TagFuture, TagMetadata};
use crate::frames::{Comment, DecodedFrame};
use crate::range::{ByteRange, ResolvedRange};
use crate::transport::MediaSource;

pub const TAG_LEN: usize = 128;

/// ID3v1 genres with the Winamp extensions, indexed by genre byte.
pub const GENRES: [&str; 148] = [
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "AlternRock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native American",
    "Cabaret",
    "New Wave",
    "Psychadelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
    "Folk",
    "Folk-Rock",
    "National Folk",
    "Swing",
    "Fast Fusion",
    "Bebob",
    "Latin",
    "Revival",
    "Celtic",
    "Bluegrass",
    "Avantgarde",
    "Gothic Rock",
    "Progressive Rock",
    "Psychedelic Rock",
    "Symphonic Rock",
    "Slow Rock",
    "Big Band",
    "Chorus",
    "Easy Listening",
    "Acoustic",
    "Humour",
    "Speech",
    "Chanson",
    "Opera",
    "Chamber Music",
    "Sonata",
    "Symphony",
    "Booty Bass",
    "Primus",
    "Porn Groove",
    "Satire",
    "Slow Jam",
    "Club",
    "Tango",
    "Samba",
    "Folklore",
    "Ballad",
    "Power Ballad",
    "Rhythmic Soul",
    "Freestyle",
    "Duet",
    "Punk Rock",
    "Drum Solo",
    "Acapella",
    "Euro-House",
    "Dance Hall",
    "Goa",
    "Drum & Bass",
    "Club-House",
    "Hardcore",
    "Terror",
    "Indie",
    "BritPop",
    "Negerpunk",
    "Polsk Punk",
    "Beat",
    "Christian Gangsta Rap",
    "Heavy Metal",
    "Black Metal",
    "Crossover",
    "Contemporary Christian",
    "Christian Rock",
    "Merengue",
    "Salsa",
    "Thrash Metal",
    "Anime",
    "JPop",
    "Synthpop",
];

pub fn genre_name(index: u8) -> Option<&'static str> {
    GENRES.get(usize::from(index)).copied()
}

/// A fixed-width field with trailing NULs and spaces trimmed.
fn field(bytes: &[u8]) -> String {
    let text = charset::decode(bytes, None).value;
    text.trim_end_matches([' ', '\0']).to_string()
}

/// Decodes a 128-byte trailer.
pub fn decode_tag(tag: &[u8], options: &ReadOptions) -> Result<TagMetadata, TagError> {
    if tag.len() != TAG_LEN || !tag.starts_with(b"TAG") {
        return Err(TagError::MalformedTag(format!("not a {TAG_LEN} byte ID3v1 trailer")));
    }
    let comment_bytes = &tag[97..127];
    // v1.1: a zero at comment byte 28 followed by a non-zero track number
    let track = match (comment_bytes[28], comment_bytes[29]) {
        (0, track) if track != 0 => Some(track),
        _ => None,
    };
    let comment_bytes = if track.is_some() { &comment_bytes[..28] } else { comment_bytes };

    let version = if track.is_some() { "1.1" } else { "1.0" };
    let mut metadata = TagMetadata::new("ID3", version, TAG_LEN as u64);

    let mut store = |key: &str, size: usize, data: DecodedFrame| {
        if options.wants(key) {
            metadata.insert(TagFrame {
                id: key.to_string(),
                size: size as u64,
                description: "",
                data,
            });
        }
    };

    for (key, range) in [("title", 3..33), ("artist", 33..63), ("album", 63..93), ("year", 93..97)] {
        let size = range.len();
        let text = field(&tag[range]);
        if !text.is_empty() {
            store(key, size, DecodedFrame::PlainText(text));
        }
    }

    let comment = field(comment_bytes);
    if !comment.is_empty() {
        store(
            "comment",
            comment_bytes.len(),
            DecodedFrame::Comment(Comment {
                language: String::new(),
                short_description: String::new(),
                text: comment,
            }),
        );
    }
    if let Some(track) = track {
        store("track", 1, DecodedFrame::PlainText(track.to_string()));
    }
    if let Some(genre) = genre_name(tag[127]) {
        store("genre", 1, DecodedFrame::Genre(genre.to_string()));
    }

    debug!(version, frames = metadata.len(), "decoded ID3v1 tag");
    Ok(metadata)
}

/// ID3v1 trailer in the last 128 bytes of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3v1Format;

impl TagFormat for Id3v1Format {
    fn name(&self) -> &'static str {
        "ID3v1"
    }

    fn identifier_range(&self) -> ByteRange {
        ByteRange::new(-(TAG_LEN as i64), 3)
    }

    fn matches(&self, identifier: &[u8]) -> bool {
        identifier == b"TAG"
    }

    fn read<'a>(&'a self, source: &'a dyn MediaSource, options: &'a ReadOptions) -> TagFuture<'a> {
        Box::pin(async move {
            let len = source.len();
            let offset = len
                .checked_sub(TAG_LEN as u64)
                .ok_or_else(|| TagError::MalformedTag(format!("file of {len} bytes cannot hold an ID3v1 tag")))?;
            source.load_range(ResolvedRange::new(offset, TAG_LEN as u64)).await?;
            let tag = source.bytes_at(offset, TAG_LEN)?;
            decode_tag(&tag, options)
        })
    }
}
