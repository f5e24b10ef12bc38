// Artwork values shared by all formats

use crate::error::{Result, TagError};

/// Mime type marking picture data that is a URL rather than image bytes
pub const LINKED_IMAGE_MIME: &str = "-->";

/// Picture types according to the ID3v2 APIC / FLAC PICTURE tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Other = 0,
    FileIcon = 1,
    OtherFileIcon = 2,
    CoverFront = 3,
    CoverBack = 4,
    LeafletPage = 5,
    Media = 6,
    LeadArtist = 7,
    Artist = 8,
    Conductor = 9,
    Band = 10,
    Composer = 11,
    Lyricist = 12,
    RecordingLocation = 13,
    DuringRecording = 14,
    DuringPerformance = 15,
    VideoScreenCapture = 16,
    BrightColouredFish = 17,
    Illustration = 18,
    BandLogo = 19,
    PublisherLogo = 20,
}

impl PictureType {
    /// Highest picture type defined by the legacy table
    pub const MAX: u32 = 20;

    pub fn from_u32(value: u32) -> Option<Self> {
        let picture_type = match value {
            0 => PictureType::Other,
            1 => PictureType::FileIcon,
            2 => PictureType::OtherFileIcon,
            3 => PictureType::CoverFront,
            4 => PictureType::CoverBack,
            5 => PictureType::LeafletPage,
            6 => PictureType::Media,
            7 => PictureType::LeadArtist,
            8 => PictureType::Artist,
            9 => PictureType::Conductor,
            10 => PictureType::Band,
            11 => PictureType::Composer,
            12 => PictureType::Lyricist,
            13 => PictureType::RecordingLocation,
            14 => PictureType::DuringRecording,
            15 => PictureType::DuringPerformance,
            16 => PictureType::VideoScreenCapture,
            17 => PictureType::BrightColouredFish,
            18 => PictureType::Illustration,
            19 => PictureType::BandLogo,
            20 => PictureType::PublisherLogo,
            _ => return None,
        };
        Some(picture_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PictureType::Other => "Other",
            PictureType::FileIcon => "File Icon",
            PictureType::OtherFileIcon => "Other File Icon",
            PictureType::CoverFront => "Cover (front)",
            PictureType::CoverBack => "Cover (back)",
            PictureType::LeafletPage => "Leaflet page",
            PictureType::Media => "Media",
            PictureType::LeadArtist => "Lead artist",
            PictureType::Artist => "Artist",
            PictureType::Conductor => "Conductor",
            PictureType::Band => "Band",
            PictureType::Composer => "Composer",
            PictureType::Lyricist => "Lyricist",
            PictureType::RecordingLocation => "Recording Location",
            PictureType::DuringRecording => "During recording",
            PictureType::DuringPerformance => "During performance",
            PictureType::VideoScreenCapture => "Video screen capture",
            PictureType::BrightColouredFish => "Bright coloured fish",
            PictureType::Illustration => "Illustration",
            PictureType::BandLogo => "Band logo",
            PictureType::PublisherLogo => "Publisher logo",
        }
    }
}

/// Format-neutral picture: mime type, dimensions and raw image bytes.
///
/// Pixels are never decoded here; `width`/`height`/`depth` are whatever the
/// caller or the source file declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    /// Raw picture type value; see [`PictureType`]
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Palette size for indexed images, 0 otherwise
    pub colors: u32,
    pub data: Vec<u8>,
}

impl Artwork {
    /// Front cover from image bytes, mime type sniffed from the magic number
    pub fn from_image(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime_type(&data).unwrap_or("image/jpeg").to_string();
        Self::new(data, mime_type, String::new())
    }

    pub fn new(data: Vec<u8>, mime_type: String, description: String) -> Self {
        Artwork {
            picture_type: PictureType::CoverFront as u32,
            mime_type,
            description,
            width: 0,
            height: 0,
            depth: 0,
            colors: 0,
            data,
        }
    }

    /// Artwork that points at an external image instead of embedding it
    pub fn linked(url: &str) -> Self {
        Self::new(url.as_bytes().to_vec(), LINKED_IMAGE_MIME.to_string(), String::new())
    }

    pub fn kind(&self) -> Option<PictureType> {
        PictureType::from_u32(self.picture_type)
    }

    /// Whether `data` holds a URL instead of image bytes
    pub fn is_linked(&self) -> bool {
        self.mime_type == LINKED_IMAGE_MIME
    }

    pub fn linked_url(&self) -> Option<String> {
        self.is_linked()
            .then(|| String::from_utf8_lossy(&self.data).into_owned())
    }

    /// Checks run before any field is built from this artwork
    pub fn validate(&self) -> Result<()> {
        if self.picture_type > PictureType::MAX {
            return Err(TagError::InvalidFieldValue(format!(
                "picture type {} is outside 0..={}",
                self.picture_type,
                PictureType::MAX
            )));
        }
        if self.data.is_empty() {
            return Err(TagError::InvalidFieldValue("artwork without data".into()));
        }
        Ok(())
    }

    /// Get file extension based on MIME type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "jpg",
        }
    }
}

/// Guess an image mime type from its leading bytes
pub fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.starts_with(b"BM") {
        Some("image/bmp")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
