mod avi_encoder;

pub use avi_encoder::{AviEncoder, AviInfo};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RenderResult;
use crate::renderer::Canvas;

/// Trait for sequential frame writers
pub trait VideoEncoder {
    fn add_frame(&mut self, canvas: &Canvas) -> RenderResult<()>;
    /// Flush pending data, patch headers and close the file. Returns the number of frames written.
    fn finish(self) -> RenderResult<usize>;
}

/// Frame codecs the AVI writer can store, identified by their 4-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Codec {
    /// Uncompressed bottom-up BGR24 (`DIB `)
    #[default]
    Raw,
    /// One baseline JPEG per frame (`MJPG`)
    Mjpeg,
}

impl Codec {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Codec::Raw => *b"DIB ",
            Codec::Mjpeg => *b"MJPG",
        }
    }

    /// `biCompression` value of the stream format header
    pub(crate) fn compression(&self) -> [u8; 4] {
        match self {
            Codec::Raw => [0; 4],
            Codec::Mjpeg => *b"MJPG",
        }
    }

    /// Chunk id used for frames inside the `movi` list
    pub(crate) fn chunk_id(&self) -> [u8; 4] {
        match self {
            Codec::Raw => *b"00db",
            Codec::Mjpeg => *b"00dc",
        }
    }

    pub fn extension(&self) -> &'static str {
        "avi"
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dib" | "raw" | "rgb" => Ok(Codec::Raw),
            "mjpg" | "mjpeg" | "jpeg" => Ok(Codec::Mjpeg),
            _ => Err(format!("Unknown codec '{}'. Supported codecs: DIB, MJPG", s)),
        }
    }
}

impl TryFrom<String> for Codec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Codec> for String {
    fn from(codec: Codec) -> Self {
        codec.to_string()
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(String::from_utf8_lossy(&self.fourcc()).trim_end())
    }
}
