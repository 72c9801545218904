use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{Codec, VideoEncoder};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Canvas;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

// Byte offsets of the fields patched once the frame count is known
const RIFF_SIZE_POS: u64 = 4;
const AVIH_MAX_BYTES_PER_SEC_POS: u64 = 36;
const AVIH_TOTAL_FRAMES_POS: u64 = 48;
const AVIH_BUFFER_SIZE_POS: u64 = 60;
const STRH_LENGTH_POS: u64 = 140;
const STRH_BUFFER_SIZE_POS: u64 = 144;
const MOVI_SIZE_POS: u64 = 216;
/// Position of the `movi` fourcc; `idx1` offsets are relative to it
const MOVI_TAG_POS: u64 = 220;
/// Largest RIFF payload a 32-bit size field can describe
const MAX_RIFF_SIZE: u64 = u32::MAX as u64;

/// RIFF AVI 1.0 writer with a single video stream.
///
/// Headers are written up front with zeroed counts and patched in `finish`.
pub struct AviEncoder {
    writer: BufWriter<File>,
    path: PathBuf,
    codec: Codec,
    width: u32,
    height: u32,
    fps: u32,
    jpeg_quality: u8,
    /// (offset from the movi tag, payload size) per frame
    index: Vec<(u32, u32)>,
    position: u64,
    max_frame_size: u32,
    scratch: Vec<u8>,
    size_limit: u64,
}

impl AviEncoder {
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: Codec,
        jpeg_quality: u8,
    ) -> RenderResult<Self> {
        let file = File::create(path)?;
        let mut encoder = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            codec,
            width,
            height,
            fps,
            jpeg_quality,
            index: Vec::new(),
            position: 0,
            max_frame_size: 0,
            scratch: Vec::new(),
            size_limit: MAX_RIFF_SIZE,
        };
        encoder.write_headers()?;
        Ok(encoder)
    }

    /// Lower the RIFF payload ceiling below what the 32-bit size fields allow.
    #[cfg(test)]
    pub(crate) fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit.min(MAX_RIFF_SIZE);
        self
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    /// Close the file without finalizing and delete it.
    pub fn abort(mut self) -> io::Result<()> {
        let flushed = self.writer.flush();
        drop(self.writer);
        std::fs::remove_file(&self.path)?;
        flushed
    }

    fn raw_stride(&self) -> usize {
        (self.width as usize * 3 + 3) & !3
    }

    fn raw_frame_size(&self) -> u32 {
        (self.raw_stride() * self.height as usize) as u32
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> io::Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn put_u16(&mut self, value: u16) -> io::Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_headers(&mut self) -> io::Result<()> {
        let frame_size = self.raw_frame_size();
        let micros_per_frame = 1_000_000 / self.fps.max(1);

        self.put(b"RIFF")?;
        self.put_u32(0)?; // patched
        self.put(b"AVI ")?;

        self.put(b"LIST")?;
        self.put_u32(192)?;
        self.put(b"hdrl")?;

        // MainAVIHeader
        self.put(b"avih")?;
        self.put_u32(56)?;
        self.put_u32(micros_per_frame)?;
        self.put_u32(0)?; // dwMaxBytesPerSec, patched
        self.put_u32(0)?; // dwPaddingGranularity
        self.put_u32(AVIF_HASINDEX)?;
        self.put_u32(0)?; // dwTotalFrames, patched
        self.put_u32(0)?; // dwInitialFrames
        self.put_u32(1)?; // dwStreams
        self.put_u32(frame_size)?; // dwSuggestedBufferSize, patched
        self.put_u32(self.width)?;
        self.put_u32(self.height)?;
        self.put(&[0; 16])?;

        self.put(b"LIST")?;
        self.put_u32(116)?;
        self.put(b"strl")?;

        // AVIStreamHeader
        self.put(b"strh")?;
        self.put_u32(56)?;
        self.put(b"vids")?;
        self.put(&self.codec.fourcc())?;
        self.put_u32(0)?; // dwFlags
        self.put_u16(0)?; // wPriority
        self.put_u16(0)?; // wLanguage
        self.put_u32(0)?; // dwInitialFrames
        self.put_u32(1)?; // dwScale
        self.put_u32(self.fps)?; // dwRate
        self.put_u32(0)?; // dwStart
        self.put_u32(0)?; // dwLength, patched
        self.put_u32(frame_size)?; // dwSuggestedBufferSize, patched
        self.put_u32(u32::MAX)?; // dwQuality: driver default
        self.put_u32(match self.codec {
            Codec::Raw => frame_size,
            Codec::Mjpeg => 0,
        })?;
        self.put_u16(0)?;
        self.put_u16(0)?;
        self.put_u16(self.width as u16)?;
        self.put_u16(self.height as u16)?;

        // BITMAPINFOHEADER
        self.put(b"strf")?;
        self.put_u32(40)?;
        self.put_u32(40)?;
        self.put(&(self.width as i32).to_le_bytes())?;
        self.put(&(self.height as i32).to_le_bytes())?; // positive height: bottom-up rows
        self.put_u16(1)?; // biPlanes
        self.put_u16(24)?; // biBitCount
        self.put(&self.codec.compression())?;
        self.put_u32(frame_size)?;
        self.put(&[0; 16])?;

        debug_assert_eq!(self.position, MOVI_SIZE_POS - 4);
        self.put(b"LIST")?;
        self.put_u32(0)?; // patched
        self.put(b"movi")?;
        Ok(())
    }

    /// Bottom-up BGR rows padded to 4 bytes, as BI_RGB expects.
    fn pack_raw(&mut self, canvas: &Canvas) {
        let stride = self.raw_stride();
        let width = self.width as usize;
        let height = self.height as usize;
        let data = canvas.data();

        self.scratch.clear();
        self.scratch.resize(stride * height, 0);
        for y in 0..height {
            let src = &data[(height - 1 - y) * width * 3..][..width * 3];
            let dst = &mut self.scratch[y * stride..][..width * 3];
            for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
            }
        }
    }

    fn pack_jpeg(&mut self, canvas: &Canvas) -> RenderResult<()> {
        self.scratch.clear();
        JpegEncoder::new_with_quality(&mut self.scratch, self.jpeg_quality)
            .encode_image(canvas.image())
            .map_err(|e| RenderError::Encode {
                frame: self.index.len(),
                message: e.to_string(),
            })
    }

    fn write_index(&mut self) -> io::Result<()> {
        let chunk_id = self.codec.chunk_id();
        let mut idx1 = Vec::with_capacity(8 + self.index.len() * 16);
        idx1.extend_from_slice(b"idx1");
        idx1.extend_from_slice(&((self.index.len() * 16) as u32).to_le_bytes());
        for &(offset, size) in &self.index {
            idx1.extend_from_slice(&chunk_id);
            idx1.extend_from_slice(&AVIIF_KEYFRAME.to_le_bytes());
            idx1.extend_from_slice(&offset.to_le_bytes());
            idx1.extend_from_slice(&size.to_le_bytes());
        }
        self.put(&idx1)
    }

    fn patch_u32(&mut self, pos: u64, value: u32) -> io::Result<()> {
        self.writer.seek(SeekFrom::Start(pos))?;
        self.writer.write_all(&value.to_le_bytes())
    }
}

impl VideoEncoder for AviEncoder {
    fn add_frame(&mut self, canvas: &Canvas) -> RenderResult<()> {
        if canvas.width() != self.width || canvas.height() != self.height {
            return Err(RenderError::Encode {
                frame: self.index.len(),
                message: format!(
                    "frame is {}x{}, stream is {}x{}",
                    canvas.width(),
                    canvas.height(),
                    self.width,
                    self.height
                ),
            });
        }

        match self.codec {
            Codec::Raw => self.pack_raw(canvas),
            Codec::Mjpeg => self.pack_jpeg(canvas)?,
        }

        // the finished file, index included, must stay describable by the RIFF size field
        let chunk = 8 + self.scratch.len() as u64 + (self.scratch.len() as u64 & 1);
        let index = 8 + 16 * (self.index.len() as u64 + 1);
        let riff_size = self.position + chunk + index - 8;
        if riff_size > self.size_limit {
            return Err(RenderError::Encode {
                frame: self.index.len(),
                message: format!(
                    "AVI file would grow to {} bytes, the limit is {}",
                    riff_size + 8,
                    self.size_limit + 8
                ),
            });
        }

        let payload = std::mem::take(&mut self.scratch);
        let size = payload.len() as u32;
        let offset = (self.position - MOVI_TAG_POS) as u32;

        self.put(&self.codec.chunk_id())?;
        self.put_u32(size)?;
        self.put(&payload)?;
        if size % 2 == 1 {
            self.put(&[0])?;
        }

        self.scratch = payload;
        self.index.push((offset, size));
        self.max_frame_size = self.max_frame_size.max(size);
        Ok(())
    }

    fn finish(mut self) -> RenderResult<usize> {
        let movi_end = self.position;
        self.write_index()?;
        let file_end = self.position;

        let frames = self.index.len() as u32;
        let buffer_size = self.max_frame_size.max(1);
        let bytes_per_sec = buffer_size.saturating_mul(self.fps);

        self.patch_u32(RIFF_SIZE_POS, (file_end - 8) as u32)?;
        self.patch_u32(AVIH_MAX_BYTES_PER_SEC_POS, bytes_per_sec)?;
        self.patch_u32(AVIH_TOTAL_FRAMES_POS, frames)?;
        self.patch_u32(AVIH_BUFFER_SIZE_POS, buffer_size)?;
        self.patch_u32(STRH_LENGTH_POS, frames)?;
        self.patch_u32(STRH_BUFFER_SIZE_POS, buffer_size)?;
        self.patch_u32(MOVI_SIZE_POS, (movi_end - MOVI_SIZE_POS - 4) as u32)?;

        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(frames as usize)
    }
}

/// Stream parameters and frame payloads read back from an AVI file.
#[derive(Debug, Clone, PartialEq)]
pub struct AviInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fourcc: [u8; 4],
    /// `dwTotalFrames` from the main header
    pub total_frames: u32,
    pub frames: Vec<Vec<u8>>,
    pub indexed_frames: usize,
}

impl AviInfo {
    pub fn read(path: &Path) -> io::Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        fn bad(msg: &str) -> io::Error {
            io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
        }
        fn u32_at(bytes: &[u8], pos: usize) -> io::Result<u32> {
            bytes
                .get(pos..pos + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| bad("truncated AVI file"))
        }

        if !bytes.starts_with(b"RIFF") || bytes.get(8..12) != Some(&b"AVI "[..]) {
            return Err(bad("not a RIFF AVI file"));
        }

        let mut info = AviInfo {
            width: 0,
            height: 0,
            fps: 0,
            fourcc: [0; 4],
            total_frames: 0,
            frames: Vec::new(),
            indexed_frames: 0,
        };

        // Walk chunks, descending into LIST chunks
        let mut pos = 12;
        while pos + 8 <= bytes.len() {
            let id = &bytes[pos..pos + 4];
            let size = u32_at(bytes, pos + 4)? as usize;
            let body = pos + 8;
            if body + size > bytes.len() {
                return Err(bad("chunk runs past end of file"));
            }

            match id {
                b"LIST" => {
                    pos = body + 4;
                    continue;
                }
                b"avih" => {
                    info.total_frames = u32_at(bytes, body + 16)?;
                    info.width = u32_at(bytes, body + 32)?;
                    info.height = u32_at(bytes, body + 36)?;
                }
                b"strh" => {
                    info.fourcc.copy_from_slice(&bytes[body + 4..body + 8]);
                    let scale = u32_at(bytes, body + 20)?.max(1);
                    info.fps = u32_at(bytes, body + 24)? / scale;
                }
                b"idx1" => info.indexed_frames = size / 16,
                [b'0', b'0', b'd', _] => info.frames.push(bytes[body..body + size].to_vec()),
                _ => {}
            }
            pos = body + size + (size & 1);
        }

        Ok(info)
    }

    /// Decode an uncompressed (`DIB `) frame back into top-down RGB rows.
    pub fn raw_rgb(&self, frame: usize) -> Option<Vec<u8>> {
        let payload = self.frames.get(frame)?;
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = (width * 3 + 3) & !3;
        if payload.len() < stride * height {
            return None;
        }

        let mut rgb = Vec::with_capacity(width * height * 3);
        for y in (0..height).rev() {
            for px in payload[y * stride..][..width * 3].chunks_exact(3) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        Some(rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> Canvas {
        let mut canvas = Canvas::new(width, height);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                if (x + y) % 2 == 0 {
                    canvas.set_pixel(x, y, [10, 20, 30]);
                }
            }
        }
        canvas
    }

    #[test]
    fn raw_stream_round_trips_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.avi");

        // odd width forces row padding
        let frame = checker(5, 3);
        let mut encoder = AviEncoder::create(&path, 5, 3, 24, Codec::Raw, 90).unwrap();
        encoder.add_frame(&frame).unwrap();
        encoder.add_frame(&Canvas::new(5, 3)).unwrap();
        assert_eq!(encoder.finish().unwrap(), 2);

        let info = AviInfo::read(&path).unwrap();
        assert_eq!((info.width, info.height, info.fps), (5, 3, 24));
        assert_eq!(&info.fourcc, b"DIB ");
        assert_eq!(info.total_frames, 2);
        assert_eq!(info.indexed_frames, 2);
        assert_eq!(info.frames.len(), 2);
        assert_eq!(info.raw_rgb(0).unwrap(), frame.data());
        assert!(info.raw_rgb(1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn riff_and_movi_sizes_are_patched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sizes.avi");
        let mut encoder = AviEncoder::create(&path, 4, 4, 30, Codec::Raw, 90).unwrap();
        for _ in 0..3 {
            encoder.add_frame(&checker(4, 4)).unwrap();
        }
        encoder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(riff_size + 8, bytes.len());

        let movi_size = u32::from_le_bytes(bytes[216..220].try_into().unwrap()) as usize;
        assert_eq!(&bytes[220..224], b"movi");
        // three 4x4 frames, 48 bytes each plus an 8 byte chunk header
        assert_eq!(movi_size, 4 + 3 * (8 + 48));
        assert_eq!(&bytes[220 + movi_size..224 + movi_size], b"idx1");
    }

    #[test]
    fn mjpeg_frames_are_jpeg_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mjpg.avi");
        let mut encoder = AviEncoder::create(&path, 16, 8, 10, Codec::Mjpeg, 80).unwrap();
        encoder.add_frame(&checker(16, 8)).unwrap();
        encoder.finish().unwrap();

        let info = AviInfo::read(&path).unwrap();
        assert_eq!(&info.fourcc, b"MJPG");
        assert_eq!(info.frames.len(), 1);
        assert_eq!(&info.frames[0][..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&info.frames[0]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.avi");
        let mut encoder = AviEncoder::create(&path, 4, 4, 30, Codec::Raw, 90).unwrap();
        let err = encoder.add_frame(&Canvas::new(3, 4)).unwrap_err();
        assert!(matches!(err, RenderError::Encode { frame: 0, .. }));
    }

    #[test]
    fn frames_past_the_size_limit_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limit.avi");
        // headers (224) + two 4x4 raw chunks (2 * 56) + idx1 for two frames (40), minus the RIFF header
        let limit = 224 + 2 * 56 + 40 - 8;
        let mut encoder = AviEncoder::create(&path, 4, 4, 30, Codec::Raw, 90)
            .unwrap()
            .with_size_limit(limit);
        encoder.add_frame(&checker(4, 4)).unwrap();
        encoder.add_frame(&checker(4, 4)).unwrap();

        let err = encoder.add_frame(&checker(4, 4)).unwrap_err();
        assert!(matches!(err, RenderError::Encode { frame: 2, .. }));
        assert!(!err.is_fatal());
        assert_eq!(encoder.frames_written(), 2);

        // the rejected frame left nothing behind, so the file still finalizes cleanly
        assert_eq!(encoder.finish().unwrap(), 2);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, limit + 8);
        assert_eq!(AviInfo::parse(&bytes).unwrap().frames.len(), 2);
    }

    #[test]
    fn abort_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.avi");
        let mut encoder = AviEncoder::create(&path, 2, 2, 30, Codec::Raw, 90).unwrap();
        encoder.add_frame(&Canvas::new(2, 2)).unwrap();
        encoder.abort().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn empty_stream_is_still_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.avi");
        let encoder = AviEncoder::create(&path, 2, 2, 30, Codec::Raw, 90).unwrap();
        assert_eq!(encoder.finish().unwrap(), 0);
        let info = AviInfo::read(&path).unwrap();
        assert_eq!(info.total_frames, 0);
        assert!(info.frames.is_empty());
    }
}
