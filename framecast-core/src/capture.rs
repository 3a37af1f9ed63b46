//! Capture adapters.
//!
//! A [`CaptureDevice`] yields raw frames at its native rate. The
//! scheduler owns it through a [`CaptureHandle`], which guarantees the
//! device is closed exactly once whichever way the session ends.
//!
//! Two devices ship with the crate:
//!
//! - [`TestPatternSource`] renders a moving gradient, useful for
//!   smoke-testing an ingestion endpoint without a camera.
//! - [`RawVideoSource`] reads fixed-size raw frames from any reader,
//!   e.g. the stdout of `ffmpeg -f rawvideo -pix_fmt rgb24 -`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::StreamError;
use crate::frame::{PixelFormat, RawFrame};

// ── CaptureDevice ────────────────────────────────────────────────

/// A source of raw frames.
///
/// `read_frame` may block. The scheduler calls it on the blocking pool
/// and stops waiting when a stop is requested; the device is closed
/// once the pending read returns.
pub trait CaptureDevice: Send {
    /// Acquire the underlying resource.
    fn open(&mut self) -> Result<(), StreamError>;

    /// Next frame, or `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError>;

    /// Release the underlying resource.
    fn close(&mut self);

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

// ── CaptureHandle ────────────────────────────────────────────────

/// An opened capture device, closed exactly once.
pub struct CaptureHandle {
    device: Box<dyn CaptureDevice>,
    open: bool,
}

impl CaptureHandle {
    /// Open `device`. Failure is a capture error; nothing to release.
    pub fn open(mut device: Box<dyn CaptureDevice>) -> Result<Self, StreamError> {
        device.open()?;
        info!("capture opened: {}", device.describe());
        Ok(Self { device, open: true })
    }

    pub fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        if !self.open {
            return Err(StreamError::Capture("capture handle already released".into()));
        }
        self.device.read_frame()
    }

    /// Close the device now.
    pub fn release(mut self) {
        self.close_once();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn describe(&self) -> String {
        self.device.describe()
    }

    fn close_once(&mut self) {
        if self.open {
            self.open = false;
            self.device.close();
            info!("capture released: {}", self.device.describe());
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.close_once();
    }
}

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic RGB gradient that scrolls one pixel per frame.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    /// Stop after this many frames. `None` = endless.
    limit: Option<u64>,
    produced: u64,
    open: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limit: None,
            produced: 0,
            open: false,
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl CaptureDevice for TestPatternSource {
    fn open(&mut self) -> Result<(), StreamError> {
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::Capture(format!(
                "invalid test pattern size {}x{}",
                self.width, self.height
            )));
        }
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        if !self.open {
            return Err(StreamError::Capture("test pattern not opened".into()));
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        let bpp = PixelFormat::Rgb8.bytes_per_pixel();
        let stride = self.width as usize * bpp;
        let shift = self.produced as usize;
        let mut data = vec![0u8; stride * self.height as usize];
        for (y, row) in data.chunks_exact_mut(stride).enumerate() {
            for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
                px[0] = ((x + shift) % 256) as u8;
                px[1] = (y % 256) as u8;
                px[2] = ((x + y + shift) % 256) as u8;
            }
        }

        self.produced += 1;
        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            stride: stride as u32,
            format: PixelFormat::Rgb8,
            data,
            captured_at: SystemTime::now(),
        }))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        format!("test-pattern {}x{}", self.width, self.height)
    }
}

// ── RawVideoSource ───────────────────────────────────────────────

/// Where a [`RawVideoSource`] reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    Stdin,
    File(PathBuf),
}

/// Reads tightly packed raw frames of a fixed geometry.
pub struct RawVideoSource {
    input: RawInput,
    width: u32,
    height: u32,
    format: PixelFormat,
    reader: Option<Box<dyn Read + Send>>,
}

impl RawVideoSource {
    pub fn new(input: RawInput, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            input,
            width,
            height,
            format,
            reader: None,
        }
    }

    /// Read from an already-open reader (pipes, tests).
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            input: RawInput::Stdin,
            width,
            height,
            format,
            reader: Some(reader),
        }
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

impl CaptureDevice for RawVideoSource {
    fn open(&mut self) -> Result<(), StreamError> {
        if self.frame_size() == 0 {
            return Err(StreamError::Capture(format!(
                "invalid raw frame size {}x{}",
                self.width, self.height
            )));
        }
        if self.reader.is_some() {
            return Ok(());
        }
        let reader: Box<dyn Read + Send> = match &self.input {
            RawInput::Stdin => Box::new(BufReader::new(io::stdin())),
            RawInput::File(path) => {
                let file = File::open(path).map_err(|e| {
                    StreamError::Capture(format!("cannot open {}: {e}", path.display()))
                })?;
                Box::new(BufReader::new(file))
            }
        };
        self.reader = Some(reader);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        let size = self.frame_size();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StreamError::Capture("raw video source not opened".into()))?;

        let mut data = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Capture(format!("read failed: {e}"))),
            }
        }

        if filled == 0 {
            debug!("raw video input reached end of stream");
            return Ok(None);
        }
        if filled < size {
            return Err(StreamError::Capture(format!(
                "truncated frame: got {filled} of {size} bytes"
            )));
        }

        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            stride: (self.width as usize * self.format.bytes_per_pixel()) as u32,
            format: self.format,
            data,
            captured_at: SystemTime::now(),
        }))
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn describe(&self) -> String {
        let input = match &self.input {
            RawInput::Stdin => "stdin".to_string(),
            RawInput::File(path) => path.display().to_string(),
        };
        format!("rawvideo {input} {}x{} {:?}", self.width, self.height, self.format)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDevice {
        closes: Arc<AtomicUsize>,
    }

    impl CaptureDevice for CountingDevice {
        fn open(&mut self) -> Result<(), StreamError> {
            Ok(())
        }
        fn read_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
            Ok(None)
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn handle_closes_once_on_release() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = CaptureHandle::open(Box::new(CountingDevice {
            closes: Arc::clone(&closes),
        }))
        .unwrap();
        handle.release();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_closes_once_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _handle = CaptureHandle::open(Box::new(CountingDevice {
                closes: Arc::clone(&closes),
            }))
            .unwrap();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pattern_honours_limit() {
        let mut src = TestPatternSource::new(8, 4).with_limit(2);
        src.open().unwrap();
        let frame = src.read_frame().unwrap().unwrap();
        assert_eq!(frame.data.len(), 8 * 4 * 3);
        assert!(frame.is_consistent());
        assert!(src.read_frame().unwrap().is_some());
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_pattern_moves() {
        let mut src = TestPatternSource::new(8, 2);
        src.open().unwrap();
        let a = src.read_frame().unwrap().unwrap();
        let b = src.read_frame().unwrap().unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn raw_source_reads_whole_frames_then_eos() {
        let bytes = vec![9u8; 2 * 2 * 3 * 2];
        let mut src = RawVideoSource::from_reader(Box::new(Cursor::new(bytes)), 2, 2, PixelFormat::Rgb8);
        src.open().unwrap();
        assert!(src.read_frame().unwrap().is_some());
        assert!(src.read_frame().unwrap().is_some());
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn raw_source_truncated_frame_is_capture_error() {
        let bytes = vec![1u8; 10];
        let mut src = RawVideoSource::from_reader(Box::new(Cursor::new(bytes)), 2, 2, PixelFormat::Rgb8);
        src.open().unwrap();
        let err = src.read_frame().unwrap_err();
        assert!(matches!(err, StreamError::Capture(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn raw_source_missing_file() {
        let mut src = RawVideoSource::new(
            RawInput::File(PathBuf::from("/definitely/not/here.raw")),
            2,
            2,
            PixelFormat::Gray8,
        );
        assert!(matches!(src.open(), Err(StreamError::Capture(_))));
    }
}
