//! Camera lifecycle: acquire and release a capture device, track frame
//! readiness, and grab downscaled JPEG stills. Hardware access sits behind
//! the `CameraBackend`/`CameraStream` traits so the state machine runs
//! unchanged against a fake in tests.
//!
//! Overlapping start/stop requests are ordered by a generation counter: only
//! the grant matching the live generation is applied, a stale grant has its
//! stream released on arrival and reports cancellation instead of success.

use std::future::Future;

use image::{codecs::jpeg::JpegEncoder, imageops, imageops::FilterType, DynamicImage, RgbaImage};
use tracing::{debug, warn};

use crate::error::CameraError;
use crate::fence::Fence;
use crate::image_guard::MAX_CAPTURE_DIMENSION;
use crate::types::{CandidateImage, ImageOrigin};

const JPEG_QUALITY: u8 = 90;

/// One uncompressed frame read off a live stream, tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Hardware capability: hands out streams. Acquisition is the only
/// suspension point in the camera lifecycle.
pub trait CameraBackend {
    type Stream: CameraStream;

    fn acquire(&mut self) -> impl Future<Output = Result<Self::Stream, CameraError>>;
}

/// An open hardware acquisition. `release` must stop the underlying tracks;
/// it is called exactly once per granted stream, including stale grants.
pub trait CameraStream {
    /// Bind the stream to its output surface.
    fn attach(&mut self) -> Result<(), CameraError>;
    fn detach(&mut self);
    /// Current frame dimensions, once the surface reports them.
    fn frame_size(&self) -> Option<(u32, u32)>;
    fn read_frame(&mut self) -> Result<RawFrame, CameraError>;
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Starting,
    Active,
}

/// Owns the single hardware handle for one flow instance. At most one stream
/// is live at a time; starting over an active session tears the old one down
/// first.
pub struct CaptureDevice<B: CameraBackend> {
    backend: B,
    stream: Option<B::Stream>,
    state: CameraState,
    ready: bool,
    generation: Fence,
    closed: bool,
}

impl<B: CameraBackend> CaptureDevice<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            stream: None,
            state: CameraState::Idle,
            ready: false,
            generation: Fence::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CameraState::Active
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Begin a start attempt. Fails fast while another attempt is in flight;
    /// callers must let the prior attempt settle rather than queue. Returns
    /// the generation that the eventual grant must present to `finish_start`.
    pub fn begin_start(&mut self) -> Result<u64, CameraError> {
        if self.state == CameraState::Starting {
            return Err(CameraError::AlreadyStarting);
        }
        if self.state == CameraState::Active {
            self.stop();
        }
        let generation = self.generation.advance();
        self.state = CameraState::Starting;
        self.ready = false;
        debug!(generation, "camera start requested");
        Ok(generation)
    }

    /// Apply the outcome of a hardware acquisition. A grant whose generation
    /// was superseded by a later `begin_start`/`stop`, or that lands after
    /// teardown, is released immediately and reported as canceled so a slow
    /// acquisition can never clobber later state.
    pub fn finish_start(
        &mut self,
        generation: u64,
        grant: Result<B::Stream, CameraError>,
    ) -> Result<(), CameraError> {
        match grant {
            Ok(mut stream) => {
                if self.closed || !self.generation.is_current(generation) {
                    debug!(generation, "discarding stale camera grant");
                    stream.release();
                    return Err(CameraError::Canceled);
                }
                if let Err(err) = stream.attach() {
                    stream.release();
                    self.state = CameraState::Idle;
                    self.ready = false;
                    return Err(err);
                }
                self.stream = Some(stream);
                self.state = CameraState::Active;
                debug!(generation, "camera active");
                Ok(())
            }
            Err(err) => {
                if !self.closed && self.generation.is_current(generation) {
                    self.state = CameraState::Idle;
                    self.ready = false;
                }
                warn!(generation, error = %err, "camera start failed");
                Err(err)
            }
        }
    }

    /// Acquire and bind a stream. Equivalent to `begin_start` + backend
    /// acquisition + `finish_start`; event-driven callers that need stop to
    /// interleave with a pending acquisition use the split form directly.
    pub async fn start(&mut self) -> Result<(), CameraError> {
        let generation = self.begin_start()?;
        let grant = self.backend.acquire().await;
        self.finish_start(generation, grant)
    }

    /// Release any live stream and return to idle. Supersedes an in-flight
    /// start. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.generation.advance();
        if let Some(mut stream) = self.stream.take() {
            stream.detach();
            stream.release();
            debug!("camera stopped");
        }
        self.state = CameraState::Idle;
        self.ready = false;
    }

    /// The output surface reported usable frame dimensions. Ignored unless a
    /// live stream is still bound, so a late readiness signal cannot revive a
    /// stopped session.
    pub fn mark_ready(&mut self) {
        let has_size = self
            .stream
            .as_ref()
            .and_then(|s| s.frame_size())
            .is_some_and(|(w, h)| w > 0 && h > 0);
        if has_size {
            self.ready = true;
        }
    }

    /// Capture a still frame as a JPEG candidate image. The longer edge is
    /// capped at `MAX_CAPTURE_DIMENSION` preserving aspect ratio.
    pub fn capture_frame(&mut self) -> Result<CandidateImage, CameraError> {
        if self.state != CameraState::Active || !self.ready {
            return Err(CameraError::NotReady(
                "Camera is not ready yet. Please try again.",
            ));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or(CameraError::NotReady("Camera is not ready yet. Please try again."))?;
        let (source_width, source_height) = match stream.frame_size() {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(CameraError::NotReady(
                    "Camera is still starting. Please wait a moment.",
                ))
            }
        };

        let frame = stream.read_frame()?;
        if frame.width != source_width || frame.height != source_height {
            return Err(CameraError::Encode);
        }

        let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.pixels)
            .ok_or(CameraError::Encode)?;
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

        let (target_width, target_height) = scaled_dimensions(source_width, source_height);
        let scaled = if (target_width, target_height) == (source_width, source_height) {
            rgb
        } else {
            imageops::resize(&rgb, target_width, target_height, FilterType::Lanczos3)
        };

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&scaled)
            .map_err(|_| CameraError::Encode)?;

        Ok(CandidateImage {
            bytes,
            media_type: Some("image/jpeg".to_string()),
            file_name: Some(format!(
                "capture-{}.jpg",
                chrono::Utc::now().timestamp_millis()
            )),
            origin: ImageOrigin::Camera,
        })
    }

    /// Permanent teardown; any grant that arrives afterwards is discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.stop();
    }
}

impl<B: CameraBackend> Drop for CaptureDevice<B> {
    fn drop(&mut self) {
        // The hardware handle must never outlive its owner, error paths
        // included.
        self.close();
    }
}

/// `scale = min(1, cap / longer_edge)` applied to both edges, rounded, with
/// a floor of one pixel.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longer = width.max(height);
    let scale = f64::min(1.0, f64::from(MAX_CAPTURE_DIMENSION) / f64::from(longer));
    let target = |edge: u32| ((f64::from(edge) * scale).round() as u32).max(1);
    (target(width), target(height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeStream {
        size: Option<(u32, u32)>,
        released: Rc<Cell<usize>>,
        attached: Rc<Cell<bool>>,
    }

    impl CameraStream for FakeStream {
        fn attach(&mut self) -> Result<(), CameraError> {
            self.attached.set(true);
            Ok(())
        }

        fn detach(&mut self) {
            self.attached.set(false);
        }

        fn frame_size(&self) -> Option<(u32, u32)> {
            self.size
        }

        fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
            let (width, height) = self.size.ok_or(CameraError::Encode)?;
            Ok(RawFrame {
                width,
                height,
                pixels: vec![200u8; (width * height * 4) as usize],
            })
        }

        fn release(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    struct FakeBackend {
        grants: VecDeque<Result<FakeStream, CameraError>>,
    }

    impl CameraBackend for FakeBackend {
        type Stream = FakeStream;

        async fn acquire(&mut self) -> Result<FakeStream, CameraError> {
            self.grants
                .pop_front()
                .unwrap_or(Err(CameraError::Unavailable))
        }
    }

    fn stream(size: Option<(u32, u32)>) -> (FakeStream, Rc<Cell<usize>>) {
        let released = Rc::new(Cell::new(0));
        (
            FakeStream {
                size,
                released: released.clone(),
                attached: Rc::new(Cell::new(false)),
            },
            released,
        )
    }

    fn device_with(grants: Vec<Result<FakeStream, CameraError>>) -> CaptureDevice<FakeBackend> {
        CaptureDevice::new(FakeBackend {
            grants: grants.into(),
        })
    }

    #[tokio::test]
    async fn start_then_stop_round_trip() {
        let (s, released) = stream(Some((640, 480)));
        let mut device = device_with(vec![Ok(s)]);

        device.start().await.unwrap();
        assert_eq!(device.state(), CameraState::Active);
        device.mark_ready();
        assert!(device.is_ready());

        device.stop();
        assert_eq!(device.state(), CameraState::Idle);
        assert!(!device.is_ready());
        assert_eq!(released.get(), 1);

        // Idempotent.
        device.stop();
        assert_eq!(released.get(), 1);
    }

    #[tokio::test]
    async fn second_start_while_starting_is_rejected() {
        let (s, _released) = stream(Some((640, 480)));
        let mut device = device_with(vec![Ok(s)]);

        let generation = device.begin_start().unwrap();
        assert_eq!(device.begin_start().unwrap_err(), CameraError::AlreadyStarting);

        let grant = device.backend.acquire().await;
        device.finish_start(generation, grant).unwrap();
        assert_eq!(device.state(), CameraState::Active);
    }

    #[tokio::test]
    async fn stale_grant_is_released_and_reported_canceled() {
        let (first, first_released) = stream(Some((640, 480)));
        let (second, second_released) = stream(Some((640, 480)));
        let mut device = device_with(vec![Ok(first), Ok(second)]);

        let stale = device.begin_start().unwrap();
        let stale_grant = device.backend.acquire().await;

        // A stop supersedes the pending start, then a fresh start wins.
        device.stop();
        let current = device.begin_start().unwrap();
        let current_grant = device.backend.acquire().await;
        device.finish_start(current, current_grant).unwrap();

        // The slow first grant finally lands: released, not applied.
        assert_eq!(
            device.finish_start(stale, stale_grant).unwrap_err(),
            CameraError::Canceled
        );
        assert_eq!(device.state(), CameraState::Active);
        assert_eq!(first_released.get(), 1);
        assert_eq!(second_released.get(), 0);

        device.stop();
        assert_eq!(second_released.get(), 1);
    }

    #[tokio::test]
    async fn denial_returns_to_idle() {
        let mut device = device_with(vec![Err(CameraError::Denied(
            "Camera access was denied.".into(),
        ))]);
        let err = device.start().await.unwrap_err();
        assert_eq!(err, CameraError::Denied("Camera access was denied.".into()));
        assert_eq!(device.state(), CameraState::Idle);
    }

    #[tokio::test]
    async fn grant_after_close_is_released() {
        let (s, released) = stream(Some((640, 480)));
        let mut device = device_with(vec![Ok(s)]);

        let generation = device.begin_start().unwrap();
        let grant = device.backend.acquire().await;
        device.close();

        assert_eq!(
            device.finish_start(generation, grant).unwrap_err(),
            CameraError::Canceled
        );
        assert_eq!(released.get(), 1);
    }

    #[tokio::test]
    async fn late_readiness_after_stop_is_ignored() {
        let (s, _released) = stream(Some((640, 480)));
        let mut device = device_with(vec![Ok(s)]);
        device.start().await.unwrap();
        device.stop();
        device.mark_ready();
        assert!(!device.is_ready());
    }

    #[tokio::test]
    async fn capture_requires_readiness() {
        let (s, _released) = stream(Some((64, 48)));
        let mut device = device_with(vec![Ok(s)]);
        device.start().await.unwrap();

        let err = device.capture_frame().unwrap_err();
        assert_eq!(
            err,
            CameraError::NotReady("Camera is not ready yet. Please try again.")
        );

        device.mark_ready();
        let captured = device.capture_frame().unwrap();
        assert_eq!(captured.origin, ImageOrigin::Camera);
        assert_eq!(captured.media_type.as_deref(), Some("image/jpeg"));
        assert!(captured.file_name.unwrap().starts_with("capture-"));
        // JPEG SOI marker.
        assert_eq!(&captured.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn downscale_caps_longer_edge() {
        assert_eq!(scaled_dimensions(4000, 3000), (1920, 1440));
        assert_eq!(scaled_dimensions(3000, 4000), (1440, 1920));
        assert_eq!(scaled_dimensions(800, 600), (800, 600));
        assert_eq!(scaled_dimensions(1920, 1080), (1920, 1080));
    }

    #[test]
    fn drop_releases_the_stream() {
        let (s, released) = stream(Some((640, 480)));
        {
            let mut device = device_with(vec![]);
            device.state = CameraState::Active;
            device.stream = Some(s);
        }
        assert_eq!(released.get(), 1);
    }
}
