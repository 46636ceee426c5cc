use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::{error::CaptureError, types::Frame};

/// Produces raw frames on demand. Implementations must not block on the network.
pub trait FrameSource: Send + 'static {
    fn grab_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Hands a frame to a one-slot channel, evicting whatever the consumer has not
/// picked up yet so the slot always holds the newest frame.
pub(crate) fn offer_latest(tx: &Sender<Frame>, evict_rx: &Receiver<Frame>, frame: Frame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            let _ = evict_rx.try_recv();
            tx.try_send(frame).is_ok()
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Takes the newest frame without waiting.
pub(crate) fn take_latest(frame_rx: &Receiver<Frame>) -> Result<Frame, CaptureError> {
    let mut frame = match frame_rx.try_recv() {
        Ok(frame) => frame,
        Err(TryRecvError::Empty) => return Err(CaptureError::NoFrameYet),
        Err(TryRecvError::Disconnected) => return Err(CaptureError::StreamStopped),
    };
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Ok(frame)
}

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraDevice, CameraStream, available_cameras, open_camera};

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Instant,
    };

    use anyhow::{Result, anyhow};
    use crossbeam_channel::{Receiver, bounded};
    use nokhwa::{
        Buffer, Camera, query,
        utils::{
            ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType, Resolution,
        },
    };

    use super::{FrameSource, offer_latest, take_latest};
    use crate::{
        config::CameraConfig,
        error::CaptureError,
        pipeline::rgba_converter::{self, PixelLayout},
        types::Frame,
    };

    // macOS built-in cameras often reject YUYV even though it is reported, so
    // RGB-like formats come first.
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats(config: &CameraConfig) -> [RequestedFormat<'static>; 3] {
        let ideal = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        [
            RequestedFormat::with_formats(
                RequestedFormatType::Closest(ideal),
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<nokhwa::pixel_format::RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: u32,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .iter()
            .filter_map(|info| {
                let index = info.index().as_index().ok()?;
                Some(CameraDevice {
                    index,
                    label: format_camera_label(info),
                })
            })
            .collect())
    }

    fn format_camera_label(info: &CameraInfo) -> String {
        info.human_name()
    }

    fn build_camera(config: &CameraConfig) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats(config) {
            match Camera::new(CameraIndex::Index(config.index), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    fn layout_of(format: FrameFormat) -> PixelLayout {
        match format {
            FrameFormat::NV12 => PixelLayout::Nv12,
            FrameFormat::YUYV => PixelLayout::Yuyv,
            FrameFormat::MJPEG => PixelLayout::Mjpeg,
            FrameFormat::RAWRGB => PixelLayout::Rgb,
            FrameFormat::RAWBGR => PixelLayout::Bgr,
            FrameFormat::GRAY => PixelLayout::Gray,
        }
    }

    fn convert(buffer: &Buffer) -> Result<Frame> {
        let resolution = buffer.resolution();
        rgba_converter::to_frame(
            layout_of(buffer.source_frame_format()),
            buffer.buffer(),
            resolution.width_x,
            resolution.height_y,
        )
    }

    /// Owns the camera thread. Dropping it stops capture and releases the device.
    #[derive(Debug)]
    pub struct CameraStream {
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
        frame_rx: Receiver<Frame>,
    }

    impl CameraStream {
        fn halt(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    impl Drop for CameraStream {
        fn drop(&mut self) {
            self.halt();
        }
    }

    impl FrameSource for CameraStream {
        fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
            take_latest(&self.frame_rx)
        }
    }

    /// Opens the camera on its own thread and waits for it to report readiness.
    pub fn open_camera(config: &CameraConfig) -> Result<CameraStream> {
        let index = config.index;
        let config = config.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let evict_rx = frame_rx.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u32), String>>(1);

        let handle = thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || {
                let mut camera = match build_camera(&config) {
                    Ok(cam) => cam,
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };
                let resolution = camera.resolution();
                let _ = ready_tx.send(Ok((resolution.width_x, resolution.height_y)));

                while !stop_flag.load(Ordering::Relaxed) {
                    let frame_start = Instant::now();
                    let buffer = match camera.frame() {
                        Ok(buffer) => buffer,
                        Err(err) => {
                            log::warn!(
                                "camera frame read failed (after {:?}): {err:?}",
                                frame_start.elapsed()
                            );
                            continue;
                        }
                    };

                    let frame = match convert(&buffer) {
                        Ok(frame) => frame,
                        Err(err) => {
                            log::warn!("failed to decode camera frame: {err:?}");
                            continue;
                        }
                    };

                    if !offer_latest(&frame_tx, &evict_rx, frame) {
                        break;
                    }
                }

                if let Err(err) = camera.stop_stream() {
                    log::debug!("camera stop_stream failed: {err:?}");
                }
            })?;

        let mut stream = CameraStream {
            stop,
            handle: Some(handle),
            frame_rx,
        };

        match ready_rx.recv() {
            Ok(Ok((width, height))) => {
                log::info!("camera {index} streaming at {width}x{height}");
                Ok(stream)
            }
            Ok(Err(reason)) => {
                stream.halt();
                Err(anyhow!(reason))
            }
            Err(_) => {
                stream.halt();
                Err(anyhow!("camera thread exited before reporting readiness"))
            }
        }
    }
}
