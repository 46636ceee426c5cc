pub mod camera;
pub mod encoder;
mod glyphs;
pub mod overlay;
pub mod raster;
pub mod rgba_converter;

// Re-exports for convenience
pub use camera::FrameSource;
pub use encoder::FrameEncoder;
pub use overlay::{HAND_CONNECTIONS, OverlayRenderer, RenderOutcome, Surface};
pub use raster::RasterSurface;
