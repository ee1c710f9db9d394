pub mod chunk;
pub mod compact;
pub mod compressed;
pub mod error;
pub mod morton;
pub mod options;
pub mod ply;
pub mod record;
pub mod sink;
pub mod source;
pub mod tint;
pub mod transform_cache;
pub mod viewer;

// Re-export main functionality
pub use compact::write_compact_splat;
pub use compressed::write_compressed_ply;
pub use error::ExportError;
pub use options::{AnimTrack, CameraKeyframe, CameraPose, ExportOptions, ViewerSettings};
pub use ply::write_ply;
pub use sink::{FileSink, MemorySink, SplatSink};
pub use source::{Column, SplatSource, TransformPalette, state};
pub use tint::ColorAdjustment;
pub use transform_cache::{LOAD_TIME_AXIS_CORRECTION, TransformCache};
pub use viewer::{render_viewer_html, write_viewer};

pub async fn serialize_ply_to_vec(
    sources: &[SplatSource],
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut sink = MemorySink::new();
    write_ply(sources, options, &mut sink).await?;
    Ok(sink.into_inner())
}

pub async fn serialize_compressed_ply_to_vec(
    sources: &[SplatSource],
) -> Result<Vec<u8>, ExportError> {
    let mut sink = MemorySink::new();
    write_compressed_ply(sources, &mut sink).await?;
    Ok(sink.into_inner())
}

pub async fn serialize_compact_splat_to_vec(
    sources: &[SplatSource],
) -> Result<Vec<u8>, ExportError> {
    let mut sink = MemorySink::new();
    write_compact_splat(sources, &mut sink).await?;
    Ok(sink.into_inner())
}

pub async fn serialize_viewer_to_vec(
    sources: &[SplatSource],
    settings: &ViewerSettings,
) -> Result<Vec<u8>, ExportError> {
    let mut sink = MemorySink::new();
    write_viewer(sources, settings, &mut sink).await?;
    Ok(sink.into_inner())
}
