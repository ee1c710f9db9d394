use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::ExportError;
use crate::compressed::write_compressed_ply;
use crate::options::ViewerSettings;
use crate::sink::{MemorySink, SplatSink};
use crate::source::SplatSource;

const VIEWER_TEMPLATE: &str = include_str!("viewer_template.html");

/// Fill the viewer page with a base64 compressed PLY and the viewer settings.
pub fn render_viewer_html(
    splat_base64: &str,
    settings: &ViewerSettings,
) -> Result<String, ExportError> {
    let clear_color = settings
        .background
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let settings_json = serde_json::to_string(settings)?;

    Ok(VIEWER_TEMPLATE
        .replace("{{CLEAR_COLOR}}", &clear_color)
        .replace("{{SETTINGS}}", &settings_json)
        .replace("{{SPLAT_DATA}}", splat_base64))
}

/// Write a self-contained HTML viewer embedding the scene as a compressed PLY.
pub async fn write_viewer<S: SplatSink>(
    sources: &[SplatSource],
    settings: &ViewerSettings,
    sink: &mut S,
) -> Result<usize, ExportError> {
    let mut compressed = MemorySink::new();
    let count = write_compressed_ply(sources, &mut compressed).await?;

    let encoded = STANDARD.encode(&compressed.data);
    let html = render_viewer_html(&encoded, settings)?;
    log::info!(
        "Writing viewer page ({} bytes payload, {} bytes html)",
        compressed.data.len(),
        html.len()
    );

    sink.write(html.as_bytes(), true).await?;
    Ok(count)
}
