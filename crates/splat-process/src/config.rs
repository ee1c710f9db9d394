use std::path::Path;

use clap::{Args, Parser, ValueEnum};
use splat_serde::{CameraPose, ExportOptions, ViewerSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Uncompressed float PLY.
    Ply,
    /// Chunked, quantized PLY.
    CompressedPly,
    /// Fixed 32-byte records.
    Splat,
    /// Self-contained HTML viewer.
    Html,
}

impl ExportFormat {
    /// Pick a format from a file name, checking `.compressed.ply` before `.ply`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".compressed.ply") {
            Some(Self::CompressedPly)
        } else if name.ends_with(".ply") {
            Some(Self::Ply)
        } else if name.ends_with(".splat") {
            Some(Self::Splat)
        } else if name.ends_with(".html") {
            Some(Self::Html)
        } else {
            None
        }
    }

    /// Whether an export with no live splats is refused.
    pub fn requires_splats(self) -> bool {
        matches!(self, Self::CompressedPly | Self::Html)
    }
}

fn parse_color(value: &str) -> Result<[f32; 4], String> {
    let parts = value
        .split(',')
        .map(|p| {
            let v = p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}"))?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(format!("'{p}' is not a finite number"))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 1.0]),
        [r, g, b, a] => Ok([*r, *g, *b, *a]),
        _ => Err(format!("expected 3 or 4 comma separated values, got {}", parts.len())),
    }
}

#[derive(Clone, Debug, Args)]
pub struct ExportConfig {
    /// Directory to put exported files in.
    ///
    /// This path can be set as a relative path.
    #[arg(long, help_heading = "Export options", default_value = "./")]
    pub export_path: String,
    /// Filename of the export. The extension picks the format unless --format is given.
    #[arg(
        long,
        help_heading = "Export options",
        default_value = "export.compressed.ply"
    )]
    pub export_name: String,
    /// Force an export format regardless of the file extension.
    #[arg(long, help_heading = "Export options", value_enum)]
    pub format: Option<ExportFormat>,
    /// Highest SH band kept in uncompressed PLY exports.
    #[arg(
        long,
        help_heading = "Export options",
        default_value = "3",
        value_parser = clap::value_parser!(u8).range(0..=3)
    )]
    pub max_sh_bands: u8,
    /// Viewer background as r,g,b[,a] in 0..1.
    #[arg(long, help_heading = "Export options", default_value = "0,0,0,1", value_parser = parse_color)]
    pub background: [f32; 4],
    /// Viewer vertical field of view in degrees.
    #[arg(long, help_heading = "Export options", default_value = "50")]
    pub fov: f32,
}

#[derive(Parser)]
struct ExportCli {
    #[clap(flatten)]
    export: ExportConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportCli::parse_from([""]).export
    }
}

impl ExportConfig {
    pub fn format(&self) -> anyhow::Result<ExportFormat> {
        self.format
            .or_else(|| ExportFormat::from_path(Path::new(&self.export_name)))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Can't tell the export format of '{}', pass --format",
                    self.export_name
                )
            })
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            max_sh_bands: self.max_sh_bands,
            viewer: ViewerSettings {
                background: self.background,
                camera: CameraPose {
                    fov: self.fov,
                    ..Default::default()
                },
                animation: None,
            },
        }
    }
}
