pub mod config;

use std::path::PathBuf;

use anyhow::Context;
use splat_serde::{
    ExportError, FileSink, SplatSource, write_compact_splat, write_compressed_ply, write_ply,
    write_viewer,
};

pub use config::{ExportConfig, ExportFormat};

/// Export `sources` to `export_path/export_name` and return the written path.
pub async fn export_to_path(
    sources: &[SplatSource],
    config: &ExportConfig,
) -> anyhow::Result<PathBuf> {
    let format = config.format()?;
    let export_dir = PathBuf::from(&config.export_path);
    let path = export_dir.join(&config.export_name);

    // Refuse before a file exists rather than leave an empty one behind.
    if format.requires_splats() && sources.iter().all(|s| s.num_live() == 0) {
        return Err(ExportError::NothingToExport)
            .with_context(|| format!("Exporting {}", path.display()));
    }

    tokio::fs::create_dir_all(&export_dir)
        .await
        .with_context(|| format!("Creating export directory {}", export_dir.display()))?;

    log::info!("Exporting {} sources as {format:?} to {}", sources.len(), path.display());

    let mut sink = FileSink::create(&path)
        .await
        .with_context(|| format!("Creating export file {}", path.display()))?;

    let options = config.export_options();
    let count = match format {
        ExportFormat::Ply => write_ply(sources, &options, &mut sink).await,
        ExportFormat::CompressedPly => write_compressed_ply(sources, &mut sink).await,
        ExportFormat::Splat => write_compact_splat(sources, &mut sink).await,
        ExportFormat::Html => write_viewer(sources, &options.viewer, &mut sink).await,
    }
    .with_context(|| format!("Failed to export {format:?} to {}", path.display()))?;

    log::info!("Exported {count} splats to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_scene(count: usize) -> Vec<SplatSource> {
        let means: Vec<f32> = (0..count * 3).map(|i| i as f32 * 0.1).collect();
        let rotations: Vec<f32> = (0..count).flat_map(|_| [1.0, 0.0, 0.0, 0.0]).collect();
        let source = SplatSource::from_raw(
            &means,
            &rotations,
            &vec![0.0; count * 3],
            &vec![0.0; count * 3],
            &vec![0.0; count],
        )
        .unwrap();
        vec![source]
    }

    fn temp_config(name: &str, export_name: &str) -> ExportConfig {
        let dir = std::env::temp_dir().join(format!("splat-process-{name}-{}", std::process::id()));
        ExportConfig {
            export_path: dir.to_string_lossy().into_owned(),
            export_name: export_name.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_export_every_format() {
        let scene = test_scene(300);
        let cases = [
            ("scene.ply", b"ply\n".as_slice()),
            ("scene.compressed.ply", b"ply\n".as_slice()),
            ("scene.html", b"<!DOCTYPE html>".as_slice()),
        ];

        for (name, magic) in cases {
            let config = temp_config("formats", name);
            let path = export_to_path(&scene, &config).await.unwrap();
            let data = tokio::fs::read(&path).await.unwrap();
            assert!(data.starts_with(magic), "{name}");
            tokio::fs::remove_file(&path).await.unwrap();
        }

        let config = temp_config("formats", "scene.splat");
        let path = export_to_path(&scene, &config).await.unwrap();
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 300 * 32);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_nothing_to_export_leaves_no_file() {
        let config = temp_config("empty", "empty.compressed.ply");
        let err = export_to_path(&[], &config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExportError>(),
            Some(ExportError::NothingToExport)
        ));
        let path = PathBuf::from(&config.export_path).join(&config.export_name);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unknown_extension_is_an_error() {
        let config = temp_config("unknown", "scene.bin");
        assert!(export_to_path(&test_scene(1), &config).await.is_err());
    }
}
