use byteorder::{ByteOrder, LittleEndian};
use splat_sh_utils::SH_C0;

use crate::ExportError;
use crate::chunk::sigmoid;
use crate::record::SplatReader;
use crate::sink::SplatSink;
use crate::source::SplatSource;

/// Bytes per splat in the compact format.
pub const SPLAT_RECORD_BYTES: usize = 32;

fn to_uint8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

/// Write every live splat as a header-less stream of 32-byte records:
/// position and scale as 3 floats each, RGBA as bytes, then the rotation as
/// `w, x, y, z` bytes biased by 128.
///
/// The world scale folded into each splat is the transform's X scale alone,
/// applied to all three axes.
pub async fn write_compact_splat<S: SplatSink>(
    sources: &[SplatSource],
    sink: &mut S,
) -> Result<usize, ExportError> {
    for source in sources.iter().filter(|s| s.num_live() > 0) {
        source.require_core_columns()?;
    }

    let num_splats: usize = sources.iter().map(SplatSource::num_live).sum();
    log::info!("Exporting {num_splats} splats to compact splat format");

    let mut data = vec![0u8; num_splats * SPLAT_RECORD_BYTES];
    let mut records = data.chunks_exact_mut(SPLAT_RECORD_BYTES);

    for source in sources {
        let mut reader = SplatReader::new(source, 0);
        for index in source.live_indices() {
            let record = reader.read(index);
            let world_scale = reader.transform(index).scale.x.abs();
            let raw = reader.raw_log_scale(index);
            let scale = [raw.x.exp(), raw.y.exp(), raw.z.exp()].map(|s| s * world_scale);

            let Some(out) = records.next() else {
                break;
            };
            LittleEndian::write_f32_into(&record.position.to_array(), &mut out[0..12]);
            LittleEndian::write_f32_into(&scale, &mut out[12..24]);

            for c in 0..3 {
                out[24 + c] = to_uint8((0.5 + SH_C0 * record.f_dc[c]) * 255.0);
            }
            out[27] = to_uint8(sigmoid(record.opacity) * 255.0);

            let q = record.rotation;
            for (i, v) in [q.w, q.x, q.y, q.z].into_iter().enumerate() {
                out[28 + i] = to_uint8(v * 128.0 + 128.0);
            }
        }
    }

    sink.write(&data, true).await?;
    log::info!("Compact splat export finished ({} bytes)", data.len());
    Ok(num_splats)
}
