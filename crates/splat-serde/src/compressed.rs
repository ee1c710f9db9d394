use byteorder::{ByteOrder, LittleEndian};

use crate::ExportError;
use crate::chunk::{CHUNK_SIZE, Chunk};
use crate::morton::{collect_indices, morton_sort};
use crate::record::SplatReader;
use crate::sink::SplatSink;
use crate::source::SplatSource;

/// Bytes of one chunk header: 12 floats.
pub const CHUNK_HEADER_BYTES: usize = 12 * 4;
/// Bytes of one vertex: 4 packed `u32`s.
pub const VERTEX_BYTES: usize = 4 * 4;

const CHUNK_PROPERTIES: [&str; 12] = [
    "min_x",
    "min_y",
    "min_z",
    "max_x",
    "max_y",
    "max_z",
    "min_scale_x",
    "min_scale_y",
    "min_scale_z",
    "max_scale_x",
    "max_scale_y",
    "max_scale_z",
];

const VERTEX_PROPERTIES: [&str; 4] = [
    "packed_position",
    "packed_rotation",
    "packed_scale",
    "packed_color",
];

fn compressed_header(num_chunks: usize, num_splats: usize) -> String {
    let mut header = String::from("ply\nformat binary_little_endian 1.0\n");
    header.push_str(&format!("element chunk {num_chunks}\n"));
    for name in CHUNK_PROPERTIES {
        header.push_str(&format!("property float {name}\n"));
    }
    header.push_str(&format!("element vertex {num_splats}\n"));
    for name in VERTEX_PROPERTIES {
        header.push_str(&format!("property uint {name}\n"));
    }
    header.push_str("end_header\n");
    header
}

/// Write every live splat as a chunked, quantized PLY.
///
/// Splats are Morton-sorted by world-space center, then packed 256 to a chunk.
/// The whole file is assembled in memory and handed to the sink in one final
/// write. Fails with [`ExportError::NothingToExport`] before writing anything
/// when there are no live splats.
pub async fn write_compressed_ply<S: SplatSink>(
    sources: &[SplatSource],
    sink: &mut S,
) -> Result<usize, ExportError> {
    let mut indices = collect_indices(sources);
    if indices.is_empty() {
        log::warn!("Compressed export skipped: no splats to export");
        return Err(ExportError::NothingToExport);
    }

    for source in sources.iter().filter(|s| s.num_live() > 0) {
        source.require_core_columns()?;
    }

    let num_splats = indices.len();
    let num_chunks = num_splats.div_ceil(CHUNK_SIZE);
    log::info!("Exporting {num_splats} splats to compressed PLY in {num_chunks} chunks");

    let mut readers: Vec<SplatReader<'_>> =
        sources.iter().map(|s| SplatReader::new(s, 0)).collect();

    let centers: Vec<_> = indices
        .iter()
        .map(|idx| readers[idx.source_index].position(idx.local_index))
        .collect();
    morton_sort(&mut indices, &centers);

    let header = compressed_header(num_chunks, num_splats);
    let chunk_offset = header.len();
    let vertex_offset = chunk_offset + num_chunks * CHUNK_HEADER_BYTES;
    let mut data = vec![0u8; vertex_offset + num_splats * VERTEX_BYTES];
    data[..chunk_offset].copy_from_slice(header.as_bytes());

    let span = tracing::trace_span!("pack_chunks", num_chunks).entered();
    let mut chunk = Chunk::new();
    for (c, block) in indices.chunks(CHUNK_SIZE).enumerate() {
        for (slot, idx) in block.iter().enumerate() {
            let record = readers[idx.source_index].read(idx.local_index);
            chunk.set(slot, &record);
        }
        let bounds = chunk.pack(block.len());

        let offset = chunk_offset + c * CHUNK_HEADER_BYTES;
        LittleEndian::write_f32_into(
            &bounds.to_floats(),
            &mut data[offset..offset + CHUNK_HEADER_BYTES],
        );

        for slot in 0..block.len() {
            let offset = vertex_offset + (c * CHUNK_SIZE + slot) * VERTEX_BYTES;
            let vertex = [
                chunk.packed_position[slot],
                chunk.packed_rotation[slot],
                chunk.packed_scale[slot],
                chunk.packed_color[slot],
            ];
            LittleEndian::write_u32_into(&vertex, &mut data[offset..offset + VERTEX_BYTES]);
        }
        log::debug!("Packed chunk {}/{num_chunks}", c + 1);
    }
    drop(span);

    sink.write(&data, true).await?;
    log::info!("Compressed PLY export finished ({} bytes)", data.len());
    Ok(num_splats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkBounds, unpack_111011, unpack_8888, unpack_rotation};
    use crate::sink::MemorySink;
    use crate::source::state;
    use crate::test_utils::{create_test_source, split_header};
    use crate::transform_cache::LOAD_TIME_AXIS_CORRECTION;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec3};

    struct Decoded {
        chunks: Vec<ChunkBounds>,
        vertices: Vec<[u32; 4]>,
    }

    fn decode(data: &[u8]) -> Decoded {
        let (header, body) = split_header(data);
        let count = |element: &str| -> usize {
            header
                .lines()
                .find_map(|l| l.strip_prefix(&format!("element {element} ")))
                .and_then(|n| n.parse().ok())
                .unwrap()
        };
        let (num_chunks, num_splats) = (count("chunk"), count("vertex"));
        assert_eq!(body.len(), num_chunks * CHUNK_HEADER_BYTES + num_splats * VERTEX_BYTES);

        let chunks = body[..num_chunks * CHUNK_HEADER_BYTES]
            .chunks_exact(CHUNK_HEADER_BYTES)
            .map(|b| {
                let mut floats = [0.0; 12];
                LittleEndian::read_f32_into(b, &mut floats);
                ChunkBounds::from_floats(&floats)
            })
            .collect();
        let vertices = body[num_chunks * CHUNK_HEADER_BYTES..]
            .chunks_exact(VERTEX_BYTES)
            .map(|b| {
                let mut v = [0u32; 4];
                LittleEndian::read_u32_into(b, &mut v);
                v
            })
            .collect();
        Decoded { chunks, vertices }
    }

    fn position_of(decoded: &Decoded, vertex: usize) -> Vec3 {
        let bounds = decoded.chunks[vertex / CHUNK_SIZE];
        let t = unpack_111011(decoded.vertices[vertex][0]);
        bounds.min + t * (bounds.max - bounds.min)
    }

    #[tokio::test]
    async fn test_empty_export_writes_nothing() {
        let mut sink = MemorySink::new();
        let err = write_compressed_ply(&[], &mut sink).await.unwrap_err();
        assert!(matches!(err, ExportError::NothingToExport));

        let deleted = create_test_source(0, 3)
            .with_state(vec![state::DELETED; 3])
            .unwrap();
        let err = write_compressed_ply(&[deleted], &mut sink).await.unwrap_err();
        assert!(matches!(err, ExportError::NothingToExport));
        assert_eq!(sink.writes, 0);
        assert!(sink.data.is_empty());
    }

    #[tokio::test]
    async fn test_missing_core_column() {
        let source = SplatSource::new(1).with_column("x", vec![0.0]).unwrap();
        let mut sink = MemorySink::new();
        let err = write_compressed_ply(&[source], &mut sink).await.unwrap_err();
        assert!(matches!(err, ExportError::MissingColumn(_)));
        assert_eq!(sink.writes, 0);
    }

    #[tokio::test]
    async fn test_layout_and_single_write() {
        let count = CHUNK_SIZE + 10;
        let mut sink = MemorySink::new();
        let written = write_compressed_ply(&[create_test_source(0, count)], &mut sink)
            .await
            .unwrap();
        assert_eq!(written, count);
        assert_eq!(sink.writes, 1);
        assert!(sink.finished);

        let (header, _) = split_header(&sink.data);
        let expected: String = [
            "ply",
            "format binary_little_endian 1.0",
            "element chunk 2",
            "property float min_x",
            "property float min_y",
            "property float min_z",
            "property float max_x",
            "property float max_y",
            "property float max_z",
            "property float min_scale_x",
            "property float min_scale_y",
            "property float min_scale_z",
            "property float max_scale_x",
            "property float max_scale_y",
            "property float max_scale_z",
            format!("element vertex {count}").as_str(),
            "property uint packed_position",
            "property uint packed_rotation",
            "property uint packed_scale",
            "property uint packed_color",
            "end_header",
        ]
        .iter()
        .map(|l| format!("{l}\n"))
        .collect();
        assert_eq!(header, expected);

        let decoded = decode(&sink.data);
        assert_eq!(decoded.chunks.len(), 2);
        assert_eq!(decoded.vertices.len(), count);
    }

    #[tokio::test]
    async fn test_deleted_splats_skipped() {
        let source = create_test_source(0, 5)
            .with_state(vec![0, state::DELETED, 0, 0, state::DELETED])
            .unwrap();
        let mut sink = MemorySink::new();
        let written = write_compressed_ply(&[source], &mut sink).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(decode(&sink.data).vertices.len(), 3);
    }

    #[tokio::test]
    async fn test_positions_survive_quantization() {
        let source = create_test_source(0, 40).with_world_transform(LOAD_TIME_AXIS_CORRECTION);
        let mut sink = MemorySink::new();
        write_compressed_ply(&[source.clone()], &mut sink).await.unwrap();
        let decoded = decode(&sink.data);

        let bounds = decoded.chunks[0];
        assert_eq!(bounds.min, Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(bounds.max, Vec3::new(39.0, 40.0, 41.0));

        // Splats lie on a diagonal, so Morton order keeps them sorted.
        let xs: Vec<f32> = (0..40).map(|i| position_of(&decoded, i).x).collect();
        for pair in xs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for (i, x) in xs.iter().enumerate() {
            assert!((x - i as f32).abs() <= 39.0 / 2047.0);
        }
    }

    #[tokio::test]
    async fn test_morton_order_across_sources() {
        let splat_at = |x: f32| {
            SplatSource::from_raw(
                &[x, 0.0, 0.0],
                &[1.0, 0.0, 0.0, 0.0],
                &[0.0; 3],
                &[0.0; 3],
                &[0.0],
            )
            .unwrap()
            .with_world_transform(LOAD_TIME_AXIS_CORRECTION)
        };

        let mut sink = MemorySink::new();
        write_compressed_ply(&[splat_at(5.0), splat_at(-5.0), splat_at(0.0)], &mut sink)
            .await
            .unwrap();
        let decoded = decode(&sink.data);
        let xs: Vec<f32> = (0..3).map(|i| position_of(&decoded, i).x).collect();
        for (x, expected) in xs.iter().zip([-5.0, 0.0, 5.0]) {
            assert_relative_eq!(*x, expected, epsilon = 10.0 / 2047.0);
        }
    }

    #[tokio::test]
    async fn test_rotation_color_and_scale() {
        let turn = Quat::from_rotation_x(0.7);
        let source = SplatSource::from_raw(
            &[0.0; 3],
            &[turn.w, turn.x, turn.y, turn.z],
            &[1.0f32.ln(), 2.0f32.ln(), 3.0f32.ln()],
            &[0.0; 3],
            &[0.0],
        )
        .unwrap()
        .with_world_transform(LOAD_TIME_AXIS_CORRECTION);

        let mut sink = MemorySink::new();
        write_compressed_ply(&[source], &mut sink).await.unwrap();
        let decoded = decode(&sink.data);

        let [_, rotation, _, color] = decoded.vertices[0];
        let q = unpack_rotation(rotation);
        assert!(q.abs_diff_eq(turn, 3e-3) || q.abs_diff_eq(-turn, 3e-3));

        let bounds = decoded.chunks[0];
        assert_relative_eq!(bounds.min_scale.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.min_scale.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.max_scale.z, 3.0, epsilon = 1e-5);

        let rgba = unpack_8888(color);
        assert_relative_eq!(rgba.x, 128.0 / 255.0);
        assert_relative_eq!(rgba.w, 128.0 / 255.0);
    }

    #[tokio::test]
    async fn test_final_write_error_propagates() {
        let mut sink = crate::test_utils::FailingSink::after(0);
        let err = write_compressed_ply(&[create_test_source(0, 300)], &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        assert_eq!(sink.writes, 1);
    }
}
