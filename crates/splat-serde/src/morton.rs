use glam::Vec3;

use crate::source::SplatSource;

/// One live splat in the flattened, cross-source export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedIndex {
    pub source_index: usize,
    pub local_index: usize,
    /// Position in the unsorted enumeration, used to look up its center.
    pub global_index: usize,
}

/// Every live splat of every source, source by source in storage order.
pub fn collect_indices(sources: &[SplatSource]) -> Vec<CompressedIndex> {
    sources
        .iter()
        .enumerate()
        .flat_map(|(source_index, source)| {
            source
                .live_indices()
                .map(move |local_index| (source_index, local_index))
        })
        .enumerate()
        .map(|(global_index, (source_index, local_index))| CompressedIndex {
            source_index,
            local_index,
            global_index,
        })
        .collect()
}

/// Spread the low 10 bits of `x` so two zero bits sit between each.
pub fn part1_by2(x: u32) -> u32 {
    let mut x = x & 0x0000_03ff;
    x = (x ^ (x << 16)) & 0xff00_00ff;
    x = (x ^ (x << 8)) & 0x0300_f00f;
    x = (x ^ (x << 4)) & 0x030c_30c3;
    x = (x ^ (x << 2)) & 0x0924_9249;
    x
}

/// Interleave three 10-bit coordinates into a 30-bit Morton code, x in the lowest bit.
pub fn encode_morton3(x: u32, y: u32, z: u32) -> u32 {
    (part1_by2(z) << 2) + (part1_by2(y) << 1) + part1_by2(x)
}

fn grid_coord(v: f32, min: f32, extent: f32) -> u32 {
    if extent <= 0.0 {
        return 0;
    }
    ((1024.0 * (v - min) / extent).floor() as u32).min(1023)
}

/// Stable-sort `indices` by the Morton code of their centers.
///
/// `centers` is indexed by [`CompressedIndex::global_index`].
pub fn morton_sort(indices: &mut [CompressedIndex], centers: &[Vec3]) {
    let _span = tracing::trace_span!("morton_sort", count = indices.len()).entered();

    if indices.is_empty() {
        return;
    }

    let (min, max) = indices.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), idx| {
            let c = centers[idx.global_index];
            (min.min(c), max.max(c))
        },
    );
    let extent = max - min;

    indices.sort_by_key(|idx| {
        let c = centers[idx.global_index];
        encode_morton3(
            grid_coord(c.x, min.x, extent.x),
            grid_coord(c.y, min.y, extent.y),
            grid_coord(c.z, min.z, extent.z),
        )
    });
}
