use byteorder::{LittleEndian, WriteBytesExt};

use crate::ExportError;
use crate::options::ExportOptions;
use crate::record::{SplatReader, SplatRecord};
use crate::sink::SplatSink;
use crate::source::{Column, INTERNAL_COLUMNS, SplatSource};

/// Splats per buffered block of the uncompressed writer.
pub const PLY_BLOCK_SPLATS: usize = 1024;

/// How one exported property is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputColumn {
    Known(Column),
    Rest { channel: usize, coeff: usize },
    Extra(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlyLayout {
    columns: Vec<(String, OutputColumn)>,
    rest_per_channel: usize,
}

impl PlyLayout {
    /// Properties shared by every source, in the first source's order.
    ///
    /// Rest SH is narrowed to the fewest bands any source carries and to
    /// `max_sh_bands`, and re-indexed to stay channel-major.
    fn new(sources: &[SplatSource], max_sh_bands: u32) -> Self {
        let Some(first) = sources.first() else {
            return Self {
                columns: Vec::new(),
                rest_per_channel: 0,
            };
        };

        let bands = sources
            .iter()
            .map(SplatSource::sh_bands)
            .min()
            .unwrap_or(0)
            .min(max_sh_bands);
        let rest_per_channel = splat_sh_utils::sh_coeffs_for_bands(bands) - 1;

        let mut columns = Vec::new();
        let mut rest_emitted = false;
        for name in first.column_names() {
            if INTERNAL_COLUMNS.contains(&name) {
                continue;
            }

            match Column::from_name(name) {
                Some(Column::FRest(_)) => {
                    if rest_emitted {
                        continue;
                    }
                    rest_emitted = true;
                    for channel in 0..3 {
                        for coeff in 0..rest_per_channel {
                            columns.push((
                                format!("f_rest_{}", channel * rest_per_channel + coeff),
                                OutputColumn::Rest { channel, coeff },
                            ));
                        }
                    }
                }
                known if sources.iter().all(|s| s.has_column(name)) => {
                    let column = known
                        .map_or_else(|| OutputColumn::Extra(name.to_owned()), OutputColumn::Known);
                    columns.push((name.to_owned(), column));
                }
                _ => {}
            }
        }

        Self {
            columns,
            rest_per_channel,
        }
    }

    fn header(&self, num_splats: usize) -> String {
        let mut header = String::from("ply\nformat binary_little_endian 1.0\n");
        header.push_str(&format!("element vertex {num_splats}\n"));
        for (name, _) in &self.columns {
            header.push_str(&format!("property float {name}\n"));
        }
        header.push_str("end_header\n");
        header
    }
}

fn known_value(record: &SplatRecord, column: Column) -> f32 {
    match column {
        Column::X => record.position.x,
        Column::Y => record.position.y,
        Column::Z => record.position.z,
        Column::Scale(i) => record.log_scale[i as usize],
        Column::Rot(0) => record.rotation.w,
        Column::Rot(1) => record.rotation.x,
        Column::Rot(2) => record.rotation.y,
        Column::Rot(_) => record.rotation.z,
        Column::FDc(i) => record.f_dc[i as usize],
        Column::Opacity => record.opacity,
        // Rest columns go through `OutputColumn::Rest`.
        Column::FRest(_) => 0.0,
    }
}

/// Write every live splat as a binary little-endian PLY of float properties.
///
/// Positions, rotations, scales and SH are written in export space; columns
/// the exporter doesn't know are copied through untouched. Returns the number
/// of vertices written.
pub async fn write_ply<S: SplatSink>(
    sources: &[SplatSource],
    options: &ExportOptions,
    sink: &mut S,
) -> Result<usize, ExportError> {
    let layout = PlyLayout::new(sources, options.max_sh_bands.min(3) as u32);
    let num_splats: usize = sources.iter().map(SplatSource::num_live).sum();

    log::info!(
        "Exporting {num_splats} splats to PLY with {} properties",
        layout.columns.len()
    );

    sink.write(layout.header(num_splats).as_bytes(), false).await?;

    let stride = layout.columns.len() * 4;
    let mut block = Vec::with_capacity(PLY_BLOCK_SPLATS * stride);
    let mut in_block = 0;

    for source in sources {
        let extras: Vec<Option<&[f32]>> = layout
            .columns
            .iter()
            .map(|(_, c)| match c {
                OutputColumn::Extra(name) => source.column(name),
                _ => None,
            })
            .collect();
        let mut reader = SplatReader::new(source, layout.rest_per_channel);

        for index in source.live_indices() {
            let record = reader.read(index);
            for ((_, column), extra) in layout.columns.iter().zip(&extras) {
                let value = match column {
                    OutputColumn::Known(c) => known_value(&record, *c),
                    OutputColumn::Rest { channel, coeff } => record.rest_channel(*channel)[*coeff],
                    OutputColumn::Extra(_) => extra.map_or(0.0, |e| e[index]),
                };
                block.write_f32::<LittleEndian>(value)?;
            }

            in_block += 1;
            if in_block == PLY_BLOCK_SPLATS {
                sink.write(&block, false).await?;
                block.clear();
                in_block = 0;
            }
        }
    }

    sink.write(&block, true).await?;
    log::info!("PLY export finished");
    Ok(num_splats)
}
