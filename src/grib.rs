use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;

use crate::decode::{GridDecoder, GridSet, GridVariable};

/// Production decoder for the MRMS reflectivity artifact: a single GRIB2
/// message on a regular lat/lon grid (template 3.0) with PNG-packed data
/// (template 5.41), the packing NOAA ships this product with.
pub struct GribDecoder;

impl GridDecoder for GribDecoder {
    fn decode(&self, path: &Path) -> Result<GridSet> {
        let buffer =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        parse_message(&buffer)
    }
}

#[derive(Clone, Copy, Debug)]
struct GridDef {
    nx: u32,
    ny: u32,
    la1_deg: f64,
    lo1_deg: f64,
    lat_step_deg: f64,
    lon_step_deg: f64,
}

#[derive(Clone, Copy, Debug)]
struct Packing {
    reference_value: f64,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    data_point_count: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct ProductIdentity {
    discipline: u8,
    category: u8,
    number: u8,
}

enum PackedValues {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PackedValues {
    fn len(&self) -> usize {
        match self {
            Self::U8(values) => values.len(),
            Self::U16(values) => values.len(),
        }
    }

    fn at(&self, index: usize) -> Option<u32> {
        match self {
            Self::U8(values) => values.get(index).copied().map(u32::from),
            Self::U16(values) => values.get(index).copied().map(u32::from),
        }
    }
}

fn parse_message(buffer: &[u8]) -> Result<GridSet> {
    if buffer.len() < 20 {
        bail!("GRIB payload is too small");
    }
    if &buffer[0..4] != b"GRIB" {
        bail!("Payload does not start with GRIB bytes");
    }
    let discipline = buffer[6];
    if buffer[7] != 2 {
        bail!("Unsupported GRIB edition {}", buffer[7]);
    }

    let mut pointer = 16_usize;
    let mut reference_time = None;
    let mut identity = ProductIdentity {
        discipline,
        ..Default::default()
    };
    let mut grid: Option<GridDef> = None;
    let mut packing: Option<Packing> = None;
    let mut bitmap_indicator: u8 = 255;
    let mut section7_data: Option<&[u8]> = None;

    while pointer + 5 <= buffer.len() {
        if &buffer[pointer..pointer + 4] == b"7777" {
            break;
        }

        let section_length = read_u32_be(buffer, pointer)? as usize;
        let section_number = *buffer
            .get(pointer + 4)
            .ok_or_else(|| anyhow!("Invalid GRIB section header"))?;

        if section_length < 5 || pointer + section_length > buffer.len() {
            bail!("Invalid GRIB section length {section_length} at offset {pointer}");
        }

        match section_number {
            1 => {
                let year = read_u16_be(buffer, pointer + 12)? as i32;
                let month = u32::from(buffer[pointer + 14]);
                let day = u32::from(buffer[pointer + 15]);
                let hour = u32::from(buffer[pointer + 16]);
                let minute = u32::from(buffer[pointer + 17]);
                let second = u32::from(buffer[pointer + 18]);
                // A nonsensical reference time degrades to "no timestamp"
                // rather than failing the whole decode.
                reference_time = Utc
                    .with_ymd_and_hms(year, month, day, hour, minute, second)
                    .single();
            }
            3 => {
                let template_number = read_u16_be(buffer, pointer + 12)?;
                if template_number != 0 {
                    bail!("Unsupported grid template {template_number}");
                }

                let nx = read_u32_be(buffer, pointer + 30)?;
                let ny = read_u32_be(buffer, pointer + 34)?;
                let la1_deg = read_grib_signed_scaled_int32(buffer, pointer + 46)?;
                let lo1_deg = read_grib_signed_scaled_int32(buffer, pointer + 50)?;
                let di_deg = read_u32_be(buffer, pointer + 63)? as f64 / 1_000_000.0;
                let dj_deg = read_u32_be(buffer, pointer + 67)? as f64 / 1_000_000.0;
                let scanning_mode = *buffer
                    .get(pointer + 71)
                    .ok_or_else(|| anyhow!("Missing scanning mode byte"))?;

                let lat_step_deg = if scanning_mode & 0x40 == 0 {
                    -dj_deg.abs()
                } else {
                    dj_deg.abs()
                };
                let lon_step_deg = if scanning_mode & 0x80 == 0 {
                    di_deg.abs()
                } else {
                    -di_deg.abs()
                };

                grid = Some(GridDef {
                    nx,
                    ny,
                    la1_deg,
                    lo1_deg,
                    lat_step_deg,
                    lon_step_deg,
                });
            }
            4 => {
                identity.category = *buffer
                    .get(pointer + 9)
                    .ok_or_else(|| anyhow!("Missing parameter category byte"))?;
                identity.number = *buffer
                    .get(pointer + 10)
                    .ok_or_else(|| anyhow!("Missing parameter number byte"))?;
            }
            5 => {
                let template_number = read_u16_be(buffer, pointer + 9)?;
                if template_number != 41 {
                    bail!("Unsupported data template {template_number}");
                }

                let data_point_count = read_u32_be(buffer, pointer + 5)? as usize;
                let reference_value = read_f32_be(buffer, pointer + 11)? as f64;
                let binary_scale_factor = read_i16_be(buffer, pointer + 15)?;
                let decimal_scale_factor = read_i16_be(buffer, pointer + 17)?;

                packing = Some(Packing {
                    reference_value,
                    binary_scale_factor,
                    decimal_scale_factor,
                    data_point_count,
                });
            }
            6 => {
                bitmap_indicator = *buffer
                    .get(pointer + 5)
                    .ok_or_else(|| anyhow!("Missing bitmap indicator byte"))?;
            }
            7 => {
                section7_data = Some(&buffer[pointer + 5..pointer + section_length]);
            }
            _ => {}
        }

        pointer += section_length;
    }

    let grid = grid.ok_or_else(|| anyhow!("GRIB section 3 missing"))?;
    let packing = packing.ok_or_else(|| anyhow!("GRIB section 5 missing"))?;
    let section7_data = section7_data.ok_or_else(|| anyhow!("GRIB section 7 missing"))?;

    if bitmap_indicator != 255 {
        bail!("Unsupported bitmap indicator {bitmap_indicator}");
    }

    let packed = decode_png_values(section7_data, &grid)?;
    if packed.len() != packing.data_point_count {
        bail!(
            "Data-point mismatch: section5={}, decoded={}",
            packing.data_point_count,
            packed.len()
        );
    }

    let values = unpack_values(&packed, &packing);
    let (name, attributes) = identify_variable(identity);

    let latitudes = (0..grid.ny)
        .map(|row| grid.la1_deg + row as f64 * grid.lat_step_deg)
        .collect();
    let longitudes = (0..grid.nx)
        .map(|col| grid.lo1_deg + col as f64 * grid.lon_step_deg)
        .collect();

    let mut variables = IndexMap::new();
    variables.insert(
        name,
        GridVariable {
            latitudes,
            longitudes,
            values,
            attributes,
        },
    );

    Ok(GridSet {
        variables,
        reference_time,
    })
}

fn decode_png_values(section7_data: &[u8], grid: &GridDef) -> Result<PackedValues> {
    let decoder = png::Decoder::new(Cursor::new(section7_data));
    let mut reader = decoder.read_info().context("Failed to read PNG info")?;
    let mut png_buffer = vec![0_u8; reader.output_buffer_size()];
    let frame_info = reader
        .next_frame(&mut png_buffer)
        .context("Failed to decode PNG payload")?;

    if frame_info.width != grid.nx || frame_info.height != grid.ny {
        bail!(
            "Grid mismatch: GRIB {}x{}, PNG {}x{}",
            grid.nx,
            grid.ny,
            frame_info.width,
            frame_info.height
        );
    }

    let used = &png_buffer[..frame_info.buffer_size()];
    match frame_info.bit_depth {
        png::BitDepth::Eight => Ok(PackedValues::U8(used.to_vec())),
        png::BitDepth::Sixteen => {
            if used.len() % 2 != 0 {
                bail!("Unexpected 16-bit PNG buffer length");
            }
            let mut decoded = Vec::with_capacity(used.len() / 2);
            let mut idx = 0;
            while idx + 1 < used.len() {
                decoded.push(u16::from_be_bytes([used[idx], used[idx + 1]]));
                idx += 2;
            }
            Ok(PackedValues::U16(decoded))
        }
        bit_depth => bail!("Unsupported PNG bit depth {bit_depth:?}"),
    }
}

/// Expand packed integers with the section 5 reference value and scale
/// factors: y = (R + x * 2^E) / 10^D.
fn unpack_values(packed: &PackedValues, packing: &Packing) -> Vec<f64> {
    let binary_scale = 2_f64.powi(i32::from(packing.binary_scale_factor));
    let decimal_scale = 10_f64.powi(i32::from(packing.decimal_scale_factor));
    (0..packed.len())
        .map(|idx| {
            let raw = packed.at(idx).unwrap_or(0) as f64;
            (packing.reference_value + raw * binary_scale) / decimal_scale
        })
        .collect()
}

/// Name the decoded variable from the MRMS local parameter table, falling
/// back to a generic code-derived name for products outside the table.
fn identify_variable(identity: ProductIdentity) -> (String, HashMap<String, String>) {
    match (identity.discipline, identity.category, identity.number) {
        (209, 0, 16) => {
            let mut attributes = HashMap::new();
            attributes.insert("units".to_string(), "dBZ".to_string());
            attributes.insert(
                "long_name".to_string(),
                "Reflectivity at lowest altitude".to_string(),
            );
            ("ReflectivityAtLowestAltitude".to_string(), attributes)
        }
        (discipline, category, number) => (
            format!("unknown_{discipline}_{category}_{number}"),
            HashMap::new(),
        ),
    }
}

fn read_u16_be(buffer: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > buffer.len() {
        bail!("Out-of-range u16 read at {offset}");
    }
    Ok(u16::from_be_bytes([buffer[offset], buffer[offset + 1]]))
}

fn read_i16_be(buffer: &[u8], offset: usize) -> Result<i16> {
    if offset + 2 > buffer.len() {
        bail!("Out-of-range i16 read at {offset}");
    }
    Ok(i16::from_be_bytes([buffer[offset], buffer[offset + 1]]))
}

fn read_u32_be(buffer: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > buffer.len() {
        bail!("Out-of-range u32 read at {offset}");
    }
    Ok(u32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ]))
}

fn read_f32_be(buffer: &[u8], offset: usize) -> Result<f32> {
    if offset + 4 > buffer.len() {
        bail!("Out-of-range f32 read at {offset}");
    }
    Ok(f32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ]))
}

fn read_grib_signed_scaled_int32(buffer: &[u8], offset: usize) -> Result<f64> {
    let raw = read_u32_be(buffer, offset)?;
    let sign = if (raw & 0x8000_0000) != 0 { -1.0 } else { 1.0 };
    let magnitude = (raw & 0x7fff_ffff) as f64;
    Ok(sign * magnitude / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(raw: &[u8], nx: u32, ny: u32) -> Vec<u8> {
        let mut png_bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_bytes, nx, ny);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(raw).unwrap();
        }
        png_bytes
    }

    fn scaled_deg(value: f64) -> [u8; 4] {
        let magnitude = (value.abs() * 1_000_000.0).round() as u32;
        let raw = if value < 0.0 {
            magnitude | 0x8000_0000
        } else {
            magnitude
        };
        raw.to_be_bytes()
    }

    #[allow(clippy::too_many_arguments)]
    fn build_message(
        raw: &[u8],
        nx: u32,
        ny: u32,
        la1: f64,
        lo1: f64,
        step_deg: f64,
        reference_value: f32,
        decimal_scale_factor: i16,
    ) -> Vec<u8> {
        let mut buf = Vec::new();

        // Section 0
        buf.extend_from_slice(b"GRIB");
        buf.extend_from_slice(&[0, 0]);
        buf.push(209); // discipline
        buf.push(2); // edition
        buf.extend_from_slice(&0_u64.to_be_bytes()); // total length, patched below

        // Section 1: identification, reference time 2026-08-05T12:30:00Z
        let mut sec1 = vec![0_u8; 21];
        sec1[0..4].copy_from_slice(&21_u32.to_be_bytes());
        sec1[4] = 1;
        sec1[12..14].copy_from_slice(&2026_u16.to_be_bytes());
        sec1[14] = 8;
        sec1[15] = 5;
        sec1[16] = 12;
        sec1[17] = 30;
        sec1[18] = 0;
        buf.extend_from_slice(&sec1);

        // Section 3: regular lat/lon grid, north-to-south rows unless the
        // scanning mode says otherwise; here +j scanning (0x40) for
        // ascending latitudes.
        let mut sec3 = vec![0_u8; 72];
        sec3[0..4].copy_from_slice(&72_u32.to_be_bytes());
        sec3[4] = 3;
        sec3[12..14].copy_from_slice(&0_u16.to_be_bytes());
        sec3[30..34].copy_from_slice(&nx.to_be_bytes());
        sec3[34..38].copy_from_slice(&ny.to_be_bytes());
        sec3[46..50].copy_from_slice(&scaled_deg(la1));
        sec3[50..54].copy_from_slice(&scaled_deg(lo1));
        let step_scaled = ((step_deg * 1_000_000.0).round() as u32).to_be_bytes();
        sec3[63..67].copy_from_slice(&step_scaled);
        sec3[67..71].copy_from_slice(&step_scaled);
        sec3[71] = 0x40;
        buf.extend_from_slice(&sec3);

        // Section 4: product definition, parameter (209, 0, 16)
        let mut sec4 = vec![0_u8; 34];
        sec4[0..4].copy_from_slice(&34_u32.to_be_bytes());
        sec4[4] = 4;
        sec4[9] = 0;
        sec4[10] = 16;
        buf.extend_from_slice(&sec4);

        // Section 5: PNG packing
        let mut sec5 = vec![0_u8; 21];
        sec5[0..4].copy_from_slice(&21_u32.to_be_bytes());
        sec5[4] = 5;
        sec5[5..9].copy_from_slice(&(raw.len() as u32).to_be_bytes());
        sec5[9..11].copy_from_slice(&41_u16.to_be_bytes());
        sec5[11..15].copy_from_slice(&reference_value.to_be_bytes());
        sec5[15..17].copy_from_slice(&0_i16.to_be_bytes());
        sec5[17..19].copy_from_slice(&decimal_scale_factor.to_be_bytes());
        sec5[19] = 8;
        buf.extend_from_slice(&sec5);

        // Section 6: no bitmap
        let mut sec6 = vec![0_u8; 6];
        sec6[0..4].copy_from_slice(&6_u32.to_be_bytes());
        sec6[4] = 6;
        sec6[5] = 255;
        buf.extend_from_slice(&sec6);

        // Section 7: PNG-compressed data
        let png_bytes = encode_png(raw, nx, ny);
        let sec7_len = 5 + png_bytes.len();
        buf.extend_from_slice(&(sec7_len as u32).to_be_bytes());
        buf.push(7);
        buf.extend_from_slice(&png_bytes);

        buf.extend_from_slice(b"7777");
        let total = buf.len() as u64;
        buf[8..16].copy_from_slice(&total.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_grid_axes_values_and_reference_time() {
        let raw = [10_u8, 20, 30, 40, 50, 60];
        let message = build_message(&raw, 3, 2, 10.0, 190.0, 10.0, 5.0, 0);

        let grids = parse_message(&message).unwrap();
        assert_eq!(
            grids.reference_time.unwrap().to_rfc3339(),
            "2026-08-05T12:30:00+00:00"
        );

        let (name, variable) = grids.variables.iter().next().unwrap();
        assert_eq!(name, "ReflectivityAtLowestAltitude");
        assert_eq!(variable.attribute_or("units", ""), "dBZ");
        assert_eq!(variable.latitudes, vec![10.0, 20.0]);
        assert_eq!(variable.longitudes, vec![190.0, 200.0, 210.0]);
        assert_eq!(variable.values, vec![15.0, 25.0, 35.0, 45.0, 55.0, 65.0]);
        assert_eq!(variable.value_at(1, 2), Some(65.0));
    }

    #[test]
    fn applies_decimal_scale_factor() {
        let raw = [100_u8, 200];
        let message = build_message(&raw, 2, 1, 35.0, 230.0, 0.5, 0.0, 1);

        let grids = parse_message(&message).unwrap();
        let variable = grids.variables.values().next().unwrap();
        assert_eq!(variable.values, vec![10.0, 20.0]);
    }

    #[test]
    fn rejects_payload_without_grib_magic() {
        let error = parse_message(b"NOPE: definitely not a grid file").unwrap_err();
        assert!(error.to_string().contains("GRIB"));
    }

    #[test]
    fn rejects_unsupported_packing_template() {
        let raw = [1_u8, 2];
        let mut message = build_message(&raw, 2, 1, 10.0, 190.0, 1.0, 0.0, 0);
        // Section 5 template number lives right after the 16-byte indicator,
        // the 21-byte identification and the 72-byte grid sections.
        let sec5_offset = 16 + 21 + 72 + 34;
        message[sec5_offset + 9..sec5_offset + 11].copy_from_slice(&40_u16.to_be_bytes());
        let error = parse_message(&message).unwrap_err();
        assert!(error.to_string().contains("Unsupported data template"));
    }
}
