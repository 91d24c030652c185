//! Box-tree serializer
//!
//! Uses the deferred-header pattern: each box reserves the compact 8-byte
//! header, writes its payload (possibly recursively), then backfills the
//! size. A box whose finished length does not fit 32 bits gets the 64-bit
//! large-size form spliced in retroactively, so no pre-pass over nested
//! content is ever needed.
//!
//! [`derive_box_version`] must run over a tree before writing it; it picks
//! the minimal version/flags that losslessly represent each box's content.

use alloc::vec::Vec;
use log::debug;
use whereat::At;

use crate::error::{HeifError, Result};
use crate::fraction::Fraction;

use super::boxes::*;

/// Byte sink with deferred box-header finalization.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: Vec<u8>,
}

impl BoxWriter {
    /// New empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Reserve a compact header for `fourcc` and return its mark.
    fn begin(&mut self, fourcc: FourCC) -> usize {
        let mark = self.buf.len();
        self.buf.extend_from_slice(&[0; 4]);
        self.buf.extend_from_slice(&fourcc.0);
        mark
    }

    /// Reserve a full-box header (compact header + version/flags).
    fn begin_full(&mut self, fourcc: FourCC, full: FullBoxHeader) -> usize {
        let mark = self.begin(fourcc);
        self.write_u32((u32::from(full.version) << 24) | (full.flags & 0x00FF_FFFF));
        mark
    }

    /// Backfill the size of the box opened at `mark`.
    ///
    /// Escalates to the 64-bit large-size form when the finished box does
    /// not fit a u32 size field.
    fn end(&mut self, mark: usize) {
        let total = self.buf.len() - mark;
        if let Ok(size32) = u32::try_from(total) {
            self.buf[mark..mark + 4].copy_from_slice(&size32.to_be_bytes());
        } else {
            // The reservation undershot: switch to size==1 + u64 size,
            // accounting for the 8 bytes being inserted.
            let large = (total as u64) + 8;
            self.buf[mark..mark + 4].copy_from_slice(&1u32.to_be_bytes());
            let at = mark + 8;
            self.buf.splice(at..at, large.to_be_bytes());
        }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn write_fourcc(&mut self, v: FourCC) {
        self.buf.extend_from_slice(&v.0);
    }

    fn write_zstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    fn write_sized(&mut self, width: u8, v: u64) -> Result<()> {
        match width {
            0 if v == 0 => Ok(()),
            4 => {
                let v = u32::try_from(v)
                    .map_err(|_| At::from(HeifError::InvalidData("value exceeds field width")))?;
                self.write_u32(v);
                Ok(())
            }
            8 => {
                self.write_u64(v);
                Ok(())
            }
            _ => Err(At::from(HeifError::InvalidData("bad sized-field width"))),
        }
    }
}

/// Serialize a sequence of top-level boxes.
///
/// Run [`derive_box_version`] over each node first; this function writes
/// whatever versions/flags the tree carries.
pub fn write_boxes(boxes: &[BoxNode]) -> Result<Vec<u8>> {
    let mut w = BoxWriter::new();
    for node in boxes {
        write_box(&mut w, node)?;
    }
    Ok(w.into_bytes())
}

/// Serialize one box and its children.
pub fn write_box(w: &mut BoxWriter, node: &BoxNode) -> Result<()> {
    match &node.kind {
        BoxKind::FileType(b) => {
            let mark = w.begin(FourCC::FTYP);
            w.write_fourcc(b.major_brand);
            w.write_u32(b.minor_version);
            for brand in &b.compatible_brands {
                w.write_fourcc(*brand);
            }
            w.end(mark);
        }
        BoxKind::Meta(full) => {
            let mark = w.begin_full(FourCC::META, *full);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::ItemProperties => {
            let mark = w.begin(FourCC::IPRP);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::PropertyContainer => {
            let mark = w.begin(FourCC::IPCO);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::DataInformation => {
            let mark = w.begin(FourCC::DINF);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::GroupList => {
            let mark = w.begin(FourCC::GRPL);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::ItemInfo(b) => {
            let mark = w.begin_full(FourCC::IINF, b.full);
            if b.full.version == 0 {
                let count = u16::try_from(node.children.len())
                    .map_err(|_| At::from(HeifError::InvalidData("iinf entry count")))?;
                w.write_u16(count);
            } else {
                let count = u32::try_from(node.children.len())
                    .map_err(|_| At::from(HeifError::InvalidData("iinf entry count")))?;
                w.write_u32(count);
            }
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::DataReference(b) => {
            let mark = w.begin_full(FourCC::DREF, b.full);
            let count = u32::try_from(node.children.len())
                .map_err(|_| At::from(HeifError::InvalidData("dref entry count")))?;
            w.write_u32(count);
            write_children(w, node)?;
            w.end(mark);
        }
        BoxKind::Handler(b) => {
            let mark = w.begin_full(FourCC::HDLR, b.full);
            w.write_u32(0); // pre_defined
            w.write_fourcc(b.handler_type);
            w.write_bytes(&[0; 12]); // reserved
            w.write_zstring(&b.name);
            w.end(mark);
        }
        BoxKind::PrimaryItem(b) => {
            let mark = w.begin_full(FourCC::PITM, b.full);
            if b.full.version == 0 {
                w.write_u16(b.item_id as u16);
            } else {
                w.write_u32(b.item_id);
            }
            w.end(mark);
        }
        BoxKind::ItemLocation(b) => write_iloc(w, b)?,
        BoxKind::ItemInfoEntry(b) => write_infe(w, b)?,
        BoxKind::PropertyAssociations(b) => write_ipma(w, b)?,
        BoxKind::ItemReferences(b) => write_iref(w, b)?,
        BoxKind::ItemData(b) => {
            let mark = w.begin(FourCC::IDAT);
            w.write_bytes(&b.data);
            w.end(mark);
        }
        BoxKind::DataEntryUrl(b) => {
            let mark = w.begin_full(FourCC::URL, b.full);
            if b.full.flags & 1 == 0 {
                if let Some(loc) = &b.location {
                    w.write_zstring(loc);
                }
            }
            w.end(mark);
        }
        BoxKind::ImageExtents(b) => {
            let mark = w.begin_full(FourCC::ISPE, b.full);
            w.write_u32(b.width);
            w.write_u32(b.height);
            w.end(mark);
        }
        BoxKind::AuxiliaryType(b) => {
            let mark = w.begin_full(FourCC::AUXC, b.full);
            w.write_zstring(&b.aux_type);
            w.write_bytes(&b.aux_subtype);
            w.end(mark);
        }
        BoxKind::Rotation(b) => {
            let mark = w.begin(FourCC::IROT);
            w.write_u8(b.angle & 0x03);
            w.end(mark);
        }
        BoxKind::Mirror(b) => {
            let mark = w.begin(FourCC::IMIR);
            w.write_u8(match b.axis {
                MirrorAxis::Vertical => 0,
                MirrorAxis::Horizontal => 1,
            });
            w.end(mark);
        }
        BoxKind::CleanAperture(b) => write_clap(w, b)?,
        BoxKind::PixelAspect(b) => {
            let mark = w.begin(FourCC::PASP);
            w.write_u32(b.h_spacing);
            w.write_u32(b.v_spacing);
            w.end(mark);
        }
        BoxKind::PixelInfo(b) => {
            let mark = w.begin_full(FourCC::PIXI, b.full);
            let count = u8::try_from(b.bits_per_channel.len())
                .map_err(|_| At::from(HeifError::InvalidData("pixi channel count")))?;
            w.write_u8(count);
            w.write_bytes(&b.bits_per_channel);
            w.end(mark);
        }
        BoxKind::ColorInfo(b) => write_colr(w, b),
        BoxKind::HevcConfig(b) => write_hvcc(w, b)?,
        BoxKind::Av1Config(b) => write_av1c(w, b),
        BoxKind::MediaData(b) => {
            let mark = w.begin(FourCC::MDAT);
            w.write_bytes(&b.data);
            w.end(mark);
        }
        BoxKind::Opaque(b) => {
            let mark = w.begin(b.box_type);
            if let Some(uuid) = &b.uuid {
                w.write_bytes(uuid);
            }
            w.write_bytes(&b.data);
            w.end(mark);
        }
    }
    Ok(())
}

fn write_children(w: &mut BoxWriter, node: &BoxNode) -> Result<()> {
    for child in &node.children {
        write_box(w, child)?;
    }
    Ok(())
}

fn sized_width(values: impl Iterator<Item = u64>) -> u8 {
    let mut width = 0u8;
    for v in values {
        if v > u64::from(u32::MAX) {
            return 8;
        }
        if v != 0 {
            width = 4;
        }
    }
    width
}

fn write_iloc(w: &mut BoxWriter, b: &IlocBox) -> Result<()> {
    let version = b.full.version;

    // Field widths recomputed from content every time; the parse side
    // accepts only 0/4/8 so these are the only widths emitted.
    let offset_size = sized_width(b.items.iter().flat_map(|i| i.extents.iter().map(|e| e.offset)))
        .max(4);
    let length_size = sized_width(b.items.iter().flat_map(|i| i.extents.iter().map(|e| e.length)))
        .max(4);
    let base_offset_size = sized_width(b.items.iter().map(|i| i.base_offset));
    let index_size = if version > 1 {
        sized_width(b.items.iter().flat_map(|i| i.extents.iter().map(|e| e.index)))
    } else {
        0
    };

    let mark = w.begin_full(FourCC::ILOC, b.full);
    w.write_u8((offset_size << 4) | length_size);
    w.write_u8((base_offset_size << 4) | index_size);

    if version < 2 {
        let count = u16::try_from(b.items.len())
            .map_err(|_| At::from(HeifError::InvalidData("iloc item count")))?;
        w.write_u16(count);
    } else {
        let count = u32::try_from(b.items.len())
            .map_err(|_| At::from(HeifError::InvalidData("iloc item count")))?;
        w.write_u32(count);
    }

    for item in &b.items {
        if version < 2 {
            let id = u16::try_from(item.item_id)
                .map_err(|_| At::from(HeifError::InvalidData("iloc item id width")))?;
            w.write_u16(id);
        } else {
            w.write_u32(item.item_id);
        }
        if version >= 1 {
            w.write_u16(u16::from(item.construction_method.code() & 0x0F));
        }
        w.write_u16(item.data_reference_index);
        w.write_sized(base_offset_size, item.base_offset)?;
        let extent_count = u16::try_from(item.extents.len())
            .map_err(|_| At::from(HeifError::InvalidData("iloc extent count")))?;
        w.write_u16(extent_count);
        for extent in &item.extents {
            if index_size > 0 {
                w.write_sized(index_size, extent.index)?;
            }
            w.write_sized(offset_size, extent.offset)?;
            w.write_sized(length_size, extent.length)?;
        }
    }

    w.end(mark);
    Ok(())
}

fn write_infe(w: &mut BoxWriter, b: &InfeBox) -> Result<()> {
    let mark = w.begin_full(FourCC::INFE, b.full);
    if b.full.version <= 1 {
        let id = u16::try_from(b.item_id)
            .map_err(|_| At::from(HeifError::InvalidData("infe item id width")))?;
        w.write_u16(id);
        w.write_u16(b.protection_index);
        w.write_zstring(&b.name);
        w.write_zstring(&b.content_type);
        if !b.content_encoding.is_empty() {
            w.write_zstring(&b.content_encoding);
        }
    } else {
        if b.full.version == 2 {
            let id = u16::try_from(b.item_id)
                .map_err(|_| At::from(HeifError::InvalidData("infe item id width")))?;
            w.write_u16(id);
        } else {
            w.write_u32(b.item_id);
        }
        w.write_u16(b.protection_index);
        w.write_fourcc(b.item_type.unwrap_or(FourCC([0; 4])));
        w.write_zstring(&b.name);
        match b.item_type {
            Some(FourCC::MIME) => {
                w.write_zstring(&b.content_type);
                if !b.content_encoding.is_empty() {
                    w.write_zstring(&b.content_encoding);
                }
            }
            Some(FourCC::URI) => w.write_zstring(&b.uri_type),
            _ => {}
        }
    }
    w.end(mark);
    Ok(())
}

fn write_ipma(w: &mut BoxWriter, b: &IpmaBox) -> Result<()> {
    let mark = w.begin_full(FourCC::IPMA, b.full);
    let count = u32::try_from(b.entries.len())
        .map_err(|_| At::from(HeifError::InvalidData("ipma entry count")))?;
    w.write_u32(count);
    let wide_index = b.full.flags & 1 != 0;
    for entry in &b.entries {
        if b.full.version < 1 {
            let id = u16::try_from(entry.item_id)
                .map_err(|_| At::from(HeifError::InvalidData("ipma item id width")))?;
            w.write_u16(id);
        } else {
            w.write_u32(entry.item_id);
        }
        let assoc_count = u8::try_from(entry.associations.len())
            .map_err(|_| At::from(HeifError::InvalidData("ipma association count")))?;
        w.write_u8(assoc_count);
        for assoc in &entry.associations {
            if wide_index {
                if assoc.property_index > 0x7FFF {
                    return Err(At::from(HeifError::InvalidData("ipma property index")));
                }
                let word = assoc.property_index | if assoc.essential { 0x8000 } else { 0 };
                w.write_u16(word);
            } else {
                if assoc.property_index > 0x7F {
                    return Err(At::from(HeifError::InvalidData("ipma property index")));
                }
                let byte = assoc.property_index as u8 | if assoc.essential { 0x80 } else { 0 };
                w.write_u8(byte);
            }
        }
    }
    w.end(mark);
    Ok(())
}

fn write_iref(w: &mut BoxWriter, b: &IrefBox) -> Result<()> {
    let mark = w.begin_full(FourCC::IREF, b.full);
    for reference in &b.references {
        let record = w.begin(reference.ref_type);
        if b.full.version == 0 {
            let id = u16::try_from(reference.from_item_id)
                .map_err(|_| At::from(HeifError::InvalidData("iref item id width")))?;
            w.write_u16(id);
        } else {
            w.write_u32(reference.from_item_id);
        }
        let count = u16::try_from(reference.to_item_ids.len())
            .map_err(|_| At::from(HeifError::InvalidData("iref target count")))?;
        w.write_u16(count);
        for &to in &reference.to_item_ids {
            if b.full.version == 0 {
                let id = u16::try_from(to)
                    .map_err(|_| At::from(HeifError::InvalidData("iref item id width")))?;
                w.write_u16(id);
            } else {
                w.write_u32(to);
            }
        }
        w.end(record);
    }
    w.end(mark);
    Ok(())
}

fn write_clap(w: &mut BoxWriter, b: &ClapBox) -> Result<()> {
    let unsigned = |f: Fraction, what: &'static str| -> Result<(u32, u32)> {
        let num =
            u32::try_from(f.numerator).map_err(|_| At::from(HeifError::InvalidFraction(what)))?;
        Ok((num, f.denominator as u32))
    };
    let (wn, wd) = unsigned(b.width, "negative aperture width")?;
    let (hn, hd) = unsigned(b.height, "negative aperture height")?;
    let mark = w.begin(FourCC::CLAP);
    w.write_u32(wn);
    w.write_u32(wd);
    w.write_u32(hn);
    w.write_u32(hd);
    w.write_i32(b.horizontal_offset.numerator);
    w.write_u32(b.horizontal_offset.denominator as u32);
    w.write_i32(b.vertical_offset.numerator);
    w.write_u32(b.vertical_offset.denominator as u32);
    w.end(mark);
    Ok(())
}

fn write_colr(w: &mut BoxWriter, b: &ColrBox) {
    let mark = w.begin(FourCC::COLR);
    match &b.profile {
        ColorProfile::Nclx {
            color_primaries,
            transfer_characteristics,
            matrix_coefficients,
            full_range,
        } => {
            w.write_fourcc(FourCC::NCLX);
            w.write_u16(*color_primaries);
            w.write_u16(*transfer_characteristics);
            w.write_u16(*matrix_coefficients);
            w.write_u8(if *full_range { 0x80 } else { 0 });
        }
        ColorProfile::Icc { tag, data } => {
            w.write_fourcc(*tag);
            w.write_bytes(data);
        }
    }
    w.end(mark);
}

fn write_hvcc(w: &mut BoxWriter, b: &HvccBox) -> Result<()> {
    let mark = w.begin(FourCC::HVCC);
    w.write_u8(b.config_version);
    w.write_u8(
        (b.general_profile_space << 6)
            | (u8::from(b.general_tier_flag) << 5)
            | (b.general_profile_idc & 0x1F),
    );
    w.write_u32(b.general_profile_compatibility_flags);
    w.write_u16((b.general_constraint_indicator_flags >> 32) as u16);
    w.write_u32(b.general_constraint_indicator_flags as u32);
    w.write_u8(b.general_level_idc);
    w.write_u16(0xF000 | (b.min_spatial_segmentation_idc & 0x0FFF));
    w.write_u8(0xFC | (b.parallelism_type & 0x03));
    w.write_u8(0xFC | (b.chroma_format & 0x03));
    w.write_u8(0xF8 | (b.bit_depth_luma_minus8 & 0x07));
    w.write_u8(0xF8 | (b.bit_depth_chroma_minus8 & 0x07));
    w.write_u16(b.avg_frame_rate);
    w.write_u8(
        (b.constant_frame_rate << 6)
            | ((b.num_temporal_layers & 0x07) << 3)
            | (u8::from(b.temporal_id_nested) << 2)
            | (b.length_size_minus_one & 0x03),
    );
    let num_arrays = u8::try_from(b.arrays.len())
        .map_err(|_| At::from(HeifError::InvalidData("hvcC array count")))?;
    w.write_u8(num_arrays);
    for array in &b.arrays {
        w.write_u8((u8::from(array.array_completeness) << 7) | (array.nal_unit_type & 0x3F));
        let num_nalus = u16::try_from(array.nal_units.len())
            .map_err(|_| At::from(HeifError::InvalidData("hvcC NAL count")))?;
        w.write_u16(num_nalus);
        for nal in &array.nal_units {
            let len = u16::try_from(nal.len())
                .map_err(|_| At::from(HeifError::InvalidData("hvcC NAL length")))?;
            w.write_u16(len);
            w.write_bytes(nal);
        }
    }
    w.end(mark);
    Ok(())
}

fn write_av1c(w: &mut BoxWriter, b: &Av1cBox) {
    let mark = w.begin(FourCC::AV1C);
    w.write_u8(0x81);
    w.write_u8((b.seq_profile << 5) | (b.seq_level_idx_0 & 0x1F));
    w.write_u8(
        (u8::from(b.seq_tier_0) << 7)
            | (u8::from(b.high_bitdepth) << 6)
            | (u8::from(b.twelve_bit) << 5)
            | (u8::from(b.monochrome) << 4)
            | (u8::from(b.chroma_subsampling_x) << 3)
            | (u8::from(b.chroma_subsampling_y) << 2)
            | (b.chroma_sample_position & 0x03),
    );
    match b.initial_presentation_delay {
        Some(delay) => w.write_u8(0x10 | (delay & 0x0F)),
        None => w.write_u8(0),
    }
    w.write_bytes(&b.config_obus);
    w.end(mark);
}

/// Recompute the minimal version/flags of every box in a tree.
///
/// Runs single-threaded before serialization; this is the only mutation
/// the tree sees after parsing.
pub fn derive_box_version(node: &mut BoxNode) {
    let child_count = node.children.len();
    match &mut node.kind {
        BoxKind::PrimaryItem(b) => {
            b.full.version = if b.item_id > 0xFFFF { 1 } else { 0 };
        }
        BoxKind::ItemLocation(b) => {
            let wide_ids = b.items.len() > 0xFFFF || b.items.iter().any(|i| i.item_id > 0xFFFF);
            let has_index = b
                .items
                .iter()
                .any(|i| i.extents.iter().any(|e| e.index != 0));
            let non_file = b
                .items
                .iter()
                .any(|i| i.construction_method != ConstructionMethod::File);
            b.full.version = if wide_ids || has_index {
                2
            } else if non_file {
                1
            } else {
                0
            };
            debug!("iloc derives version {}", b.full.version);
        }
        BoxKind::ItemInfo(b) => {
            b.full.version = if child_count > 0xFFFF { 1 } else { 0 };
        }
        BoxKind::ItemInfoEntry(b) => {
            let needs_typed = b.item_type.is_some() || b.full.flags & 1 != 0;
            b.full.version = if b.item_id > 0xFFFF {
                3
            } else if needs_typed {
                2
            } else {
                0
            };
        }
        BoxKind::PropertyAssociations(b) => {
            b.full.version = if b.entries.iter().any(|e| e.item_id > 0xFFFF) {
                1
            } else {
                0
            };
            let wide_index = b
                .entries
                .iter()
                .flat_map(|e| e.associations.iter())
                .any(|a| a.property_index > 0x7F);
            if wide_index {
                b.full.flags |= 1;
            } else {
                b.full.flags &= !1;
            }
        }
        BoxKind::ItemReferences(b) => {
            let wide = b.references.iter().any(|r| {
                r.from_item_id > 0xFFFF || r.to_item_ids.iter().any(|&to| to > 0xFFFF)
            });
            b.full.version = u8::from(wide);
        }
        _ => {}
    }
    for child in &mut node.children {
        derive_box_version(child);
    }
}

/// Convenience: derive versions and serialize in one call.
pub fn finalize_and_write(boxes: &mut [BoxNode]) -> Result<Vec<u8>> {
    for node in boxes.iter_mut() {
        derive_box_version(node);
    }
    write_boxes(boxes)
}
