//! Recursive box-tree reader
//!
//! `read_box` parses one box: header, bounds checks, dispatch on the
//! fourcc, then an unconditional resync to the end of the box's range so
//! a partially consuming or failing payload parser never desyncs the
//! parent cursor. Depth is an explicit counter, not ambient stack state.

use alloc::vec::Vec;
use bitreader::BitReader;
use log::debug;
use whereat::At;

use crate::error::{check_stop, HeifError, Result};
use crate::fraction::Fraction;

use super::boxes::*;
use super::reader::{ByteRangeReader, GrowStatus};
use super::{
    MAX_BOX_NESTING_LEVEL, MAX_CHILDREN_PER_BOX, MAX_ILOC_EXTENTS_PER_ITEM, MAX_ILOC_ITEMS,
};

/// Parse every top-level box of a container.
pub fn read_file(data: &[u8], stop: &dyn enough::Stop) -> Result<Vec<BoxNode>> {
    let mut r = ByteRangeReader::new(data);
    read_children(&mut r, 0, None, stop)
}

/// Parse zero or more sibling boxes until the range is exhausted.
///
/// `max_count` bounds the loop when the enclosing box declared an entry
/// count up front (`iinf`, `dref`).
pub fn read_children(
    r: &mut ByteRangeReader<'_>,
    depth: u32,
    max_count: Option<usize>,
    stop: &dyn enough::Stop,
) -> Result<Vec<BoxNode>> {
    let mut children = Vec::new();
    while !r.is_empty() {
        check_stop(stop)?;
        if let Some(max) = max_count {
            if children.len() >= max {
                break;
            }
        }
        if children.len() >= MAX_CHILDREN_PER_BOX {
            return Err(At::from(HeifError::LimitExceeded("children per container")));
        }
        children.push(read_box(r, depth, stop)?);
    }
    Ok(children)
}

/// Parse one box at the cursor.
pub fn read_box(
    r: &mut ByteRangeReader<'_>,
    depth: u32,
    stop: &dyn enough::Stop,
) -> Result<BoxNode> {
    if depth > MAX_BOX_NESTING_LEVEL {
        return Err(At::from(HeifError::LimitExceeded("box nesting depth")));
    }

    let header = BoxHeader::parse(r)?;
    let payload_len = header.payload_len(r.remaining())?;

    // A child box may not claim more bytes than its container has left,
    // independent of what its own size field says.
    match r.require_available(payload_len) {
        GrowStatus::Enough => {}
        GrowStatus::TimedOut => {
            return Err(At::from(HeifError::Truncated("waiting for box payload")));
        }
        GrowStatus::WouldExceedEof => {
            return Err(At::from(HeifError::InvalidBoxSize(
                "box payload exceeds container bounds",
            )));
        }
    }

    let mut sub = r.open_subrange(payload_len)?;
    let result = parse_payload(&header, &mut sub, depth, stop);
    sub.skip_to_end();
    r.advance_over(&sub);
    result
}

fn parse_payload(
    header: &BoxHeader,
    r: &mut ByteRangeReader<'_>,
    depth: u32,
    stop: &dyn enough::Stop,
) -> Result<BoxNode> {
    let kind = match header.box_type {
        FourCC::FTYP => BoxKind::FileType(parse_ftyp(r)?),
        FourCC::META => {
            let full = FullBoxHeader::parse(r)?;
            let children = read_children(r, depth + 1, None, stop)?;
            return Ok(BoxNode::container(BoxKind::Meta(full), children));
        }
        FourCC::IPRP => {
            let children = read_children(r, depth + 1, None, stop)?;
            return Ok(BoxNode::container(BoxKind::ItemProperties, children));
        }
        FourCC::IPCO => {
            let children = read_children(r, depth + 1, None, stop)?;
            return Ok(BoxNode::container(BoxKind::PropertyContainer, children));
        }
        FourCC::DINF => {
            let children = read_children(r, depth + 1, None, stop)?;
            return Ok(BoxNode::container(BoxKind::DataInformation, children));
        }
        FourCC::GRPL => {
            let children = read_children(r, depth + 1, None, stop)?;
            return Ok(BoxNode::container(BoxKind::GroupList, children));
        }
        FourCC::IINF => {
            let full = FullBoxHeader::parse(r)?;
            let count = if full.version == 0 {
                usize::from(r.read_u16()?)
            } else {
                usize::try_from(r.read_u32()?)
                    .map_err(|_| At::from(HeifError::LimitExceeded("iinf entry count")))?
            };
            let children = read_children(r, depth + 1, Some(count), stop)?;
            return Ok(BoxNode::container(
                BoxKind::ItemInfo(IinfBox { full }),
                children,
            ));
        }
        FourCC::DREF => {
            let full = FullBoxHeader::parse(r)?;
            let count = usize::try_from(r.read_u32()?)
                .map_err(|_| At::from(HeifError::LimitExceeded("dref entry count")))?;
            let children = read_children(r, depth + 1, Some(count), stop)?;
            return Ok(BoxNode::container(
                BoxKind::DataReference(DrefBox { full }),
                children,
            ));
        }
        FourCC::HDLR => BoxKind::Handler(parse_hdlr(r)?),
        FourCC::PITM => BoxKind::PrimaryItem(parse_pitm(r)?),
        FourCC::ILOC => BoxKind::ItemLocation(parse_iloc(r)?),
        FourCC::INFE => BoxKind::ItemInfoEntry(parse_infe(r)?),
        FourCC::IPMA => BoxKind::PropertyAssociations(parse_ipma(r)?),
        FourCC::IREF => BoxKind::ItemReferences(parse_iref(r)?),
        FourCC::IDAT => BoxKind::ItemData(IdatBox {
            data: r.read_remaining(),
        }),
        FourCC::URL => BoxKind::DataEntryUrl(parse_url(r)?),
        FourCC::ISPE => BoxKind::ImageExtents(parse_ispe(r)?),
        FourCC::AUXC => BoxKind::AuxiliaryType(parse_auxc(r)?),
        FourCC::IROT => BoxKind::Rotation(IrotBox {
            angle: r.read_u8()? & 0x03,
        }),
        FourCC::IMIR => BoxKind::Mirror(ImirBox {
            axis: if r.read_u8()? & 1 == 0 {
                MirrorAxis::Vertical
            } else {
                MirrorAxis::Horizontal
            },
        }),
        FourCC::CLAP => BoxKind::CleanAperture(parse_clap(r)?),
        FourCC::PASP => BoxKind::PixelAspect(PaspBox {
            h_spacing: r.read_u32()?,
            v_spacing: r.read_u32()?,
        }),
        FourCC::PIXI => BoxKind::PixelInfo(parse_pixi(r)?),
        FourCC::COLR => BoxKind::ColorInfo(parse_colr(r)?),
        FourCC::HVCC => BoxKind::HevcConfig(parse_hvcc(r)?),
        FourCC::AV1C => BoxKind::Av1Config(parse_av1c(r)?),
        FourCC::MDAT => BoxKind::MediaData(MdatBox {
            data: r.read_remaining(),
        }),
        other => {
            debug!("skipping unparsed box '{other}' ({} bytes)", r.remaining());
            BoxKind::Opaque(OpaqueBox {
                box_type: other,
                uuid: header.uuid,
                data: r.read_remaining(),
            })
        }
    };
    Ok(BoxNode::leaf(kind))
}

fn parse_ftyp(r: &mut ByteRangeReader<'_>) -> Result<FtypBox> {
    if r.remaining() < 8 {
        return Err(At::from(HeifError::InvalidBoxSize("ftyp too small")));
    }
    let major_brand = FourCC(r.read_fourcc()?);
    let minor_version = r.read_u32()?;
    let mut compatible_brands = Vec::new();
    while r.remaining() >= 4 {
        compatible_brands.push(FourCC(r.read_fourcc()?));
    }
    Ok(FtypBox {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

fn parse_hdlr(r: &mut ByteRangeReader<'_>) -> Result<HdlrBox> {
    let full = FullBoxHeader::parse(r)?;
    let _pre_defined = r.read_u32()?;
    let handler_type = FourCC(r.read_fourcc()?);
    r.skip(12)?; // reserved
    let name = if r.is_empty() {
        alloc::string::String::new()
    } else {
        r.read_null_string()?
    };
    Ok(HdlrBox {
        full,
        handler_type,
        name,
    })
}

fn parse_pitm(r: &mut ByteRangeReader<'_>) -> Result<PitmBox> {
    let full = FullBoxHeader::parse(r)?;
    let item_id = if full.version == 0 {
        u32::from(r.read_u16()?)
    } else {
        r.read_u32()?
    };
    Ok(PitmBox { full, item_id })
}

fn parse_iloc(r: &mut ByteRangeReader<'_>) -> Result<IlocBox> {
    let full = FullBoxHeader::parse(r)?;
    if full.version > 2 {
        return Err(At::from(HeifError::Unsupported("iloc version")));
    }

    let nibbles = r.read_bytes(2)?;
    let mut bits = BitReader::new(nibbles);
    let field = |v: core::result::Result<u8, bitreader::BitReaderError>| {
        v.map_err(|_| At::from(HeifError::InvalidData("iloc field sizes")))
    };
    let offset_size = field(bits.read_u8(4))?;
    let length_size = field(bits.read_u8(4))?;
    let base_offset_size = field(bits.read_u8(4))?;
    // Reserved below version 2; the index width above it.
    let index_size = field(bits.read_u8(4))?;
    let index_size = if full.version > 1 { index_size } else { 0 };

    let item_count = if full.version < 2 {
        usize::from(r.read_u16()?)
    } else {
        usize::try_from(r.read_u32()?)
            .map_err(|_| At::from(HeifError::LimitExceeded("iloc item count")))?
    };
    if item_count > MAX_ILOC_ITEMS {
        return Err(At::from(HeifError::LimitExceeded("iloc item count")));
    }

    let mut items = Vec::with_capacity(item_count.min(256));
    for _ in 0..item_count {
        let item_id = if full.version < 2 {
            u32::from(r.read_u16()?)
        } else {
            r.read_u32()?
        };
        let construction_method = if full.version >= 1 {
            let word = r.read_u16()?;
            ConstructionMethod::from_code((word & 0x000F) as u8)
        } else {
            ConstructionMethod::File
        };
        let data_reference_index = r.read_u16()?;
        let base_offset = r.read_sized(base_offset_size)?;

        let extent_count = usize::from(r.read_u16()?);
        if extent_count > MAX_ILOC_EXTENTS_PER_ITEM {
            return Err(At::from(HeifError::LimitExceeded("iloc extents per item")));
        }
        let mut extents = arrayvec::ArrayVec::new();
        for _ in 0..extent_count {
            let index = if index_size > 0 {
                r.read_sized(index_size)?
            } else {
                0
            };
            let offset = r.read_sized(offset_size)?;
            let length = r.read_sized(length_size)?;
            extents.push(IlocExtent {
                index,
                offset,
                length,
            });
        }

        items.push(IlocItem {
            item_id,
            construction_method,
            data_reference_index,
            base_offset,
            extents,
        });
    }

    Ok(IlocBox { full, items })
}

fn parse_infe(r: &mut ByteRangeReader<'_>) -> Result<InfeBox> {
    let full = FullBoxHeader::parse(r)?;
    if full.version > 3 {
        return Err(At::from(HeifError::Unsupported("infe version")));
    }

    let mut infe = InfeBox {
        full,
        item_id: 0,
        protection_index: 0,
        item_type: None,
        name: alloc::string::String::new(),
        content_type: alloc::string::String::new(),
        content_encoding: alloc::string::String::new(),
        uri_type: alloc::string::String::new(),
    };

    if full.version <= 1 {
        infe.item_id = u32::from(r.read_u16()?);
        infe.protection_index = r.read_u16()?;
        if !r.is_empty() {
            infe.name = r.read_null_string()?;
        }
        if !r.is_empty() {
            infe.content_type = r.read_null_string()?;
        }
        if !r.is_empty() {
            infe.content_encoding = r.read_null_string()?;
        }
        return Ok(infe);
    }

    infe.item_id = if full.version == 2 {
        u32::from(r.read_u16()?)
    } else {
        r.read_u32()?
    };
    infe.protection_index = r.read_u16()?;
    let item_type = FourCC(r.read_fourcc()?);
    infe.item_type = (item_type != FourCC([0; 4])).then_some(item_type);
    if !r.is_empty() {
        infe.name = r.read_null_string()?;
    }
    match infe.item_type {
        Some(FourCC::MIME) => {
            if !r.is_empty() {
                infe.content_type = r.read_null_string()?;
            }
            if !r.is_empty() {
                infe.content_encoding = r.read_null_string()?;
            }
        }
        Some(FourCC::URI) => {
            if !r.is_empty() {
                infe.uri_type = r.read_null_string()?;
            }
        }
        _ => {}
    }
    Ok(infe)
}

fn parse_ipma(r: &mut ByteRangeReader<'_>) -> Result<IpmaBox> {
    let full = FullBoxHeader::parse(r)?;
    let entry_count = r.read_u32()?;
    let wide_index = full.flags & 1 != 0;

    let mut entries = Vec::with_capacity((entry_count as usize).min(256));
    for _ in 0..entry_count {
        let item_id = if full.version < 1 {
            u32::from(r.read_u16()?)
        } else {
            r.read_u32()?
        };
        let assoc_count = usize::from(r.read_u8()?);
        let mut associations = Vec::with_capacity(assoc_count);
        for _ in 0..assoc_count {
            let (essential, property_index) = if wide_index {
                let word = r.read_u16()?;
                (word & 0x8000 != 0, word & 0x7FFF)
            } else {
                let byte = r.read_u8()?;
                (byte & 0x80 != 0, u16::from(byte & 0x7F))
            };
            associations.push(PropertyAssociation {
                essential,
                property_index,
            });
        }
        entries.push(IpmaEntry {
            item_id,
            associations,
        });
    }

    Ok(IpmaBox { full, entries })
}

fn parse_iref(r: &mut ByteRangeReader<'_>) -> Result<IrefBox> {
    let full = FullBoxHeader::parse(r)?;
    if full.version > 1 {
        return Err(At::from(HeifError::Unsupported("iref version")));
    }

    // The box-header mechanism is reused here as a tagged-record
    // delimiter; the records are not independently recursible boxes.
    let mut references = Vec::new();
    while !r.is_empty() {
        if references.len() >= MAX_CHILDREN_PER_BOX {
            return Err(At::from(HeifError::LimitExceeded("iref record count")));
        }
        let record_header = BoxHeader::parse(r)?;
        let payload_len = record_header.payload_len(r.remaining())?;
        let mut rec = r.open_subrange(payload_len)?;

        let from_item_id = if full.version == 0 {
            u32::from(rec.read_u16()?)
        } else {
            rec.read_u32()?
        };
        let count = usize::from(rec.read_u16()?);
        let mut to_item_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let to = if full.version == 0 {
                u32::from(rec.read_u16()?)
            } else {
                rec.read_u32()?
            };
            to_item_ids.push(to);
        }

        rec.skip_to_end();
        r.advance_over(&rec);
        references.push(ItemReference {
            ref_type: record_header.box_type,
            from_item_id,
            to_item_ids,
        });
    }

    Ok(IrefBox { full, references })
}

fn parse_url(r: &mut ByteRangeReader<'_>) -> Result<UrlBox> {
    let full = FullBoxHeader::parse(r)?;
    let location = if full.flags & 1 != 0 || r.is_empty() {
        None
    } else {
        Some(r.read_null_string()?)
    };
    Ok(UrlBox { full, location })
}

fn parse_ispe(r: &mut ByteRangeReader<'_>) -> Result<IspeBox> {
    let full = FullBoxHeader::parse(r)?;
    Ok(IspeBox {
        full,
        width: r.read_u32()?,
        height: r.read_u32()?,
    })
}

fn parse_auxc(r: &mut ByteRangeReader<'_>) -> Result<AuxcBox> {
    let full = FullBoxHeader::parse(r)?;
    let aux_type = r.read_null_string()?;
    let aux_subtype = r.read_remaining();
    Ok(AuxcBox {
        full,
        aux_type,
        aux_subtype,
    })
}

fn parse_clap(r: &mut ByteRangeReader<'_>) -> Result<ClapBox> {
    let width = Fraction::from_wire(r.read_u32()?, r.read_u32()?)?;
    let height = Fraction::from_wire(r.read_u32()?, r.read_u32()?)?;
    let h_num = r.read_i32()?;
    let h_den = r.read_u32()?;
    let v_num = r.read_i32()?;
    let v_den = r.read_u32()?;
    let h_den = i32::try_from(h_den)
        .map_err(|_| At::from(HeifError::InvalidFraction("offset denominator exceeds i32")))?;
    let v_den = i32::try_from(v_den)
        .map_err(|_| At::from(HeifError::InvalidFraction("offset denominator exceeds i32")))?;
    Ok(ClapBox {
        width,
        height,
        horizontal_offset: Fraction::new(h_num, h_den)?,
        vertical_offset: Fraction::new(v_num, v_den)?,
    })
}

fn parse_pixi(r: &mut ByteRangeReader<'_>) -> Result<PixiBox> {
    let full = FullBoxHeader::parse(r)?;
    let channels = usize::from(r.read_u8()?);
    let mut bits_per_channel = Vec::with_capacity(channels);
    for _ in 0..channels {
        bits_per_channel.push(r.read_u8()?);
    }
    Ok(PixiBox {
        full,
        bits_per_channel,
    })
}

fn parse_colr(r: &mut ByteRangeReader<'_>) -> Result<ColrBox> {
    let tag = FourCC(r.read_fourcc()?);
    let profile = match tag {
        FourCC::NCLX => {
            let color_primaries = r.read_u16()?;
            let transfer_characteristics = r.read_u16()?;
            let matrix_coefficients = r.read_u16()?;
            let full_range = r.read_u8()? & 0x80 != 0;
            ColorProfile::Nclx {
                color_primaries,
                transfer_characteristics,
                matrix_coefficients,
                full_range,
            }
        }
        FourCC::PROF | FourCC::RICC => ColorProfile::Icc {
            tag,
            data: r.read_remaining(),
        },
        _ => return Err(At::from(HeifError::UnknownColorProfile)),
    };
    Ok(ColrBox { profile })
}

fn parse_hvcc(r: &mut ByteRangeReader<'_>) -> Result<HvccBox> {
    let config_version = r.read_u8()?;
    let b = r.read_u8()?;
    let general_profile_space = b >> 6;
    let general_tier_flag = b & 0x20 != 0;
    let general_profile_idc = b & 0x1F;
    let general_profile_compatibility_flags = r.read_u32()?;
    let hi = u64::from(r.read_u16()?);
    let lo = u64::from(r.read_u32()?);
    let general_constraint_indicator_flags = (hi << 32) | lo;
    let general_level_idc = r.read_u8()?;
    let min_spatial_segmentation_idc = r.read_u16()? & 0x0FFF;
    let parallelism_type = r.read_u8()? & 0x03;
    let chroma_format = r.read_u8()? & 0x03;
    let bit_depth_luma_minus8 = r.read_u8()? & 0x07;
    let bit_depth_chroma_minus8 = r.read_u8()? & 0x07;
    let avg_frame_rate = r.read_u16()?;
    let b = r.read_u8()?;
    let constant_frame_rate = b >> 6;
    let num_temporal_layers = (b >> 3) & 0x07;
    let temporal_id_nested = b & 0x04 != 0;
    let length_size_minus_one = b & 0x03;

    let num_arrays = usize::from(r.read_u8()?);
    let mut arrays = Vec::with_capacity(num_arrays);
    for _ in 0..num_arrays {
        let b = r.read_u8()?;
        let array_completeness = b & 0x80 != 0;
        let nal_unit_type = b & 0x3F;
        let num_nalus = usize::from(r.read_u16()?);
        let mut nal_units = Vec::with_capacity(num_nalus.min(64));
        for _ in 0..num_nalus {
            let len = usize::from(r.read_u16()?);
            nal_units.push(r.read_bytes(len)?.to_vec());
        }
        arrays.push(HvccNalArray {
            array_completeness,
            nal_unit_type,
            nal_units,
        });
    }

    Ok(HvccBox {
        config_version,
        general_profile_space,
        general_tier_flag,
        general_profile_idc,
        general_profile_compatibility_flags,
        general_constraint_indicator_flags,
        general_level_idc,
        min_spatial_segmentation_idc,
        parallelism_type,
        chroma_format,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        avg_frame_rate,
        constant_frame_rate,
        num_temporal_layers,
        temporal_id_nested,
        length_size_minus_one,
        arrays,
    })
}

fn parse_av1c(r: &mut ByteRangeReader<'_>) -> Result<Av1cBox> {
    let b0 = r.read_u8()?;
    if b0 != 0x81 {
        return Err(At::from(HeifError::InvalidData("av1C marker/version")));
    }
    let b1 = r.read_u8()?;
    let b2 = r.read_u8()?;
    let b3 = r.read_u8()?;
    let initial_presentation_delay = if b3 & 0x10 != 0 {
        Some(b3 & 0x0F)
    } else {
        None
    };
    Ok(Av1cBox {
        seq_profile: b1 >> 5,
        seq_level_idx_0: b1 & 0x1F,
        seq_tier_0: b2 & 0x80 != 0,
        high_bitdepth: b2 & 0x40 != 0,
        twelve_bit: b2 & 0x20 != 0,
        monochrome: b2 & 0x10 != 0,
        chroma_subsampling_x: b2 & 0x08 != 0,
        chroma_subsampling_y: b2 & 0x04 != 0,
        chroma_sample_position: b2 & 0x03,
        initial_presentation_delay,
        config_obus: r.read_remaining(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;

    #[test]
    fn header_compact_form() {
        let data = [0, 0, 0, 12, b'f', b'r', b'e', b'e', 1, 2, 3, 4];
        let mut r = ByteRangeReader::new(&data);
        let h = BoxHeader::parse(&mut r).unwrap();
        assert_eq!(h.size, 12);
        assert_eq!(h.box_type, FourCC::FREE);
        assert_eq!(h.header_len, 8);
        assert_eq!(h.payload_len(r.remaining()).unwrap(), 4);
    }

    #[test]
    fn header_large_form() {
        let mut data = alloc::vec![0, 0, 0, 1, b'f', b'r', b'e', b'e'];
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        let mut r = ByteRangeReader::new(&data);
        let h = BoxHeader::parse(&mut r).unwrap();
        assert_eq!(h.size, 20);
        assert_eq!(h.header_len, 16);
        assert_eq!(h.payload_len(r.remaining()).unwrap(), 4);
    }

    #[test]
    fn header_to_end_sentinel() {
        let data = [0, 0, 0, 0, b'f', b'r', b'e', b'e', 9, 9];
        let mut r = ByteRangeReader::new(&data);
        let h = BoxHeader::parse(&mut r).unwrap();
        assert_eq!(h.size, 0);
        assert_eq!(h.payload_len(r.remaining()).unwrap(), 2);
    }

    #[test]
    fn uuid_extension_consumed() {
        let mut data = alloc::vec![0, 0, 0, 24, b'u', b'u', b'i', b'd'];
        data.extend_from_slice(&[0xAB; 16]);
        let mut r = ByteRangeReader::new(&data);
        let h = BoxHeader::parse(&mut r).unwrap();
        assert_eq!(h.uuid, Some([0xAB; 16]));
        assert_eq!(h.header_len, 24);
    }

    #[test]
    fn oversized_child_rejected() {
        // Declared size 100 inside a 16-byte file.
        let data = [0, 0, 0, 100, b'f', b'r', b'e', b'e', 0, 0, 0, 0, 0, 0, 0, 0];
        let err = read_file(&data, &Unstoppable).unwrap_err();
        let msg = alloc::format!("{err}");
        assert!(msg.contains("invalid box size") || msg.contains("security limit"));
    }

    #[test]
    fn unknown_box_kept_opaque() {
        let data = [0, 0, 0, 10, b'z', b'z', b'z', b'z', 7, 8];
        let boxes = read_file(&data, &Unstoppable).unwrap();
        assert_eq!(boxes.len(), 1);
        match &boxes[0].kind {
            BoxKind::Opaque(o) => {
                assert_eq!(o.box_type, FourCC(*b"zzzz"));
                assert_eq!(o.data, alloc::vec![7, 8]);
            }
            other => panic!("expected opaque, got {other:?}"),
        }
    }
}
