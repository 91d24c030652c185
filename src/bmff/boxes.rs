//! ISOBMFF box data model
//!
//! The tree is a closed sum type over the box kinds this crate
//! understands, plus an opaque fallback that preserves unknown payloads
//! byte-for-byte. Full-box version/flags live on each typed struct so the
//! write path can recompute them (`derive_box_version`) without touching
//! the payload fields.

use crate::error::{HeifError, Result};
use crate::fraction::Fraction;
use alloc::string::String;
use alloc::vec::Vec;
use arrayvec::ArrayVec;
use whereat::At;

use super::reader::ByteRangeReader;
use super::{MAX_ILOC_EXTENTS_PER_ITEM, MAX_LARGE_BOX_SIZE};

/// Four-character code identifying a box, item, or reference type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// File type box
    pub const FTYP: Self = Self(*b"ftyp");
    /// Metadata container box
    pub const META: Self = Self(*b"meta");
    /// Handler reference box
    pub const HDLR: Self = Self(*b"hdlr");
    /// Primary item box
    pub const PITM: Self = Self(*b"pitm");
    /// Item location box
    pub const ILOC: Self = Self(*b"iloc");
    /// Item information box
    pub const IINF: Self = Self(*b"iinf");
    /// Item information entry box
    pub const INFE: Self = Self(*b"infe");
    /// Item properties box
    pub const IPRP: Self = Self(*b"iprp");
    /// Item property container box
    pub const IPCO: Self = Self(*b"ipco");
    /// Item property association box
    pub const IPMA: Self = Self(*b"ipma");
    /// Item reference box
    pub const IREF: Self = Self(*b"iref");
    /// Item data box
    pub const IDAT: Self = Self(*b"idat");
    /// Data information box
    pub const DINF: Self = Self(*b"dinf");
    /// Data reference box
    pub const DREF: Self = Self(*b"dref");
    /// Data entry URL box
    pub const URL: Self = Self(*b"url ");
    /// Group list box
    pub const GRPL: Self = Self(*b"grpl");
    /// Media data box
    pub const MDAT: Self = Self(*b"mdat");
    /// Free space box
    pub const FREE: Self = Self(*b"free");
    /// UUID extension box
    pub const UUID: Self = Self(*b"uuid");
    /// Image spatial extents property
    pub const ISPE: Self = Self(*b"ispe");
    /// Auxiliary type property
    pub const AUXC: Self = Self(*b"auxC");
    /// Image rotation property
    pub const IROT: Self = Self(*b"irot");
    /// Image mirror property
    pub const IMIR: Self = Self(*b"imir");
    /// Clean aperture property
    pub const CLAP: Self = Self(*b"clap");
    /// Pixel aspect ratio property
    pub const PASP: Self = Self(*b"pasp");
    /// Pixel information property
    pub const PIXI: Self = Self(*b"pixi");
    /// Color information property
    pub const COLR: Self = Self(*b"colr");
    /// HEVC decoder configuration property
    pub const HVCC: Self = Self(*b"hvcC");
    /// AV1 decoder configuration property
    pub const AV1C: Self = Self(*b"av1C");

    /// HEVC coded image item type
    pub const HVC1: Self = Self(*b"hvc1");
    /// AV1 coded image item type
    pub const AV01: Self = Self(*b"av01");
    /// Grid derived image item type
    pub const GRID: Self = Self(*b"grid");
    /// Overlay derived image item type
    pub const IOVL: Self = Self(*b"iovl");
    /// Identity derived image item type
    pub const IDEN: Self = Self(*b"iden");
    /// EXIF metadata item type
    pub const EXIF: Self = Self(*b"Exif");
    /// MIME item type
    pub const MIME: Self = Self(*b"mime");
    /// URI item type
    pub const URI: Self = Self(*b"uri ");

    /// Derived-image reference
    pub const DIMG: Self = Self(*b"dimg");
    /// Thumbnail reference
    pub const THMB: Self = Self(*b"thmb");
    /// Auxiliary image reference
    pub const AUXL: Self = Self(*b"auxl");
    /// Content-describes reference
    pub const CDSC: Self = Self(*b"cdsc");
    /// Premultiplied-alpha reference
    pub const PREM: Self = Self(*b"prem");

    /// nclx color profile tag
    pub const NCLX: Self = Self(*b"nclx");
    /// Restricted ICC profile tag
    pub const RICC: Self = Self(*b"rICC");
    /// Unrestricted ICC profile tag
    pub const PROF: Self = Self(*b"prof");

    /// Create from the first four bytes of a slice
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 4 {
            Some(Self([bytes[0], bytes[1], bytes[2], bytes[3]]))
        } else {
            None
        }
    }

    /// Convert to string for debugging
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl core::fmt::Display for FourCC {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed universal box preamble.
///
/// `size == 0` is kept as the "extends to end of container" sentinel;
/// [`BoxHeader::payload_len`] resolves it against the parent range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Total box size including the header, or 0 for "rest of container"
    pub size: u64,
    /// Box type
    pub box_type: FourCC,
    /// 16-byte extension present when `box_type` is `uuid`
    pub uuid: Option<[u8; 16]>,
    /// Bytes consumed while parsing this header
    pub header_len: u32,
}

impl BoxHeader {
    /// Parse the box preamble: size32 + fourcc, optional 64-bit size,
    /// optional uuid extension.
    pub fn parse(r: &mut ByteRangeReader<'_>) -> Result<Self> {
        let size32 = r.read_u32()?;
        let box_type = FourCC(r.read_fourcc()?);
        let mut header_len = 8u32;

        let size = if size32 == 1 {
            let large = r.read_u64()?;
            header_len += 8;
            if large > MAX_LARGE_BOX_SIZE {
                return Err(At::from(HeifError::LimitExceeded("box size")));
            }
            large
        } else {
            u64::from(size32)
        };

        let uuid = if box_type == FourCC::UUID {
            let b = r.read_bytes(16)?;
            header_len += 16;
            let mut ext = [0u8; 16];
            ext.copy_from_slice(b);
            Some(ext)
        } else {
            None
        };

        Ok(Self {
            size,
            box_type,
            uuid,
            header_len,
        })
    }

    /// Payload length in bytes, resolving the to-end sentinel against the
    /// bytes remaining in the parent after this header.
    pub fn payload_len(&self, remaining_after_header: usize) -> Result<u64> {
        if self.size == 0 {
            return Ok(remaining_after_header as u64);
        }
        self.size
            .checked_sub(u64::from(self.header_len))
            .ok_or_else(|| At::from(HeifError::InvalidBoxSize("size smaller than header")))
    }
}

/// The extra version/flags preamble shared by all full boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullBoxHeader {
    /// Box version
    pub version: u8,
    /// 24-bit box flags
    pub flags: u32,
}

impl FullBoxHeader {
    /// Read the 4-byte version/flags field.
    pub fn parse(r: &mut ByteRangeReader<'_>) -> Result<Self> {
        let word = r.read_u32()?;
        Ok(Self {
            version: (word >> 24) as u8,
            flags: word & 0x00FF_FFFF,
        })
    }
}

/// File type box (`ftyp`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtypBox {
    /// Major brand
    pub major_brand: FourCC,
    /// Minor version
    pub minor_version: u32,
    /// Compatible brands, in file order
    pub compatible_brands: Vec<FourCC>,
}

/// Handler reference box (`hdlr`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlrBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Handler type, `pict` for HEIF image collections
    pub handler_type: FourCC,
    /// Human-readable handler name
    pub name: String,
}

/// Primary item box (`pitm`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitmBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Primary item id
    pub item_id: u32,
}

/// How an item's extent offsets are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionMethod {
    /// Offsets are relative to the start of the file
    File,
    /// Offsets are relative to the content of the idat box
    Idat,
    /// A method this implementation does not interpret
    Other(u8),
}

impl ConstructionMethod {
    /// Wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::File => 0,
            Self::Idat => 1,
            Self::Other(c) => c,
        }
    }

    /// From a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::File,
            1 => Self::Idat,
            c => Self::Other(c),
        }
    }
}

/// One contiguous byte range of an item's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IlocExtent {
    /// Extent index (version 2 only, usually 0)
    pub index: u64,
    /// Offset relative to the item's base offset
    pub offset: u64,
    /// Extent length; 0 means "to end of the backing store"
    pub length: u64,
}

/// Per-item location record inside `iloc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlocItem {
    /// Item id
    pub item_id: u32,
    /// Offset interpretation
    pub construction_method: ConstructionMethod,
    /// Index into dref entries, 0 means "this file"
    pub data_reference_index: u16,
    /// Base offset added to every extent offset
    pub base_offset: u64,
    /// Extents in file order, capped at [`MAX_ILOC_EXTENTS_PER_ITEM`]
    pub extents: ArrayVec<IlocExtent, MAX_ILOC_EXTENTS_PER_ITEM>,
}

/// Item location box (`iloc`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlocBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Items in file order
    pub items: Vec<IlocItem>,
}

/// Item information box (`iinf`); its `infe` entries are tree children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IinfBox {
    /// Version and flags; version picks the entry-count width
    pub full: FullBoxHeader,
}

/// Item information entry (`infe`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfeBox {
    /// Version and flags; flags bit 0 is the hidden flag for version >= 2
    pub full: FullBoxHeader,
    /// Item id
    pub item_id: u32,
    /// Protection scheme index, 0 for unprotected
    pub protection_index: u16,
    /// Item type fourcc; absent when the wire field was 0 (version <= 1)
    pub item_type: Option<FourCC>,
    /// Item name
    pub name: String,
    /// MIME content type (item type `mime` only)
    pub content_type: String,
    /// MIME content encoding (item type `mime` only)
    pub content_encoding: String,
    /// URI type (item type `uri ` only)
    pub uri_type: String,
}

impl InfeBox {
    /// Hidden-item flag (flags bit 0, meaningful for version >= 2).
    #[must_use]
    pub fn hidden(&self) -> bool {
        self.full.version >= 2 && self.full.flags & 1 != 0
    }

    /// Set or clear the hidden-item flag.
    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden {
            self.full.flags |= 1;
        } else {
            self.full.flags &= !1;
        }
    }
}

/// One property association: 1-based index into the ipco list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAssociation {
    /// Readers must understand essential properties to use the item
    pub essential: bool,
    /// 1-based ipco index; 0 means "no property" and is skipped
    pub property_index: u16,
}

/// Associations of one item inside `ipma`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmaEntry {
    /// Item id
    pub item_id: u32,
    /// Ordered associations; order is semantically meaningful for
    /// transformative properties
    pub associations: Vec<PropertyAssociation>,
}

/// Item property association box (`ipma`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmaBox {
    /// Version and flags; flags bit 0 selects 15-bit property indices
    pub full: FullBoxHeader,
    /// Entries in file order
    pub entries: Vec<IpmaEntry>,
}

/// One typed directed edge set of the reference graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    /// Edge type (`dimg`, `thmb`, `auxl`, `cdsc`, `prem`, ...)
    pub ref_type: FourCC,
    /// Source item id
    pub from_item_id: u32,
    /// Referenced item ids, order is meaningful (grid tiles, overlays)
    pub to_item_ids: Vec<u32>,
}

/// Item reference box (`iref`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrefBox {
    /// Version and flags; version picks the item-id width
    pub full: FullBoxHeader,
    /// Reference records in file order
    pub references: Vec<ItemReference>,
}

/// Item data box (`idat`) holding inline item payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdatBox {
    /// Raw inline data addressed by construction-method-1 extents
    pub data: Vec<u8>,
}

/// Data reference box (`dref`); its entries are tree children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrefBox {
    /// Version and flags
    pub full: FullBoxHeader,
}

/// Data entry URL box (`url `)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBox {
    /// Version and flags; flags bit 0 means "data in this file"
    pub full: FullBoxHeader,
    /// Location, absent for self-contained entries
    pub location: Option<String>,
}

/// Image spatial extents property (`ispe`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspeBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Auxiliary type property (`auxC`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxcBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Null-terminated aux-type URN on the wire
    pub aux_type: String,
    /// Trailing subtype bytes after the URN terminator
    pub aux_subtype: Vec<u8>,
}

/// Image rotation property (`irot`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrotBox {
    /// Counter-clockwise quarter turns, 0..=3
    pub angle: u8,
}

impl IrotBox {
    /// Rotation in degrees counter-clockwise.
    #[must_use]
    pub fn degrees(self) -> u16 {
        u16::from(self.angle & 0x03) * 90
    }
}

/// Mirror axis for `imir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAxis {
    /// Flip around the vertical axis (left-right)
    Vertical,
    /// Flip around the horizontal axis (top-bottom)
    Horizontal,
}

/// Image mirror property (`imir`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImirBox {
    /// Mirror axis
    pub axis: MirrorAxis,
}

/// Clean aperture property (`clap`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClapBox {
    /// Aperture width
    pub width: Fraction,
    /// Aperture height
    pub height: Fraction,
    /// Horizontal offset of the aperture center from the image center
    pub horizontal_offset: Fraction,
    /// Vertical offset of the aperture center from the image center
    pub vertical_offset: Fraction,
}

/// Pixel aspect ratio property (`pasp`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaspBox {
    /// Horizontal spacing
    pub h_spacing: u32,
    /// Vertical spacing
    pub v_spacing: u32,
}

/// Pixel information property (`pixi`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixiBox {
    /// Version and flags
    pub full: FullBoxHeader,
    /// Bits per channel, one entry per channel
    pub bits_per_channel: Vec<u8>,
}

/// Decoded color profile from a `colr` box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorProfile {
    /// Compact numeric color description
    Nclx {
        /// Color primaries code
        color_primaries: u16,
        /// Transfer characteristics code
        transfer_characteristics: u16,
        /// Matrix coefficients code
        matrix_coefficients: u16,
        /// Full range flag
        full_range: bool,
    },
    /// Opaque ICC profile bytes
    Icc {
        /// Profile tag, `prof` or `rICC`
        tag: FourCC,
        /// Raw ICC bytes
        data: Vec<u8>,
    },
}

/// Color information property (`colr`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColrBox {
    /// Decoded profile
    pub profile: ColorProfile,
}

/// One NAL-unit array inside `hvcC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvccNalArray {
    /// All NAL units of this type are in this array
    pub array_completeness: bool,
    /// NAL unit type (VPS=32, SPS=33, PPS=34, ...)
    pub nal_unit_type: u8,
    /// Length-prefixed NAL unit payloads
    pub nal_units: Vec<Vec<u8>>,
}

/// HEVC decoder configuration property (`hvcC`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvccBox {
    /// Configuration version, always 1
    pub config_version: u8,
    /// General profile space
    pub general_profile_space: u8,
    /// General tier flag
    pub general_tier_flag: bool,
    /// General profile IDC
    pub general_profile_idc: u8,
    /// General profile compatibility flags
    pub general_profile_compatibility_flags: u32,
    /// General constraint indicator flags (48 bits)
    pub general_constraint_indicator_flags: u64,
    /// General level IDC
    pub general_level_idc: u8,
    /// Minimum spatial segmentation (12 bits)
    pub min_spatial_segmentation_idc: u16,
    /// Parallelism type (2 bits)
    pub parallelism_type: u8,
    /// Chroma format IDC (2 bits)
    pub chroma_format: u8,
    /// Luma bit depth minus 8 (3 bits)
    pub bit_depth_luma_minus8: u8,
    /// Chroma bit depth minus 8 (3 bits)
    pub bit_depth_chroma_minus8: u8,
    /// Average frame rate
    pub avg_frame_rate: u16,
    /// Constant frame rate (2 bits)
    pub constant_frame_rate: u8,
    /// Number of temporal layers (3 bits)
    pub num_temporal_layers: u8,
    /// Temporal id nesting flag
    pub temporal_id_nested: bool,
    /// NAL length field size minus one (2 bits)
    pub length_size_minus_one: u8,
    /// Parameter-set arrays
    pub arrays: Vec<HvccNalArray>,
}

/// AV1 decoder configuration property (`av1C`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Av1cBox {
    /// Sequence profile (3 bits)
    pub seq_profile: u8,
    /// Sequence level index (5 bits)
    pub seq_level_idx_0: u8,
    /// Sequence tier flag
    pub seq_tier_0: bool,
    /// High bit depth flag
    pub high_bitdepth: bool,
    /// Twelve-bit flag
    pub twelve_bit: bool,
    /// Monochrome flag
    pub monochrome: bool,
    /// Chroma subsampling in x
    pub chroma_subsampling_x: bool,
    /// Chroma subsampling in y
    pub chroma_subsampling_y: bool,
    /// Chroma sample position (2 bits)
    pub chroma_sample_position: u8,
    /// Initial presentation delay minus one, when signalled
    pub initial_presentation_delay: Option<u8>,
    /// Trailing configuration OBUs, opaque to this crate
    pub config_obus: Vec<u8>,
}

/// Media data box (`mdat`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MdatBox {
    /// Raw payload bytes
    pub data: Vec<u8>,
}

/// A box this implementation has no codec for; payload kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBox {
    /// Box type
    pub box_type: FourCC,
    /// UUID extension when `box_type` is `uuid`
    pub uuid: Option<[u8; 16]>,
    /// Raw payload bytes
    pub data: Vec<u8>,
}

/// Decoded content of one box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxKind {
    /// `ftyp`
    FileType(FtypBox),
    /// `meta` full-box container
    Meta(FullBoxHeader),
    /// `hdlr`
    Handler(HdlrBox),
    /// `pitm`
    PrimaryItem(PitmBox),
    /// `iloc`
    ItemLocation(IlocBox),
    /// `iinf` container of `infe` children
    ItemInfo(IinfBox),
    /// `infe`
    ItemInfoEntry(InfeBox),
    /// `iprp` container
    ItemProperties,
    /// `ipco` container
    PropertyContainer,
    /// `ipma`
    PropertyAssociations(IpmaBox),
    /// `iref`
    ItemReferences(IrefBox),
    /// `idat`
    ItemData(IdatBox),
    /// `dinf` container
    DataInformation,
    /// `dref` container of data entries
    DataReference(DrefBox),
    /// `url `
    DataEntryUrl(UrlBox),
    /// `grpl` container
    GroupList,
    /// `ispe`
    ImageExtents(IspeBox),
    /// `auxC`
    AuxiliaryType(AuxcBox),
    /// `irot`
    Rotation(IrotBox),
    /// `imir`
    Mirror(ImirBox),
    /// `clap`
    CleanAperture(ClapBox),
    /// `pasp`
    PixelAspect(PaspBox),
    /// `pixi`
    PixelInfo(PixiBox),
    /// `colr`
    ColorInfo(ColrBox),
    /// `hvcC`
    HevcConfig(HvccBox),
    /// `av1C`
    Av1Config(Av1cBox),
    /// `mdat`
    MediaData(MdatBox),
    /// Unknown or deliberately unparsed box
    Opaque(OpaqueBox),
}

/// One node of the parsed box tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxNode {
    /// Decoded content
    pub kind: BoxKind,
    /// Child boxes in encounter order (containers only)
    pub children: Vec<BoxNode>,
}

impl BoxNode {
    /// Leaf node with no children.
    #[must_use]
    pub fn leaf(kind: BoxKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Container node.
    #[must_use]
    pub fn container(kind: BoxKind, children: Vec<BoxNode>) -> Self {
        Self { kind, children }
    }

    /// The node's box type.
    #[must_use]
    pub fn fourcc(&self) -> FourCC {
        match &self.kind {
            BoxKind::FileType(_) => FourCC::FTYP,
            BoxKind::Meta(_) => FourCC::META,
            BoxKind::Handler(_) => FourCC::HDLR,
            BoxKind::PrimaryItem(_) => FourCC::PITM,
            BoxKind::ItemLocation(_) => FourCC::ILOC,
            BoxKind::ItemInfo(_) => FourCC::IINF,
            BoxKind::ItemInfoEntry(_) => FourCC::INFE,
            BoxKind::ItemProperties => FourCC::IPRP,
            BoxKind::PropertyContainer => FourCC::IPCO,
            BoxKind::PropertyAssociations(_) => FourCC::IPMA,
            BoxKind::ItemReferences(_) => FourCC::IREF,
            BoxKind::ItemData(_) => FourCC::IDAT,
            BoxKind::DataInformation => FourCC::DINF,
            BoxKind::DataReference(_) => FourCC::DREF,
            BoxKind::DataEntryUrl(_) => FourCC::URL,
            BoxKind::GroupList => FourCC::GRPL,
            BoxKind::ImageExtents(_) => FourCC::ISPE,
            BoxKind::AuxiliaryType(_) => FourCC::AUXC,
            BoxKind::Rotation(_) => FourCC::IROT,
            BoxKind::Mirror(_) => FourCC::IMIR,
            BoxKind::CleanAperture(_) => FourCC::CLAP,
            BoxKind::PixelAspect(_) => FourCC::PASP,
            BoxKind::PixelInfo(_) => FourCC::PIXI,
            BoxKind::ColorInfo(_) => FourCC::COLR,
            BoxKind::HevcConfig(_) => FourCC::HVCC,
            BoxKind::Av1Config(_) => FourCC::AV1C,
            BoxKind::MediaData(_) => FourCC::MDAT,
            BoxKind::Opaque(o) => o.box_type,
        }
    }

    /// First child with the given type.
    #[must_use]
    pub fn child(&self, fourcc: FourCC) -> Option<&BoxNode> {
        self.children.iter().find(|c| c.fourcc() == fourcc)
    }

    /// All children with the given type.
    pub fn children_of_type(&self, fourcc: FourCC) -> impl Iterator<Item = &BoxNode> {
        self.children.iter().filter(move |c| c.fourcc() == fourcc)
    }
}
