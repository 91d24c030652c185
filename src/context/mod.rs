//! Container interpretation: items, properties, and the reference graph
//!
//! [`HeifContext`] digests a parsed box tree into an item index and
//! classifies every item by walking the `iref` edges once: top-level,
//! hidden, thumbnail-of, alpha/depth/generic-auxiliary-of. Cross links
//! between images are always id lookups into a shared map, never
//! pointers; adversarial files can encode arbitrary reference graphs
//! including cycles, and id lookups keep cycle detection a simple
//! visited-set check during resolution.

mod derived;

pub use derived::{GridDescriptor, OverlayDescriptor};

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use log::warn;
use whereat::At;

use crate::bmff::boxes::*;
use crate::bmff::parse::read_file;
use crate::bmff::reader::ByteRangeReader;
use crate::codec::CodecRegistry;
use crate::error::{check_stop, HeifError, Result};
use crate::image::PlanarImage;

/// Ceiling on derived-image chains (grid of iden of grid of ...).
pub const MAX_DERIVATION_DEPTH: u32 = 8;

/// Alpha-channel auxiliary type URNs this crate recognizes.
pub const ALPHA_AUX_URNS: [&str; 2] = [
    "urn:mpeg:hevc:2015:auxid:1",
    "urn:mpeg:mpegB:cicp:systems:auxiliary:alpha",
];

/// Depth-channel auxiliary type URN.
pub const DEPTH_AUX_URN: &str = "urn:mpeg:hevc:2015:auxid:2";

/// Behavior knobs for image resolution.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Skip the rotate/mirror/crop transform stage
    pub ignore_transforms: bool,
    /// Worker threads for grid tiles; 1 decodes sequentially
    pub max_workers: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            ignore_transforms: false,
            max_workers: 1,
        }
    }
}

/// Classification of one item after the reference walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// A presentable image in its own right
    TopLevel,
    /// Thumbnail attached to a master image
    Thumbnail {
        /// The image this is a thumbnail of
        master: u32,
    },
    /// Alpha channel of a master image, absorbed at decode time
    Alpha {
        /// The image receiving this alpha plane
        master: u32,
    },
    /// Depth map of a master image
    Depth {
        /// The image this depth map belongs to
        master: u32,
    },
    /// Generic auxiliary image of a master
    Auxiliary {
        /// The image this auxiliary belongs to
        master: u32,
    },
    /// Non-image item (Exif, MIME, URI payloads)
    Metadata,
    /// Item present but not interpretable (unknown construction method)
    Unsupported,
}

/// Interpreter-level view of one item.
#[derive(Debug, Clone)]
pub struct LogicalImage {
    /// Item id
    pub id: u32,
    /// Flagged primary by `pitm`
    pub primary: bool,
    /// Hidden flag from `infe`
    pub hidden: bool,
    /// Classification from the reference walk
    pub role: ItemRole,
    /// Declared pixel size from `ispe`, when present
    pub resolution: Option<(u32, u32)>,
    /// Thumbnail item ids attached to this image
    pub thumbnails: Vec<u32>,
    /// Generic auxiliary item ids attached to this image
    pub aux_images: Vec<u32>,
    /// Alpha auxiliary attached to this image
    pub alpha_image: Option<u32>,
    /// Depth auxiliary attached to this image
    pub depth_image: Option<u32>,
    /// Color planes are premultiplied by the attached alpha (`prem` edge)
    pub premultiplied_alpha: bool,
}

impl LogicalImage {
    fn new(id: u32, hidden: bool, role: ItemRole) -> Self {
        Self {
            id,
            primary: false,
            hidden,
            role,
            resolution: None,
            thumbnails: Vec::new(),
            aux_images: Vec::new(),
            alpha_image: None,
            depth_image: None,
            premultiplied_alpha: false,
        }
    }
}

/// One indexed item: `infe` identity plus its `iloc` location.
#[derive(Debug, Clone)]
pub struct ItemEntry {
    /// Item id
    pub id: u32,
    /// Item type fourcc, absent for old version-0 entries
    pub item_type: Option<FourCC>,
    /// Item name
    pub name: String,
    /// MIME content type
    pub content_type: String,
    /// Location record, absent for items without data
    pub location: Option<IlocItem>,
}

/// Interpreted container over borrowed file bytes.
#[derive(Debug)]
pub struct HeifContext<'a> {
    data: &'a [u8],
    /// Parsed top-level box tree, kept for re-serialization and dumping
    pub boxes: Vec<BoxNode>,
    primary_item_id: u32,
    items: BTreeMap<u32, ItemEntry>,
    properties: Vec<BoxNode>,
    associations: Vec<IpmaEntry>,
    references: Vec<ItemReference>,
    idat: Vec<u8>,
    images: BTreeMap<u32, LogicalImage>,
}

impl<'a> HeifContext<'a> {
    /// Parse and interpret a container held in memory.
    pub fn from_bytes(data: &'a [u8], stop: &dyn enough::Stop) -> Result<Self> {
        let boxes = read_file(data, stop)?;
        Self::from_boxes(data, boxes, stop)
    }

    /// Interpret an already-parsed box tree over its source bytes.
    pub fn from_boxes(
        data: &'a [u8],
        boxes: Vec<BoxNode>,
        stop: &dyn enough::Stop,
    ) -> Result<Self> {
        check_stop(stop)?;
        let meta = boxes
            .iter()
            .find(|b| b.fourcc() == FourCC::META)
            .ok_or(At::from(HeifError::InvalidData("no meta box")))?;

        let primary_item_id = match meta.child(FourCC::PITM).map(|n| &n.kind) {
            Some(BoxKind::PrimaryItem(pitm)) => pitm.item_id,
            _ => return Err(At::from(HeifError::NoPrimaryItem)),
        };

        let mut items = BTreeMap::new();
        if let Some(iinf) = meta.child(FourCC::IINF) {
            for infe in iinf.children_of_type(FourCC::INFE) {
                if let BoxKind::ItemInfoEntry(e) = &infe.kind {
                    let entry = ItemEntry {
                        id: e.item_id,
                        item_type: e.item_type,
                        name: e.name.clone(),
                        content_type: e.content_type.clone(),
                        location: None,
                    };
                    if items.insert(e.item_id, (entry, e.hidden())).is_some() {
                        return Err(At::from(HeifError::InvalidData("duplicate item id")));
                    }
                }
            }
        }

        if let Some(BoxKind::ItemLocation(iloc)) = meta.child(FourCC::ILOC).map(|n| &n.kind) {
            for loc in &iloc.items {
                if let Some((entry, _)) = items.get_mut(&loc.item_id) {
                    if entry.location.is_some() {
                        return Err(At::from(HeifError::InvalidData("duplicate iloc item id")));
                    }
                    entry.location = Some(loc.clone());
                }
            }
        }

        let mut properties = Vec::new();
        let mut associations = Vec::new();
        if let Some(iprp) = meta.child(FourCC::IPRP) {
            if let Some(ipco) = iprp.child(FourCC::IPCO) {
                properties = ipco.children.clone();
            }
            for node in iprp.children_of_type(FourCC::IPMA) {
                if let BoxKind::PropertyAssociations(ipma) = &node.kind {
                    associations.extend(ipma.entries.iter().cloned());
                }
            }
        }

        let references = match meta.child(FourCC::IREF).map(|n| &n.kind) {
            Some(BoxKind::ItemReferences(iref)) => iref.references.clone(),
            _ => Vec::new(),
        };

        let idat = match meta.child(FourCC::IDAT).map(|n| &n.kind) {
            Some(BoxKind::ItemData(b)) => b.data.clone(),
            _ => Vec::new(),
        };

        let mut ctx = Self {
            data,
            boxes,
            primary_item_id,
            items: items
                .iter()
                .map(|(&id, (entry, _))| (id, entry.clone()))
                .collect(),
            properties,
            associations,
            references,
            idat,
            images: BTreeMap::new(),
        };
        ctx.classify(&items)?;
        Ok(ctx)
    }

    /// Build the id → LogicalImage map and walk the reference graph once.
    fn classify(&mut self, raw: &BTreeMap<u32, (ItemEntry, bool)>) -> Result<()> {
        for (&id, (entry, hidden)) in raw {
            let role = match entry.item_type {
                Some(FourCC::EXIF | FourCC::MIME | FourCC::URI) => ItemRole::Metadata,
                _ => match entry.location.as_ref().map(|l| l.construction_method) {
                    Some(ConstructionMethod::Other(m)) => {
                        warn!("item {id} uses construction method {m}, skipping");
                        ItemRole::Unsupported
                    }
                    _ => ItemRole::TopLevel,
                },
            };
            let mut image = LogicalImage::new(id, *hidden, role);
            image.resolution = self.ispe(id).map(|e| (e.width, e.height));
            self.images.insert(id, image);
        }

        for reference in &self.references.clone() {
            match reference.ref_type {
                FourCC::THMB => self.attach_thumbnail(reference)?,
                FourCC::AUXL => self.attach_auxiliary(reference)?,
                FourCC::PREM => self.mark_premultiplied(reference)?,
                FourCC::CDSC => {
                    // Metadata-describes; the describing item is not an image.
                    if let Some(img) = self.images.get_mut(&reference.from_item_id) {
                        img.role = ItemRole::Metadata;
                    }
                }
                _ => {}
            }
        }

        match self.images.get_mut(&self.primary_item_id) {
            Some(primary) if primary.role != ItemRole::Metadata => primary.primary = true,
            _ => return Err(At::from(HeifError::NoPrimaryItem)),
        }
        Ok(())
    }

    fn single_target(&self, reference: &ItemReference) -> Result<u32> {
        if reference.to_item_ids.len() != 1 {
            return Err(At::from(HeifError::InvalidData(
                "reference needs exactly one target",
            )));
        }
        let to = reference.to_item_ids[0];
        if reference.from_item_id == to {
            return Err(At::from(HeifError::RecursiveReference(to)));
        }
        if !self.images.contains_key(&reference.from_item_id) {
            return Err(At::from(HeifError::NonexistentItem(reference.from_item_id)));
        }
        if !self.images.contains_key(&to) {
            return Err(At::from(HeifError::NonexistentItem(to)));
        }
        Ok(to)
    }

    fn attach_thumbnail(&mut self, reference: &ItemReference) -> Result<()> {
        let master = self.single_target(reference)?;
        let thumb = reference.from_item_id;
        if matches!(
            self.images[&master].role,
            ItemRole::Thumbnail { .. }
        ) {
            return Err(At::from(HeifError::InvalidData("thumbnail of a thumbnail")));
        }
        if let Some(img) = self.images.get_mut(&thumb) {
            img.role = ItemRole::Thumbnail { master };
        }
        if let Some(img) = self.images.get_mut(&master) {
            img.thumbnails.push(thumb);
        }
        Ok(())
    }

    fn attach_auxiliary(&mut self, reference: &ItemReference) -> Result<()> {
        let master = self.single_target(reference)?;
        let aux = reference.from_item_id;
        let aux_type = self
            .auxc(aux)
            .ok_or(At::from(HeifError::MissingProperty(
                "auxiliary item without auxC",
            )))?
            .aux_type
            .clone();

        let same_resolution = {
            let a = self.images[&aux].resolution;
            let m = self.images[&master].resolution;
            a.is_some() && a == m
        };

        let role = if ALPHA_AUX_URNS.contains(&aux_type.as_str()) && same_resolution {
            ItemRole::Alpha { master }
        } else if aux_type == DEPTH_AUX_URN {
            ItemRole::Depth { master }
        } else {
            ItemRole::Auxiliary { master }
        };

        if let Some(img) = self.images.get_mut(&aux) {
            img.role = role;
        }
        if let Some(img) = self.images.get_mut(&master) {
            match role {
                ItemRole::Alpha { .. } => img.alpha_image = Some(aux),
                ItemRole::Depth { .. } => img.depth_image = Some(aux),
                _ => img.aux_images.push(aux),
            }
        }
        Ok(())
    }

    fn mark_premultiplied(&mut self, reference: &ItemReference) -> Result<()> {
        let _alpha = self.single_target(reference)?;
        if let Some(img) = self.images.get_mut(&reference.from_item_id) {
            img.premultiplied_alpha = true;
        }
        Ok(())
    }

    /// The primary item id.
    #[must_use]
    pub fn primary_item_id(&self) -> u32 {
        self.primary_item_id
    }

    /// All interpreted images, keyed by item id.
    #[must_use]
    pub fn images(&self) -> &BTreeMap<u32, LogicalImage> {
        &self.images
    }

    /// One interpreted image.
    #[must_use]
    pub fn image(&self, id: u32) -> Option<&LogicalImage> {
        self.images.get(&id)
    }

    /// One indexed item.
    #[must_use]
    pub fn item(&self, id: u32) -> Option<&ItemEntry> {
        self.items.get(&id)
    }

    /// Presentable images: not hidden, not absorbed by a master.
    #[must_use]
    pub fn top_level_image_ids(&self) -> Vec<u32> {
        self.images
            .values()
            .filter(|img| img.role == ItemRole::TopLevel && !img.hidden)
            .map(|img| img.id)
            .collect()
    }

    /// Properties associated with an item, in `ipma` order.
    ///
    /// Association index 0 means "no property" and is skipped; an index
    /// past the end of the `ipco` list is logged and skipped rather than
    /// failing the whole document.
    pub fn properties_for(&self, item_id: u32) -> Vec<(&BoxNode, bool)> {
        let mut out = Vec::new();
        for entry in self.associations.iter().filter(|e| e.item_id == item_id) {
            for assoc in &entry.associations {
                if assoc.property_index == 0 {
                    continue;
                }
                match self.properties.get(usize::from(assoc.property_index) - 1) {
                    Some(p) => out.push((p, assoc.essential)),
                    None => warn!(
                        "item {item_id} references property {} beyond ipco",
                        assoc.property_index
                    ),
                }
            }
        }
        out
    }

    /// The item's spatial extents property.
    #[must_use]
    pub fn ispe(&self, item_id: u32) -> Option<&IspeBox> {
        self.properties_for(item_id).into_iter().find_map(|(p, _)| {
            match &p.kind {
                BoxKind::ImageExtents(b) => Some(b),
                _ => None,
            }
        })
    }

    /// The item's auxiliary-type property.
    #[must_use]
    pub fn auxc(&self, item_id: u32) -> Option<&AuxcBox> {
        self.properties_for(item_id).into_iter().find_map(|(p, _)| {
            match &p.kind {
                BoxKind::AuxiliaryType(b) => Some(b),
                _ => None,
            }
        })
    }

    /// The item's HEVC decoder configuration.
    #[must_use]
    pub fn hvcc(&self, item_id: u32) -> Option<&HvccBox> {
        self.properties_for(item_id).into_iter().find_map(|(p, _)| {
            match &p.kind {
                BoxKind::HevcConfig(b) => Some(b),
                _ => None,
            }
        })
    }

    /// The item's AV1 decoder configuration.
    #[must_use]
    pub fn av1c(&self, item_id: u32) -> Option<&Av1cBox> {
        self.properties_for(item_id).into_iter().find_map(|(p, _)| {
            match &p.kind {
                BoxKind::Av1Config(b) => Some(b),
                _ => None,
            }
        })
    }

    /// The item's color profile property.
    #[must_use]
    pub fn color_profile(&self, item_id: u32) -> Option<&ColorProfile> {
        self.properties_for(item_id).into_iter().find_map(|(p, _)| {
            match &p.kind {
                BoxKind::ColorInfo(b) => Some(&b.profile),
                _ => None,
            }
        })
    }

    /// Transform properties of an item. Regardless of their order in
    /// `ipma`, the container semantics fix application order as
    /// rotate, then mirror, then crop.
    #[must_use]
    pub fn transforms(&self, item_id: u32) -> (Option<IrotBox>, Option<ImirBox>, Option<ClapBox>) {
        let mut rotate = None;
        let mut mirror = None;
        let mut crop = None;
        for (p, _) in self.properties_for(item_id) {
            match &p.kind {
                BoxKind::Rotation(b) => rotate = Some(*b),
                BoxKind::Mirror(b) => mirror = Some(*b),
                BoxKind::CleanAperture(b) => crop = Some(*b),
                _ => {}
            }
        }
        (rotate, mirror, crop)
    }

    /// Target ids of the item's `dimg` (derives-from) edge, if any.
    #[must_use]
    pub fn derivation_sources(&self, item_id: u32) -> Option<&[u32]> {
        self.references
            .iter()
            .find(|r| r.ref_type == FourCC::DIMG && r.from_item_id == item_id)
            .map(|r| r.to_item_ids.as_slice())
    }

    /// Concatenated data bytes of an item, resolved through its extents.
    ///
    /// Construction method 0 reads file-absolute ranges, method 1 reads
    /// from the `idat` box content. An extent length of 0 means "to the
    /// end of the backing store".
    pub fn item_data(&self, item_id: u32) -> Result<Vec<u8>> {
        let entry = self
            .items
            .get(&item_id)
            .ok_or(At::from(HeifError::NonexistentItem(item_id)))?;
        let loc = entry
            .location
            .as_ref()
            .ok_or(At::from(HeifError::InvalidData("item has no location")))?;
        if loc.data_reference_index != 0 {
            return Err(At::from(HeifError::Unsupported(
                "external data references",
            )));
        }
        let store: &[u8] = match loc.construction_method {
            ConstructionMethod::File => self.data,
            ConstructionMethod::Idat => &self.idat,
            ConstructionMethod::Other(_) => {
                return Err(At::from(HeifError::Unsupported("construction method")));
            }
        };

        let reader = ByteRangeReader::new(store);
        let mut out = Vec::new();
        for extent in &loc.extents {
            let start = loc
                .base_offset
                .checked_add(extent.offset)
                .ok_or(At::from(HeifError::Truncated("extent offset beyond store")))?;
            let length = if extent.length == 0 {
                (store.len() as u64)
                    .checked_sub(start)
                    .ok_or(At::from(HeifError::Truncated("extent offset beyond store")))?
            } else {
                extent.length
            };
            let mut window = reader.window(start, length)?;
            out.extend_from_slice(&window.read_remaining());
        }
        Ok(out)
    }

    /// Resolve an item into pixels: coded items go through the registry,
    /// derived items (grid/overlay/identity) are composed recursively,
    /// then transforms are applied and any alpha/depth auxiliary is
    /// absorbed into the result.
    pub fn decode_image(
        &self,
        item_id: u32,
        registry: &CodecRegistry,
        options: &DecodeOptions,
        stop: &(dyn enough::Stop + Sync),
    ) -> Result<PlanarImage> {
        let resolver = derived::Resolver {
            ctx: self,
            registry,
            options,
            stop,
        };
        let mut visited = BTreeSet::new();
        resolver.resolve(item_id, 0, &mut visited)
    }

    /// Decode the primary image.
    pub fn decode_primary_image(
        &self,
        registry: &CodecRegistry,
        options: &DecodeOptions,
        stop: &(dyn enough::Stop + Sync),
    ) -> Result<PlanarImage> {
        self.decode_image(self.primary_item_id, registry, options, stop)
    }
}
