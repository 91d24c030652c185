//! Shared helpers: a synthetic container builder and a raw test codec.
#![allow(dead_code)]

use arrayvec::ArrayVec;
use heif_container::bmff::boxes::*;
use heif_container::codec::{CodecConfig, CodecRegistry, CompressionFormat, ImageDecoder};
use heif_container::image::{Channel, Colorspace, PlanarImage};
use heif_container::{finalize_and_write, Result};

/// Item type handled by [`RawDecoder`].
pub const RAW: FourCC = FourCC(*b"rawp");

/// Test decoder for a trivial format: u16 width, u16 height, then
/// width*height gray samples, expanded to 8-bit RGB.
pub struct RawDecoder;

impl ImageDecoder for RawDecoder {
    fn format(&self) -> CompressionFormat {
        CompressionFormat::Other(RAW)
    }

    fn decode(
        &self,
        data: &[u8],
        _config: Option<&CodecConfig<'_>>,
        _stop: &dyn enough::Stop,
    ) -> Result<PlanarImage> {
        let width = u32::from(u16::from_be_bytes([data[0], data[1]]));
        let height = u32::from(u16::from_be_bytes([data[2], data[3]]));
        let mut image = PlanarImage::new(width, height, Colorspace::Rgb);
        for channel in [Channel::R, Channel::G, Channel::B] {
            image.add_plane(channel, width, height, 8)?;
            let plane = image.plane_mut(channel).unwrap();
            for y in 0..height {
                for x in 0..width {
                    let at = 4 + (y * width + x) as usize;
                    plane.set_sample(x, y, u16::from(data[at]));
                }
            }
        }
        Ok(image)
    }
}

/// Registry with the raw test decoder installed.
pub fn registry() -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    registry.register_decoder(Box::new(RawDecoder));
    registry
}

/// Encode a gray image for [`RawDecoder`], sample = `f(x, y)`.
pub fn raw_payload(width: u16, height: u16, f: impl Fn(u16, u16) -> u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    for y in 0..height {
        for x in 0..width {
            out.push(f(x, y));
        }
    }
    out
}

/// Wire payload of a `grid` derived item (narrow form).
pub fn grid_payload(rows: u8, columns: u8, width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0, 0, rows - 1, columns - 1];
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out
}

/// Wire payload of an `iovl` derived item (narrow form).
pub fn overlay_payload(background: [u16; 4], width: u16, height: u16, offsets: &[(i16, i16)]) -> Vec<u8> {
    let mut out = vec![0, 0];
    for channel in background {
        out.extend_from_slice(&channel.to_be_bytes());
    }
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    for &(h, v) in offsets {
        out.extend_from_slice(&h.to_be_bytes());
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Assembles a one-`meta` container; item payloads live in `idat`.
pub struct MetaBuilder {
    primary: u32,
    infes: Vec<InfeBox>,
    iloc_items: Vec<IlocItem>,
    properties: Vec<BoxNode>,
    ipma: Vec<IpmaEntry>,
    references: Vec<ItemReference>,
    idat: Vec<u8>,
    with_pitm: bool,
}

impl MetaBuilder {
    pub fn new(primary: u32) -> Self {
        Self {
            primary,
            infes: Vec::new(),
            iloc_items: Vec::new(),
            properties: Vec::new(),
            ipma: Vec::new(),
            references: Vec::new(),
            idat: Vec::new(),
            with_pitm: true,
        }
    }

    pub fn without_pitm(mut self) -> Self {
        self.with_pitm = false;
        self
    }

    /// Add an item whose payload is stored in `idat` as one extent.
    pub fn add_item(&mut self, id: u32, item_type: FourCC, payload: &[u8]) -> &mut Self {
        self.add_item_extents(id, item_type, &[payload])
    }

    /// Add an item split over several `idat` extents.
    pub fn add_item_extents(&mut self, id: u32, item_type: FourCC, parts: &[&[u8]]) -> &mut Self {
        self.infes.push(InfeBox {
            full: FullBoxHeader { version: 2, flags: 0 },
            item_id: id,
            protection_index: 0,
            item_type: Some(item_type),
            name: String::new(),
            content_type: String::new(),
            content_encoding: String::new(),
            uri_type: String::new(),
        });
        let mut extents = ArrayVec::new();
        for part in parts {
            extents.push(IlocExtent {
                index: 0,
                offset: self.idat.len() as u64,
                length: part.len() as u64,
            });
            self.idat.extend_from_slice(part);
        }
        self.iloc_items.push(IlocItem {
            item_id: id,
            construction_method: ConstructionMethod::Idat,
            data_reference_index: 0,
            base_offset: 0,
            extents,
        });
        self
    }

    /// Mark the most recently added item hidden.
    pub fn hide_last(&mut self) -> &mut Self {
        if let Some(infe) = self.infes.last_mut() {
            infe.set_hidden(true);
        }
        self
    }

    /// Override the construction method of the most recent iloc item.
    pub fn construction_method_last(&mut self, method: ConstructionMethod) -> &mut Self {
        if let Some(item) = self.iloc_items.last_mut() {
            item.construction_method = method;
        }
        self
    }

    /// Add a property box to `ipco`; returns its 1-based index.
    pub fn add_property(&mut self, node: BoxNode) -> u16 {
        self.properties.push(node);
        self.properties.len() as u16
    }

    /// Associate a property index with an item.
    pub fn associate(&mut self, item_id: u32, property_index: u16, essential: bool) -> &mut Self {
        if let Some(entry) = self.ipma.iter_mut().find(|e| e.item_id == item_id) {
            entry.associations.push(PropertyAssociation {
                essential,
                property_index,
            });
        } else {
            self.ipma.push(IpmaEntry {
                item_id,
                associations: vec![PropertyAssociation {
                    essential,
                    property_index,
                }],
            });
        }
        self
    }

    /// Record one reference edge.
    pub fn reference(&mut self, ref_type: FourCC, from: u32, to: &[u32]) -> &mut Self {
        self.references.push(ItemReference {
            ref_type,
            from_item_id: from,
            to_item_ids: to.to_vec(),
        });
        self
    }

    /// Attach an `ispe` property to an item.
    pub fn with_size(&mut self, item_id: u32, width: u32, height: u32) -> &mut Self {
        let index = self.add_property(BoxNode::leaf(BoxKind::ImageExtents(IspeBox {
            full: FullBoxHeader { version: 0, flags: 0 },
            width,
            height,
        })));
        self.associate(item_id, index, false)
    }

    /// Serialize to file bytes.
    pub fn build(&self) -> Vec<u8> {
        let zero = FullBoxHeader { version: 0, flags: 0 };
        let mut meta_children = vec![BoxNode::leaf(BoxKind::Handler(HdlrBox {
            full: zero,
            handler_type: FourCC(*b"pict"),
            name: String::new(),
        }))];
        if self.with_pitm {
            meta_children.push(BoxNode::leaf(BoxKind::PrimaryItem(PitmBox {
                full: zero,
                item_id: self.primary,
            })));
        }
        meta_children.push(BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
            full: zero,
            items: self.iloc_items.clone(),
        })));
        meta_children.push(BoxNode::container(
            BoxKind::ItemInfo(IinfBox { full: zero }),
            self.infes
                .iter()
                .map(|infe| BoxNode::leaf(BoxKind::ItemInfoEntry(infe.clone())))
                .collect(),
        ));
        meta_children.push(BoxNode::container(
            BoxKind::ItemProperties,
            vec![
                BoxNode::container(BoxKind::PropertyContainer, self.properties.clone()),
                BoxNode::leaf(BoxKind::PropertyAssociations(IpmaBox {
                    full: zero,
                    entries: self.ipma.clone(),
                })),
            ],
        ));
        if !self.references.is_empty() {
            meta_children.push(BoxNode::leaf(BoxKind::ItemReferences(IrefBox {
                full: zero,
                references: self.references.clone(),
            })));
        }
        if !self.idat.is_empty() {
            meta_children.push(BoxNode::leaf(BoxKind::ItemData(IdatBox {
                data: self.idat.clone(),
            })));
        }

        let mut boxes = vec![
            BoxNode::leaf(BoxKind::FileType(FtypBox {
                major_brand: FourCC(*b"mif1"),
                minor_version: 0,
                compatible_brands: vec![FourCC(*b"mif1")],
            })),
            BoxNode::container(BoxKind::Meta(zero), meta_children),
        ];
        finalize_and_write(&mut boxes).unwrap()
    }
}
