//! Write-then-parse equality over a representative box tree, plus the
//! version/width minimality rules of the serializer.

mod common;

use arrayvec::ArrayVec;
use enough::Unstoppable;
use heif_container::bmff::boxes::*;
use heif_container::{derive_box_version, finalize_and_write, read_file, Fraction};

fn full(version: u8, flags: u32) -> FullBoxHeader {
    FullBoxHeader { version, flags }
}

fn iloc_item(id: u32, method: ConstructionMethod, extents: &[(u64, u64)]) -> IlocItem {
    let mut list = ArrayVec::new();
    for &(offset, length) in extents {
        list.push(IlocExtent {
            index: 0,
            offset,
            length,
        });
    }
    IlocItem {
        item_id: id,
        construction_method: method,
        data_reference_index: 0,
        base_offset: 0,
        extents: list,
    }
}

fn representative_tree() -> Vec<BoxNode> {
    let zero = full(0, 0);
    let properties = vec![
        BoxNode::leaf(BoxKind::ImageExtents(IspeBox {
            full: zero,
            width: 640,
            height: 480,
        })),
        BoxNode::leaf(BoxKind::Rotation(IrotBox { angle: 3 })),
        BoxNode::leaf(BoxKind::Mirror(ImirBox {
            axis: MirrorAxis::Horizontal,
        })),
        BoxNode::leaf(BoxKind::CleanAperture(ClapBox {
            width: Fraction::new(600, 1).unwrap(),
            height: Fraction::new(400, 1).unwrap(),
            horizontal_offset: Fraction::new(-3, 2).unwrap(),
            vertical_offset: Fraction::new(5, 2).unwrap(),
        })),
        BoxNode::leaf(BoxKind::PixelAspect(PaspBox {
            h_spacing: 1,
            v_spacing: 1,
        })),
        BoxNode::leaf(BoxKind::PixelInfo(PixiBox {
            full: zero,
            bits_per_channel: vec![8, 8, 8],
        })),
        BoxNode::leaf(BoxKind::ColorInfo(ColrBox {
            profile: ColorProfile::Nclx {
                color_primaries: 1,
                transfer_characteristics: 13,
                matrix_coefficients: 6,
                full_range: true,
            },
        })),
        BoxNode::leaf(BoxKind::ColorInfo(ColrBox {
            profile: ColorProfile::Icc {
                tag: FourCC::PROF,
                data: vec![1, 2, 3, 4, 5],
            },
        })),
        BoxNode::leaf(BoxKind::AuxiliaryType(AuxcBox {
            full: zero,
            aux_type: "urn:mpeg:hevc:2015:auxid:1".into(),
            aux_subtype: vec![9, 9],
        })),
        BoxNode::leaf(BoxKind::HevcConfig(HvccBox {
            config_version: 1,
            general_profile_space: 0,
            general_tier_flag: false,
            general_profile_idc: 1,
            general_profile_compatibility_flags: 0x6000_0000,
            general_constraint_indicator_flags: 0xB000_0000_0000,
            general_level_idc: 93,
            min_spatial_segmentation_idc: 0,
            parallelism_type: 0,
            chroma_format: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            avg_frame_rate: 0,
            constant_frame_rate: 0,
            num_temporal_layers: 1,
            temporal_id_nested: true,
            length_size_minus_one: 3,
            arrays: vec![HvccNalArray {
                array_completeness: true,
                nal_unit_type: 33,
                nal_units: vec![vec![0x42, 0x01, 0x01], vec![0x44]],
            }],
        })),
        BoxNode::leaf(BoxKind::Av1Config(Av1cBox {
            seq_profile: 0,
            seq_level_idx_0: 8,
            seq_tier_0: false,
            high_bitdepth: false,
            twelve_bit: false,
            monochrome: false,
            chroma_subsampling_x: true,
            chroma_subsampling_y: true,
            chroma_sample_position: 0,
            initial_presentation_delay: Some(3),
            config_obus: vec![0x0A, 0x0B],
        })),
    ];

    let infes = vec![
        BoxNode::leaf(BoxKind::ItemInfoEntry(InfeBox {
            full: full(2, 0),
            item_id: 1,
            protection_index: 0,
            item_type: Some(FourCC::HVC1),
            name: "main".into(),
            content_type: String::new(),
            content_encoding: String::new(),
            uri_type: String::new(),
        })),
        BoxNode::leaf(BoxKind::ItemInfoEntry(InfeBox {
            full: full(2, 0),
            item_id: 2,
            protection_index: 0,
            item_type: Some(FourCC::MIME),
            name: "xmp".into(),
            content_type: "application/rdf+xml".into(),
            content_encoding: String::new(),
            uri_type: String::new(),
        })),
    ];

    let meta_children = vec![
        BoxNode::leaf(BoxKind::Handler(HdlrBox {
            full: zero,
            handler_type: FourCC(*b"pict"),
            name: "pict".into(),
        })),
        BoxNode::leaf(BoxKind::PrimaryItem(PitmBox {
            full: zero,
            item_id: 1,
        })),
        BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
            full: zero,
            items: vec![
                iloc_item(1, ConstructionMethod::File, &[(1, 70_000)]),
                iloc_item(2, ConstructionMethod::File, &[(1, 2), (3, 4)]),
            ],
        })),
        BoxNode::container(
            BoxKind::ItemInfo(IinfBox { full: zero }),
            infes,
        ),
        BoxNode::container(
            BoxKind::ItemProperties,
            vec![
                BoxNode::container(BoxKind::PropertyContainer, properties),
                BoxNode::leaf(BoxKind::PropertyAssociations(IpmaBox {
                    full: zero,
                    entries: vec![IpmaEntry {
                        item_id: 1,
                        associations: vec![
                            PropertyAssociation {
                                essential: false,
                                property_index: 1,
                            },
                            PropertyAssociation {
                                essential: true,
                                property_index: 10,
                            },
                        ],
                    }],
                })),
            ],
        ),
        BoxNode::leaf(BoxKind::ItemReferences(IrefBox {
            full: zero,
            references: vec![ItemReference {
                ref_type: FourCC::CDSC,
                from_item_id: 2,
                to_item_ids: vec![1],
            }],
        })),
        BoxNode::leaf(BoxKind::ItemData(IdatBox {
            data: vec![0xDE, 0xAD],
        })),
    ];

    vec![
        BoxNode::leaf(BoxKind::FileType(FtypBox {
            major_brand: FourCC(*b"heic"),
            minor_version: 0,
            compatible_brands: vec![FourCC(*b"mif1"), FourCC(*b"heic")],
        })),
        BoxNode::container(BoxKind::Meta(zero), meta_children),
        BoxNode::leaf(BoxKind::Opaque(OpaqueBox {
            box_type: FourCC::FREE,
            uuid: None,
            data: vec![0; 6],
        })),
        BoxNode::leaf(BoxKind::Opaque(OpaqueBox {
            box_type: FourCC::UUID,
            uuid: Some([7; 16]),
            data: vec![1, 2, 3],
        })),
        BoxNode::leaf(BoxKind::MediaData(MdatBox {
            data: vec![0xAA; 32],
        })),
    ]
}

#[test]
fn representative_tree_roundtrips() {
    let mut tree = representative_tree();
    let bytes = finalize_and_write(&mut tree).unwrap();
    let parsed = read_file(&bytes, &Unstoppable).unwrap();
    assert_eq!(parsed, tree);
}

#[test]
fn reserialization_is_stable() {
    let mut tree = representative_tree();
    let first = finalize_and_write(&mut tree).unwrap();
    let mut parsed = read_file(&first, &Unstoppable).unwrap();
    let second = finalize_and_write(&mut parsed).unwrap();
    assert_eq!(first, second);
}

#[test]
fn clap_fractions_reduce_and_keep_their_value() {
    // Wire terms past the reduction bound force the halving loop.
    let width = Fraction::from_wire(2_000_001, 1_000_000).unwrap();
    assert!(width.numerator.unsigned_abs() <= 0x10000);
    assert!(width.same_value(Fraction::new(2, 1).unwrap()));
    let height = Fraction::from_wire(3_000_000, 2_000_000).unwrap();
    assert!(height.same_value(Fraction::new(3, 2).unwrap()));

    let clap = ClapBox {
        width,
        height,
        horizontal_offset: Fraction::new(-1, 2).unwrap(),
        vertical_offset: Fraction::new(0, 1).unwrap(),
    };
    let mut tree = vec![BoxNode::container(
        BoxKind::Meta(full(0, 0)),
        vec![BoxNode::container(
            BoxKind::ItemProperties,
            vec![BoxNode::container(
                BoxKind::PropertyContainer,
                vec![BoxNode::leaf(BoxKind::CleanAperture(clap))],
            )],
        )],
    )];
    let bytes = finalize_and_write(&mut tree).unwrap();
    let parsed = read_file(&bytes, &Unstoppable).unwrap();
    assert_eq!(parsed, tree);

    let ipco = parsed[0]
        .child(FourCC::IPRP)
        .and_then(|n| n.child(FourCC::IPCO))
        .unwrap();
    match &ipco.children[0].kind {
        BoxKind::CleanAperture(b) => {
            assert!(b.width.same_value(clap.width));
            assert!(b.height.same_value(clap.height));
            assert!(b.horizontal_offset.same_value(clap.horizontal_offset));
            assert!(b.vertical_offset.same_value(clap.vertical_offset));
        }
        other => panic!("unexpected property {other:?}"),
    }
}

#[test]
fn iloc_version_follows_item_ids_and_method() {
    let mut narrow = BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
        full: full(9, 0),
        items: vec![iloc_item(1, ConstructionMethod::File, &[(1, 2), (3, 4)])],
    }));
    derive_box_version(&mut narrow);
    match &narrow.kind {
        BoxKind::ItemLocation(b) => assert_eq!(b.full.version, 0),
        _ => unreachable!(),
    }

    let mut idat = BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
        full: full(0, 0),
        items: vec![iloc_item(1, ConstructionMethod::Idat, &[(0, 4)])],
    }));
    derive_box_version(&mut idat);
    match &idat.kind {
        BoxKind::ItemLocation(b) => assert_eq!(b.full.version, 1),
        _ => unreachable!(),
    }

    let mut wide = BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
        full: full(0, 0),
        items: vec![iloc_item(70_000, ConstructionMethod::File, &[(1, 70_000)])],
    }));
    derive_box_version(&mut wide);
    match &wide.kind {
        BoxKind::ItemLocation(b) => assert_eq!(b.full.version, 2),
        _ => unreachable!(),
    }
}

#[test]
fn pitm_and_iref_versions_follow_id_width() {
    let mut small = BoxNode::leaf(BoxKind::PrimaryItem(PitmBox {
        full: full(1, 0),
        item_id: 20,
    }));
    derive_box_version(&mut small);
    match &small.kind {
        BoxKind::PrimaryItem(b) => assert_eq!(b.full.version, 0),
        _ => unreachable!(),
    }

    let mut wide = BoxNode::leaf(BoxKind::ItemReferences(IrefBox {
        full: full(0, 0),
        references: vec![ItemReference {
            ref_type: FourCC::DIMG,
            from_item_id: 70_000,
            to_item_ids: vec![1],
        }],
    }));
    derive_box_version(&mut wide);
    match &wide.kind {
        BoxKind::ItemReferences(b) => assert_eq!(b.full.version, 1),
        _ => unreachable!(),
    }
}

#[test]
fn ipma_flags_follow_property_index_width() {
    let mut wide = BoxNode::leaf(BoxKind::PropertyAssociations(IpmaBox {
        full: full(0, 0),
        entries: vec![IpmaEntry {
            item_id: 1,
            associations: vec![PropertyAssociation {
                essential: false,
                property_index: 200,
            }],
        }],
    }));
    derive_box_version(&mut wide);
    match &wide.kind {
        BoxKind::PropertyAssociations(b) => assert_eq!(b.full.flags & 1, 1),
        _ => unreachable!(),
    }
}

#[test]
fn builder_file_parses_back_to_identical_tree() {
    let mut b = common::MetaBuilder::new(1);
    b.add_item(1, common::RAW, &common::raw_payload(2, 2, |_, _| 5));
    let bytes = b.build();
    let parsed = read_file(&bytes, &Unstoppable).unwrap();
    let mut reparsed = parsed.clone();
    let rewritten = finalize_and_write(&mut reparsed).unwrap();
    assert_eq!(bytes, rewritten);
}
