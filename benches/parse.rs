// Criterion benchmarks for container parsing and interpretation

use criterion::{criterion_group, criterion_main, Criterion};
use enough::Unstoppable;
use heif_container::bmff::boxes::*;
use heif_container::{finalize_and_write, read_file, HeifContext};

/// A container with `items` coded items, each carrying an ispe property
/// and one iloc extent into idat.
fn synthetic_file(items: u32) -> Vec<u8> {
    let zero = FullBoxHeader {
        version: 0,
        flags: 0,
    };
    let mut infes = Vec::new();
    let mut locs = Vec::new();
    let mut ipma = Vec::new();
    let mut idat = Vec::new();
    for id in 1..=items {
        infes.push(BoxNode::leaf(BoxKind::ItemInfoEntry(InfeBox {
            full: FullBoxHeader {
                version: 2,
                flags: 0,
            },
            item_id: id,
            protection_index: 0,
            item_type: Some(FourCC::HVC1),
            name: String::new(),
            content_type: String::new(),
            content_encoding: String::new(),
            uri_type: String::new(),
        })));
        let mut extents = arrayvec::ArrayVec::new();
        extents.push(IlocExtent {
            index: 0,
            offset: idat.len() as u64,
            length: 64,
        });
        idat.extend_from_slice(&[0u8; 64]);
        locs.push(IlocItem {
            item_id: id,
            construction_method: ConstructionMethod::Idat,
            data_reference_index: 0,
            base_offset: 0,
            extents,
        });
        ipma.push(IpmaEntry {
            item_id: id,
            associations: vec![PropertyAssociation {
                essential: false,
                property_index: 1,
            }],
        });
    }
    let meta_children = vec![
        BoxNode::leaf(BoxKind::Handler(HdlrBox {
            full: zero,
            handler_type: FourCC(*b"pict"),
            name: String::new(),
        })),
        BoxNode::leaf(BoxKind::PrimaryItem(PitmBox {
            full: zero,
            item_id: 1,
        })),
        BoxNode::leaf(BoxKind::ItemLocation(IlocBox {
            full: zero,
            items: locs,
        })),
        BoxNode::container(BoxKind::ItemInfo(IinfBox { full: zero }), infes),
        BoxNode::container(
            BoxKind::ItemProperties,
            vec![
                BoxNode::container(
                    BoxKind::PropertyContainer,
                    vec![BoxNode::leaf(BoxKind::ImageExtents(IspeBox {
                        full: zero,
                        width: 512,
                        height: 512,
                    }))],
                ),
                BoxNode::leaf(BoxKind::PropertyAssociations(IpmaBox {
                    full: zero,
                    entries: ipma,
                })),
            ],
        ),
        BoxNode::leaf(BoxKind::ItemData(IdatBox { data: idat })),
    ];
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

fn bench_parse(c: &mut Criterion) {
    let small = synthetic_file(4);
    let large = synthetic_file(1024);

    c.bench_function("read_file_4_items", |b| {
        b.iter(|| read_file(&small, &Unstoppable).unwrap())
    });
    c.bench_function("read_file_1024_items", |b| {
        b.iter(|| read_file(&large, &Unstoppable).unwrap())
    });
}

fn bench_interpret(c: &mut Criterion) {
    let large = synthetic_file(1024);

    c.bench_function("context_from_bytes_1024_items", |b| {
        b.iter(|| HeifContext::from_bytes(&large, &Unstoppable).unwrap())
    });
}

fn bench_write(c: &mut Criterion) {
    let large = synthetic_file(1024);
    let tree = read_file(&large, &Unstoppable).unwrap();

    c.bench_function("write_1024_items", |b| {
        b.iter(|| heif_container::write_boxes(&tree).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_interpret, bench_write);
criterion_main!(benches);
