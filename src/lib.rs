//! ISOBMFF/HEIF container parsing, writing, and image-graph resolution
//!
//! This crate reads and writes the box structure of HEIF-family files and
//! interprets the item graph inside the `meta` box: locating item data,
//! classifying thumbnails and auxiliary images, and composing derived
//! images (grids, overlays, identity) into planar pixel buffers. Pixel
//! codecs are external plugins supplied through a [`CodecRegistry`].
//!
//! # Example
//!
//! ```ignore
//! use heif_container::{CodecRegistry, DecodeOptions, HeifContext};
//!
//! let data = std::fs::read("image.heic")?;
//! let ctx = HeifContext::from_bytes(&data, &enough::Unstoppable)?;
//! let registry = CodecRegistry::new(); // register decoders here
//! let image = ctx.decode_primary_image(
//!     &registry,
//!     &DecodeOptions::default(),
//!     &enough::Unstoppable,
//! )?;
//! println!("{}x{}", image.width, image.height);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

mod error;
mod fraction;

pub mod bmff;
pub mod codec;
pub mod context;
pub mod image;

pub use error::{HeifError, Result};
pub use fraction::Fraction;

pub use bmff::{
    derive_box_version, finalize_and_write, read_file, write_boxes, BoxHeader, BoxKind, BoxNode,
    FourCC, FullBoxHeader,
};
pub use codec::{CodecConfig, CodecRegistry, CompressionFormat, ImageDecoder, ImageEncoder};
pub use context::{DecodeOptions, HeifContext, ItemRole, LogicalImage};
pub use image::{Channel, ChromaSubsampling, Colorspace, Plane, PlanarImage};
