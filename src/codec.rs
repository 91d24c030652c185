//! Codec plugin interface
//!
//! Pixel decoding and encoding are external collaborators. The container
//! core selects a plugin by compression format and priority from an
//! explicit registry owned by the caller; there is no process-global
//! plugin state. Decoders must be `Send + Sync` because grid tiles may be
//! decoded from worker threads.

use crate::bmff::boxes::{Av1cBox, FourCC, HvccBox};
use crate::error::Result;
use crate::image::PlanarImage;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Compression formats a coded item can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// HEVC / H.265
    Hevc,
    /// AV1
    Av1,
    /// A coded format this crate has no built-in knowledge of
    Other(FourCC),
}

impl CompressionFormat {
    /// Map a coded item type to its compression format.
    #[must_use]
    pub fn from_item_type(item_type: FourCC) -> Self {
        match item_type {
            FourCC::HVC1 => Self::Hevc,
            FourCC::AV01 => Self::Av1,
            other => Self::Other(other),
        }
    }
}

/// Decoder configuration property attached to a coded item.
#[derive(Debug, Clone, Copy)]
pub enum CodecConfig<'a> {
    /// From an `hvcC` property
    Hevc(&'a HvccBox),
    /// From an `av1C` property
    Av1(&'a Av1cBox),
}

/// A pixel decoder for one compression format.
///
/// Implementations receive the item's concatenated extent bytes and its
/// configuration property, and must honor the stop token at a coarse
/// granularity (per frame or slice, not per byte).
pub trait ImageDecoder: Send + Sync {
    /// Format this decoder handles.
    fn format(&self) -> CompressionFormat;

    /// Ranking among decoders for the same format; higher wins.
    fn priority(&self) -> u8 {
        100
    }

    /// Decode one coded item payload into a planar image.
    fn decode(
        &self,
        data: &[u8],
        config: Option<&CodecConfig<'_>>,
        stop: &dyn enough::Stop,
    ) -> Result<PlanarImage>;
}

/// A pixel encoder for one compression format.
pub trait ImageEncoder: Send + Sync {
    /// Format this encoder produces.
    fn format(&self) -> CompressionFormat;

    /// Ranking among encoders for the same format; higher wins.
    fn priority(&self) -> u8 {
        100
    }

    /// Encode a planar image into one coded payload.
    fn encode(&self, image: &PlanarImage, stop: &dyn enough::Stop) -> Result<Vec<u8>>;
}

/// Explicit codec registry passed into the interpreter.
///
/// Register everything up front, before any decode begins; the registry
/// is read-only during decoding (including the grid fan-out).
#[derive(Default)]
pub struct CodecRegistry {
    decoders: Vec<Box<dyn ImageDecoder>>,
    encoders: Vec<Box<dyn ImageEncoder>>,
}

impl CodecRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoder.
    pub fn register_decoder(&mut self, decoder: Box<dyn ImageDecoder>) {
        self.decoders.push(decoder);
    }

    /// Add an encoder.
    pub fn register_encoder(&mut self, encoder: Box<dyn ImageEncoder>) {
        self.encoders.push(encoder);
    }

    /// Highest-priority decoder for `format`.
    #[must_use]
    pub fn decoder_for(&self, format: CompressionFormat) -> Option<&dyn ImageDecoder> {
        self.decoders
            .iter()
            .filter(|d| d.format() == format)
            .max_by_key(|d| d.priority())
            .map(|b| &**b)
    }

    /// Highest-priority encoder for `format`.
    #[must_use]
    pub fn encoder_for(&self, format: CompressionFormat) -> Option<&dyn ImageEncoder> {
        self.encoders
            .iter()
            .filter(|e| e.format() == format)
            .max_by_key(|e| e.priority())
            .map(|b| &**b)
    }
}

impl core::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("decoders", &self.decoders.len())
            .field("encoders", &self.encoders.len())
            .finish()
    }
}
