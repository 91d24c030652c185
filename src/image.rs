//! Owned planar pixel images
//!
//! The interpreter composes decoded items into these. Planes are stored
//! per channel; samples are big-endian u16 above 8 bits per channel.
//! This is deliberately a plain data container: codec plugins produce it,
//! the interpreter pastes/blends into it, callers read it out.

use crate::error::{HeifError, Result};
use alloc::vec::Vec;
use whereat::At;

/// Pixel channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Channel {
    /// Luma
    Y,
    /// Blue-difference chroma
    Cb,
    /// Red-difference chroma
    Cr,
    /// Red
    R,
    /// Green
    G,
    /// Blue
    B,
    /// Alpha
    Alpha,
    /// Depth map
    Depth,
}

/// Chroma subsampling of a YCbCr image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSubsampling {
    /// 4:2:0
    C420,
    /// 4:2:2
    C422,
    /// 4:4:4
    C444,
}

/// Colorspace of a planar image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    /// Separate R/G/B planes
    Rgb,
    /// Y/Cb/Cr planes with the given subsampling
    YCbCr(ChromaSubsampling),
    /// Single luma plane
    Monochrome,
}

/// One channel's sample array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// Bits per sample, 8..=16
    pub bit_depth: u8,
    /// Row stride in bytes
    pub stride: usize,
    /// Sample bytes, row-major
    pub data: Vec<u8>,
}

impl Plane {
    /// Allocate a zeroed plane.
    ///
    /// # Errors
    ///
    /// Fails with [`HeifError::LimitExceeded`] if the allocation is
    /// refused or the dimensions overflow.
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Result<Self> {
        if bit_depth < 8 || bit_depth > 16 {
            return Err(At::from(HeifError::InvalidData("plane bit depth")));
        }
        let bytes_per_sample = if bit_depth > 8 { 2u64 } else { 1 };
        let stride = u64::from(width) * bytes_per_sample;
        let total = stride * u64::from(height);
        let total = usize::try_from(total)
            .map_err(|_| At::from(HeifError::LimitExceeded("plane size")))?;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| At::from(HeifError::LimitExceeded("plane allocation")))?;
        data.resize(total, 0);
        Ok(Self {
            width,
            height,
            bit_depth,
            stride: stride as usize,
            data,
        })
    }

    /// Bytes per sample (1 below 9 bits, otherwise 2).
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        if self.bit_depth > 8 {
            2
        } else {
            1
        }
    }

    /// One row of sample bytes.
    #[must_use]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.bytes_per_sample()]
    }

    /// One mutable row of sample bytes.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let bps = self.bytes_per_sample();
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.width as usize * bps]
    }

    /// Fill every sample with `value` (truncated to the plane's depth).
    pub fn fill(&mut self, value: u16) {
        if self.bytes_per_sample() == 1 {
            #[allow(clippy::cast_possible_truncation)]
            let v = value as u8;
            for b in &mut self.data {
                *b = v;
            }
        } else {
            let be = value.to_be_bytes();
            for pair in self.data.chunks_exact_mut(2) {
                pair.copy_from_slice(&be);
            }
        }
    }

    /// Sample at (x, y), widened to u16.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32) -> u16 {
        let bps = self.bytes_per_sample();
        let at = y as usize * self.stride + x as usize * bps;
        if bps == 1 {
            u16::from(self.data[at])
        } else {
            u16::from_be_bytes([self.data[at], self.data[at + 1]])
        }
    }

    /// Store a sample at (x, y).
    pub fn set_sample(&mut self, x: u32, y: u32, value: u16) {
        let bps = self.bytes_per_sample();
        let at = y as usize * self.stride + x as usize * bps;
        if bps == 1 {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.data[at] = value as u8;
            }
        } else {
            self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Paste `src` into this plane with its top-left corner at (dx, dy),
    /// clipping to this plane's bounds. Signed offsets allow sources that
    /// hang off any edge; the invisible part is simply not copied.
    pub fn paste(&mut self, src: &Plane, dx: i64, dy: i64) {
        let bps = self.bytes_per_sample();
        if bps != src.bytes_per_sample() {
            return;
        }
        let x0 = dx.max(0);
        let y0 = dy.max(0);
        let x1 = (dx + i64::from(src.width)).min(i64::from(self.width));
        let y1 = (dy + i64::from(src.height)).min(i64::from(self.height));
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let copy_bytes = (x1 - x0) as usize * bps;
        for y in y0..y1 {
            let sy = (y - dy) as u32;
            let sx = (x0 - dx) as usize * bps;
            let src_row = &src.row(sy)[sx..sx + copy_bytes];
            let dst_start = y as usize * self.stride + x0 as usize * bps;
            self.data[dst_start..dst_start + copy_bytes].copy_from_slice(src_row);
        }
    }
}

/// A decoded image as a set of per-channel planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarImage {
    /// Nominal width in pixels
    pub width: u32,
    /// Nominal height in pixels
    pub height: u32,
    /// Colorspace of the color planes
    pub colorspace: Colorspace,
    /// Whether color is premultiplied by alpha
    pub premultiplied_alpha: bool,
    planes: Vec<(Channel, Plane)>,
}

impl PlanarImage {
    /// Image shell with no planes yet.
    #[must_use]
    pub fn new(width: u32, height: u32, colorspace: Colorspace) -> Self {
        Self {
            width,
            height,
            colorspace,
            premultiplied_alpha: false,
            planes: Vec::new(),
        }
    }

    /// Allocate and attach a zeroed plane for `channel`.
    pub fn add_plane(&mut self, channel: Channel, width: u32, height: u32, bit_depth: u8) -> Result<()> {
        let plane = Plane::new(width, height, bit_depth)?;
        self.set_plane(channel, plane);
        Ok(())
    }

    /// Attach an existing plane, replacing any previous one for `channel`.
    pub fn set_plane(&mut self, channel: Channel, plane: Plane) {
        if let Some(slot) = self.planes.iter_mut().find(|(c, _)| *c == channel) {
            slot.1 = plane;
        } else {
            self.planes.push((channel, plane));
        }
    }

    /// Borrow the plane for `channel`.
    #[must_use]
    pub fn plane(&self, channel: Channel) -> Option<&Plane> {
        self.planes.iter().find(|(c, _)| *c == channel).map(|(_, p)| p)
    }

    /// Mutably borrow the plane for `channel`.
    pub fn plane_mut(&mut self, channel: Channel) -> Option<&mut Plane> {
        self.planes
            .iter_mut()
            .find(|(c, _)| *c == channel)
            .map(|(_, p)| p)
    }

    /// Detach and return the plane for `channel`.
    ///
    /// This is the ownership transfer used when an alpha auxiliary's luma
    /// plane moves onto its master image.
    pub fn take_plane(&mut self, channel: Channel) -> Option<Plane> {
        let at = self.planes.iter().position(|(c, _)| *c == channel)?;
        Some(self.planes.remove(at).1)
    }

    /// Channels present, in attachment order.
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.planes.iter().map(|(c, _)| *c)
    }

    /// Whether a plane exists for `channel`.
    #[must_use]
    pub fn has_channel(&self, channel: Channel) -> bool {
        self.plane(channel).is_some()
    }

    /// Color channels implied by the colorspace, in plane order.
    #[must_use]
    pub fn color_channels(&self) -> &'static [Channel] {
        match self.colorspace {
            Colorspace::Rgb => &[Channel::R, Channel::G, Channel::B],
            Colorspace::YCbCr(_) => &[Channel::Y, Channel::Cb, Channel::Cr],
            Colorspace::Monochrome => &[Channel::Y],
        }
    }

    /// Bit depth of the first color plane, if any.
    #[must_use]
    pub fn color_bit_depth(&self) -> Option<u8> {
        self.plane(self.color_channels()[0]).map(|p| p.bit_depth)
    }
}

/// Per-pixel alpha blend of one 8-bit sample pair.
#[inline]
#[must_use]
pub fn blend_sample(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = u16::from(alpha);
    let v = u16::from(src) * a + u16::from(dst) * (255 - a);
    #[allow(clippy::cast_possible_truncation)]
    {
        (v / 255) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paste_clips_at_edges() {
        let mut dst = Plane::new(4, 4, 8).unwrap();
        let mut src = Plane::new(2, 2, 8).unwrap();
        src.fill(9);
        dst.paste(&src, 3, 3);
        assert_eq!(dst.sample(3, 3), 9);
        assert_eq!(dst.sample(2, 2), 0);

        let mut dst2 = Plane::new(4, 4, 8).unwrap();
        dst2.paste(&src, -1, -1);
        assert_eq!(dst2.sample(0, 0), 9);
        assert_eq!(dst2.sample(1, 1), 0);
    }

    #[test]
    fn paste_fully_outside_is_noop() {
        let mut dst = Plane::new(4, 4, 8).unwrap();
        let mut src = Plane::new(2, 2, 8).unwrap();
        src.fill(7);
        dst.paste(&src, 10, 0);
        dst.paste(&src, 0, -5);
        assert!(dst.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn sixteen_bit_samples() {
        let mut p = Plane::new(2, 1, 10).unwrap();
        p.set_sample(1, 0, 0x03FF);
        assert_eq!(p.sample(1, 0), 0x03FF);
        assert_eq!(p.bytes_per_sample(), 2);
    }

    #[test]
    fn blend_endpoints() {
        assert_eq!(blend_sample(200, 50, 255), 200);
        assert_eq!(blend_sample(200, 50, 0), 50);
        assert_eq!(blend_sample(255, 0, 128), 128);
    }

    #[test]
    fn plane_ownership_transfer() {
        let mut img = PlanarImage::new(2, 2, Colorspace::Monochrome);
        img.add_plane(Channel::Y, 2, 2, 8).unwrap();
        img.add_plane(Channel::Alpha, 2, 2, 8).unwrap();
        let alpha = img.take_plane(Channel::Alpha).unwrap();
        assert_eq!(alpha.width, 2);
        assert!(!img.has_channel(Channel::Alpha));
    }
}
