//! Derived-image resolution: grids, overlays, identity, transforms
//!
//! Coded items come back from the codec registry as planar images;
//! everything else here is composition. Resolution is recursive over the
//! `dimg` graph with a per-call visited set and a fixed depth ceiling, so
//! crafted derivation cycles fail fast instead of recursing.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use log::warn;
use whereat::At;

use crate::bmff::boxes::{ClapBox, FourCC, ImirBox, IrotBox, MirrorAxis};
use crate::bmff::reader::ByteRangeReader;
use crate::codec::{CodecConfig, CodecRegistry, CompressionFormat};
use crate::context::{DecodeOptions, HeifContext, MAX_DERIVATION_DEPTH};
use crate::error::{check_stop, HeifError, Result};
use crate::image::{blend_sample, Channel, Colorspace, Plane, PlanarImage};

/// Payload of a `grid` derived item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDescriptor {
    /// Tile rows
    pub rows: u16,
    /// Tile columns
    pub columns: u16,
    /// Output canvas width in pixels
    pub output_width: u32,
    /// Output canvas height in pixels
    pub output_height: u32,
}

impl GridDescriptor {
    /// Parse a grid item payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteRangeReader::new(payload);
        let version = r.read_u8()?;
        if version != 0 {
            return Err(At::from(HeifError::Unsupported("grid descriptor version")));
        }
        let flags = r.read_u8()?;
        let rows = u16::from(r.read_u8()?) + 1;
        let columns = u16::from(r.read_u8()?) + 1;
        // Flags bit 0 selects 32-bit output dimensions.
        let (output_width, output_height) = if flags & 1 != 0 {
            (r.read_u32()?, r.read_u32()?)
        } else {
            (u32::from(r.read_u16()?), u32::from(r.read_u16()?))
        };
        if output_width == 0 || output_height == 0 {
            return Err(At::from(HeifError::InvalidData("empty grid canvas")));
        }
        Ok(Self {
            rows,
            columns,
            output_width,
            output_height,
        })
    }
}

/// Payload of an `iovl` derived item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDescriptor {
    /// Canvas fill color, RGBA with 16-bit channels
    pub background: [u16; 4],
    /// Output canvas width in pixels
    pub output_width: u32,
    /// Output canvas height in pixels
    pub output_height: u32,
    /// Signed top-left offsets, one pair per referenced sub-image
    pub offsets: Vec<(i32, i32)>,
}

impl OverlayDescriptor {
    /// Parse an overlay item payload. `reference_count` is the number of
    /// `dimg` targets and fixes how many offset pairs follow the header.
    pub fn parse(payload: &[u8], reference_count: usize) -> Result<Self> {
        let mut r = ByteRangeReader::new(payload);
        let version = r.read_u8()?;
        if version != 0 {
            return Err(At::from(HeifError::Unsupported(
                "overlay descriptor version",
            )));
        }
        let flags = r.read_u8()?;
        let mut background = [0u16; 4];
        for channel in &mut background {
            *channel = r.read_u16()?;
        }
        let wide = flags & 1 != 0;
        let (output_width, output_height) = if wide {
            (r.read_u32()?, r.read_u32()?)
        } else {
            (u32::from(r.read_u16()?), u32::from(r.read_u16()?))
        };
        if output_width == 0 || output_height == 0 {
            return Err(At::from(HeifError::InvalidData("empty overlay canvas")));
        }
        let mut offsets = Vec::with_capacity(reference_count);
        for _ in 0..reference_count {
            let (h, v) = if wide {
                (r.read_i32()?, r.read_i32()?)
            } else {
                (i32::from(r.read_i16()?), i32::from(r.read_i16()?))
            };
            offsets.push((h, v));
        }
        Ok(Self {
            background,
            output_width,
            output_height,
            offsets,
        })
    }
}

/// One resolution pass: context, plugins, options, cancellation.
pub(crate) struct Resolver<'c, 'a> {
    pub(crate) ctx: &'c HeifContext<'a>,
    pub(crate) registry: &'c CodecRegistry,
    pub(crate) options: &'c DecodeOptions,
    pub(crate) stop: &'c (dyn enough::Stop + Sync),
}

impl Resolver<'_, '_> {
    pub(crate) fn resolve(
        &self,
        item_id: u32,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<PlanarImage> {
        check_stop(self.stop)?;
        if depth > MAX_DERIVATION_DEPTH {
            return Err(At::from(HeifError::LimitExceeded("derivation depth")));
        }
        if !visited.insert(item_id) {
            return Err(At::from(HeifError::RecursiveReference(item_id)));
        }
        let entry = self
            .ctx
            .item(item_id)
            .ok_or(At::from(HeifError::NonexistentItem(item_id)))?;

        let mut image = match entry.item_type {
            Some(FourCC::GRID) => self.resolve_grid(item_id, depth, visited)?,
            Some(FourCC::IOVL) => self.resolve_overlay(item_id, depth, visited)?,
            Some(FourCC::IDEN) => self.resolve_identity(item_id, depth, visited)?,
            _ => self.decode_coded(item_id)?,
        };

        if !self.options.ignore_transforms {
            image = self.apply_transforms(item_id, image)?;
        }
        self.attach_auxiliaries(item_id, &mut image, depth, visited)?;

        visited.remove(&item_id);
        Ok(image)
    }

    /// Decode one coded item through the registry.
    fn decode_coded(&self, item_id: u32) -> Result<PlanarImage> {
        let entry = self
            .ctx
            .item(item_id)
            .ok_or(At::from(HeifError::NonexistentItem(item_id)))?;
        let item_type = entry
            .item_type
            .ok_or(At::from(HeifError::Unsupported("untyped item")))?;
        let format = CompressionFormat::from_item_type(item_type);
        let config = match format {
            CompressionFormat::Hevc => Some(CodecConfig::Hevc(
                self.ctx
                    .hvcc(item_id)
                    .ok_or(At::from(HeifError::MissingProperty("hvc1 item without hvcC")))?,
            )),
            CompressionFormat::Av1 => Some(CodecConfig::Av1(
                self.ctx
                    .av1c(item_id)
                    .ok_or(At::from(HeifError::MissingProperty("av01 item without av1C")))?,
            )),
            CompressionFormat::Other(_) => None,
        };
        let decoder = self
            .registry
            .decoder_for(format)
            .ok_or(At::from(HeifError::Unsupported("no decoder registered for format")))?;
        let data = self.ctx.item_data(item_id)?;
        decoder.decode(&data, config.as_ref(), self.stop)
    }

    /// Identity derivation: exactly one source, passed through unchanged.
    /// The `iden` item's own transform properties still apply afterwards.
    fn resolve_identity(
        &self,
        item_id: u32,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<PlanarImage> {
        let sources = self
            .ctx
            .derivation_sources(item_id)
            .ok_or(At::from(HeifError::InvalidData("iden item without dimg")))?;
        if sources.len() != 1 {
            return Err(At::from(HeifError::InvalidData(
                "iden item needs exactly one source",
            )));
        }
        self.resolve(sources[0], depth + 1, visited)
    }

    fn resolve_grid(
        &self,
        item_id: u32,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<PlanarImage> {
        let payload = self.ctx.item_data(item_id)?;
        let desc = GridDescriptor::parse(&payload)?;
        let tiles = self
            .ctx
            .derivation_sources(item_id)
            .ok_or(At::from(HeifError::InvalidData("grid item without dimg")))?;
        let expected = usize::from(desc.rows) * usize::from(desc.columns);
        if tiles.len() != expected {
            return Err(At::from(HeifError::InvalidData(
                "grid tile count does not match rows x columns",
            )));
        }

        let decoded = self.decode_tiles(tiles, depth + 1, visited)?;
        let first = &decoded[0];
        let tile_width = first.width;
        let tile_height = first.height;

        let mut canvas = PlanarImage::new(desc.output_width, desc.output_height, first.colorspace);
        let mut layout = Vec::new();
        for channel in first.channels() {
            let plane = match first.plane(channel) {
                Some(p) => p,
                None => continue,
            };
            // Subsampling ratio of this channel relative to the nominal size.
            let sx = tile_width.div_ceil(plane.width).max(1);
            let sy = tile_height.div_ceil(plane.height).max(1);
            canvas.add_plane(
                channel,
                desc.output_width.div_ceil(sx),
                desc.output_height.div_ceil(sy),
                plane.bit_depth,
            )?;
            layout.push((channel, sx, sy));
        }

        for (index, tile) in decoded.iter().enumerate() {
            check_stop(self.stop)?;
            if tile.colorspace != first.colorspace
                || tile.color_bit_depth() != first.color_bit_depth()
                || tile.width != tile_width
                || tile.height != tile_height
            {
                return Err(At::from(HeifError::InvalidData(
                    "grid tiles disagree on format",
                )));
            }
            let row = index / usize::from(desc.columns);
            let column = index % usize::from(desc.columns);
            let x = column as u64 * u64::from(tile_width);
            let y = row as u64 * u64::from(tile_height);
            for &(channel, sx, sy) in &layout {
                let src = tile
                    .plane(channel)
                    .ok_or(At::from(HeifError::InvalidData("grid tile missing plane")))?;
                if let Some(dst) = canvas.plane_mut(channel) {
                    // Tiles past the canvas edge are clipped by the paste.
                    dst.paste(src, (x / u64::from(sx)) as i64, (y / u64::from(sy)) as i64);
                }
            }
        }
        Ok(canvas)
    }

    fn decode_tiles(
        &self,
        tiles: &[u32],
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<Vec<PlanarImage>> {
        #[cfg(feature = "threads")]
        if self.options.max_workers > 1 && tiles.len() > 1 {
            return self.decode_tiles_parallel(tiles, depth, visited);
        }
        let mut out = Vec::with_capacity(tiles.len());
        for &tile_id in tiles {
            out.push(self.resolve(tile_id, depth, visited)?);
        }
        Ok(out)
    }

    /// Fan tile decoding out over scoped worker threads. Workers pull tile
    /// indices from a shared counter and stop claiming new ones after the
    /// first failure; assembly stays on the calling thread.
    #[cfg(feature = "threads")]
    fn decode_tiles_parallel(
        &self,
        tiles: &[u32],
        depth: u32,
        visited: &BTreeSet<u32>,
    ) -> Result<Vec<PlanarImage>> {
        use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::{Mutex, PoisonError};

        let workers = self.options.max_workers.min(tiles.len());
        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let slots: Mutex<Vec<Option<Result<PlanarImage>>>> =
            Mutex::new((0..tiles.len()).map(|_| None).collect());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if failed.load(Ordering::Relaxed) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    if index >= tiles.len() {
                        break;
                    }
                    let mut visited = visited.clone();
                    let result = self.resolve(tiles[index], depth, &mut visited);
                    if result.is_err() {
                        failed.store(true, Ordering::Relaxed);
                    }
                    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                    slots[index] = Some(result);
                });
            }
        });

        let mut slots = slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        // Lowest-index error wins; unclaimed slots only exist after a failure.
        for slot in &mut slots {
            if let Some(Err(_)) = slot {
                if let Some(Err(e)) = slot.take() {
                    return Err(e);
                }
            }
        }
        let mut out = Vec::with_capacity(tiles.len());
        for slot in slots {
            match slot {
                Some(Ok(image)) => out.push(image),
                _ => return Err(At::from(HeifError::InvalidData("tile decode incomplete"))),
            }
        }
        Ok(out)
    }

    fn resolve_overlay(
        &self,
        item_id: u32,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<PlanarImage> {
        let sources = self
            .ctx
            .derivation_sources(item_id)
            .ok_or(At::from(HeifError::InvalidData("iovl item without dimg")))?;
        let payload = self.ctx.item_data(item_id)?;
        let desc = OverlayDescriptor::parse(&payload, sources.len())?;

        let mut canvas = PlanarImage::new(desc.output_width, desc.output_height, Colorspace::Rgb);
        for (index, channel) in [Channel::R, Channel::G, Channel::B].into_iter().enumerate() {
            canvas.add_plane(channel, desc.output_width, desc.output_height, 8)?;
            if let Some(plane) = canvas.plane_mut(channel) {
                plane.fill(desc.background[index] >> 8);
            }
        }
        if desc.background[3] >> 8 != 0xFF {
            canvas.add_plane(Channel::Alpha, desc.output_width, desc.output_height, 8)?;
            if let Some(plane) = canvas.plane_mut(Channel::Alpha) {
                plane.fill(desc.background[3] >> 8);
            }
        }

        for (&source_id, &(dx, dy)) in sources.iter().zip(&desc.offsets) {
            check_stop(self.stop)?;
            let sub = self.resolve(source_id, depth + 1, visited)?;
            if sub.colorspace != Colorspace::Rgb || sub.color_bit_depth() != Some(8) {
                return Err(At::from(HeifError::Unsupported(
                    "overlay sub-image is not 8-bit RGB",
                )));
            }
            let visible = i64::from(dx) < i64::from(desc.output_width)
                && i64::from(dy) < i64::from(desc.output_height)
                && i64::from(dx) + i64::from(sub.width) > 0
                && i64::from(dy) + i64::from(sub.height) > 0;
            if !visible {
                warn!("overlay sub-image {source_id} lies entirely outside the canvas");
                continue;
            }
            if let Some(alpha) = sub.plane(Channel::Alpha) {
                blend_overlay(&mut canvas, &sub, alpha, dx, dy);
            } else {
                for channel in [Channel::R, Channel::G, Channel::B] {
                    let src = sub
                        .plane(channel)
                        .ok_or(At::from(HeifError::InvalidData("overlay sub-image missing plane")))?;
                    if let Some(dst) = canvas.plane_mut(channel) {
                        dst.paste(src, i64::from(dx), i64::from(dy));
                    }
                }
            }
        }
        Ok(canvas)
    }

    /// Apply the item's transformative properties. Application order is
    /// fixed as rotate, then mirror, then crop.
    fn apply_transforms(&self, item_id: u32, image: PlanarImage) -> Result<PlanarImage> {
        let (rotate, mirror, crop) = self.ctx.transforms(item_id);
        let mut image = image;
        if let Some(rotation) = rotate {
            image = rotate_image(&image, rotation)?;
        }
        if let Some(m) = mirror {
            mirror_image(&mut image, m);
        }
        if let Some(aperture) = crop {
            image = crop_image(&image, &aperture)?;
        }
        Ok(image)
    }

    /// Absorb the item's alpha and depth auxiliaries into the result.
    fn attach_auxiliaries(
        &self,
        item_id: u32,
        image: &mut PlanarImage,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<()> {
        let Some(logical) = self.ctx.image(item_id) else {
            return Ok(());
        };
        if let Some(alpha_id) = logical.alpha_image {
            if let Some(plane) = self.resolve_aux_plane(alpha_id, image, depth, visited)? {
                image.set_plane(Channel::Alpha, plane);
                image.premultiplied_alpha = logical.premultiplied_alpha;
            }
        }
        if let Some(depth_id) = logical.depth_image {
            if let Some(plane) = self.resolve_aux_plane(depth_id, image, depth, visited)? {
                image.set_plane(Channel::Depth, plane);
            }
        }
        Ok(())
    }

    /// Decode an auxiliary image and detach its luma plane for the master.
    /// A size mismatch with the master is logged and the plane dropped.
    fn resolve_aux_plane(
        &self,
        aux_id: u32,
        master: &PlanarImage,
        depth: u32,
        visited: &mut BTreeSet<u32>,
    ) -> Result<Option<Plane>> {
        let mut aux = self.resolve(aux_id, depth + 1, visited)?;
        let channel = aux.color_channels()[0];
        let Some(plane) = aux.take_plane(channel) else {
            warn!("auxiliary item {aux_id} decoded without a luma plane");
            return Ok(None);
        };
        if plane.width != master.width || plane.height != master.height {
            warn!(
                "auxiliary item {aux_id} is {}x{}, master is {}x{}, dropping",
                plane.width, plane.height, master.width, master.height
            );
            return Ok(None);
        }
        Ok(Some(plane))
    }
}

/// Per-pixel alpha blend of an RGB sub-image onto the canvas.
fn blend_overlay(canvas: &mut PlanarImage, sub: &PlanarImage, alpha: &Plane, dx: i32, dy: i32) {
    let x0 = i64::from(dx).max(0);
    let y0 = i64::from(dy).max(0);
    let x1 = (i64::from(dx) + i64::from(sub.width)).min(i64::from(canvas.width));
    let y1 = (i64::from(dy) + i64::from(sub.height)).min(i64::from(canvas.height));
    for channel in [Channel::R, Channel::G, Channel::B] {
        let (Some(src), Some(dst)) = (sub.plane(channel), canvas.plane(channel)) else {
            continue;
        };
        let mut blended = dst.clone();
        for y in y0..y1 {
            let sy = (y - i64::from(dy)) as u32;
            for x in x0..x1 {
                let sx = (x - i64::from(dx)) as u32;
                if sx >= alpha.width || sy >= alpha.height {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let value = blend_sample(
                    src.sample(sx, sy) as u8,
                    dst.sample(x as u32, y as u32) as u8,
                    alpha.sample(sx, sy) as u8,
                );
                blended.set_sample(x as u32, y as u32, u16::from(value));
            }
        }
        canvas.set_plane(channel, blended);
    }
}

/// Rotate counter-clockwise by the irot quarter-turn count.
fn rotate_image(image: &PlanarImage, rotation: IrotBox) -> Result<PlanarImage> {
    let turns = rotation.angle & 0x03;
    if turns == 0 {
        return Ok(image.clone());
    }
    let (out_w, out_h) = if turns % 2 == 1 {
        (image.height, image.width)
    } else {
        (image.width, image.height)
    };
    let mut out = PlanarImage::new(out_w, out_h, image.colorspace);
    out.premultiplied_alpha = image.premultiplied_alpha;
    for channel in image.channels().collect::<Vec<_>>() {
        let src = match image.plane(channel) {
            Some(p) => p,
            None => continue,
        };
        let (pw, ph) = if turns % 2 == 1 {
            (src.height, src.width)
        } else {
            (src.width, src.height)
        };
        let mut dst = Plane::new(pw, ph, src.bit_depth)?;
        for y in 0..ph {
            for x in 0..pw {
                let value = match turns {
                    1 => src.sample(src.width - 1 - y, x),
                    2 => src.sample(src.width - 1 - x, src.height - 1 - y),
                    _ => src.sample(y, src.height - 1 - x),
                };
                dst.set_sample(x, y, value);
            }
        }
        out.set_plane(channel, dst);
    }
    Ok(out)
}

/// Mirror in place around the imir axis.
fn mirror_image(image: &mut PlanarImage, mirror: ImirBox) {
    for channel in image.channels().collect::<Vec<_>>() {
        let Some(plane) = image.plane_mut(channel) else {
            continue;
        };
        match mirror.axis {
            MirrorAxis::Vertical => {
                for y in 0..plane.height {
                    for x in 0..plane.width / 2 {
                        let a = plane.sample(x, y);
                        let b = plane.sample(plane.width - 1 - x, y);
                        plane.set_sample(x, y, b);
                        plane.set_sample(plane.width - 1 - x, y, a);
                    }
                }
            }
            MirrorAxis::Horizontal => {
                for y in 0..plane.height / 2 {
                    for x in 0..plane.width {
                        let a = plane.sample(x, y);
                        let b = plane.sample(x, plane.height - 1 - y);
                        plane.set_sample(x, y, b);
                        plane.set_sample(x, plane.height - 1 - y, a);
                    }
                }
            }
        }
    }
}

/// Crop to the clean aperture. Offsets position the aperture center
/// relative to the image center; the aperture must lie fully inside.
fn crop_image(image: &PlanarImage, aperture: &ClapBox) -> Result<PlanarImage> {
    let crop_w = aperture.width.round();
    let crop_h = aperture.height.round();
    if crop_w <= 0 || crop_h <= 0 {
        return Err(At::from(HeifError::InvalidFraction("empty clean aperture")));
    }
    let crop_w = crop_w as u32;
    let crop_h = crop_h as u32;
    if crop_w > image.width || crop_h > image.height {
        return Err(At::from(HeifError::InvalidData(
            "clean aperture larger than image",
        )));
    }
    let left = i64::from(aperture.horizontal_offset.round())
        + i64::from((image.width - crop_w) / 2);
    let top = i64::from(aperture.vertical_offset.round())
        + i64::from((image.height - crop_h) / 2);
    if left < 0
        || top < 0
        || left + i64::from(crop_w) > i64::from(image.width)
        || top + i64::from(crop_h) > i64::from(image.height)
    {
        return Err(At::from(HeifError::InvalidData(
            "clean aperture outside image bounds",
        )));
    }
    let left = left as u32;
    let top = top as u32;

    let mut out = PlanarImage::new(crop_w, crop_h, image.colorspace);
    out.premultiplied_alpha = image.premultiplied_alpha;
    for channel in image.channels().collect::<Vec<_>>() {
        let src = match image.plane(channel) {
            Some(p) => p,
            None => continue,
        };
        let sx = image.width.div_ceil(src.width).max(1);
        let sy = image.height.div_ceil(src.height).max(1);
        let pw = crop_w.div_ceil(sx);
        let ph = crop_h.div_ceil(sy);
        let px = left / sx;
        let py = top / sy;
        let mut dst = Plane::new(pw, ph, src.bit_depth)?;
        for y in 0..ph {
            for x in 0..pw {
                dst.set_sample(x, y, src.sample(px + x, py + y));
            }
        }
        out.set_plane(channel, dst);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_descriptor_narrow_and_wide() {
        let narrow = [0u8, 0, 1, 1, 0, 8, 0, 8];
        let d = GridDescriptor::parse(&narrow).unwrap();
        assert_eq!((d.rows, d.columns), (2, 2));
        assert_eq!((d.output_width, d.output_height), (8, 8));

        let wide = [0u8, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 64];
        let d = GridDescriptor::parse(&wide).unwrap();
        assert_eq!((d.rows, d.columns), (1, 1));
        assert_eq!((d.output_width, d.output_height), (65536, 64));
    }

    #[test]
    fn overlay_descriptor_offsets() {
        let mut payload = alloc::vec![0u8, 0];
        payload.extend_from_slice(&0xFFFFu16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&0xFFFFu16.to_be_bytes());
        payload.extend_from_slice(&16u16.to_be_bytes());
        payload.extend_from_slice(&16u16.to_be_bytes());
        payload.extend_from_slice(&(-4i16).to_be_bytes());
        payload.extend_from_slice(&2i16.to_be_bytes());
        let d = OverlayDescriptor::parse(&payload, 1).unwrap();
        assert_eq!(d.background, [0xFFFF, 0, 0, 0xFFFF]);
        assert_eq!(d.offsets, alloc::vec![(-4, 2)]);
    }

    #[test]
    fn rotation_quarter_turn() {
        let mut img = PlanarImage::new(2, 1, Colorspace::Monochrome);
        img.add_plane(Channel::Y, 2, 1, 8).unwrap();
        if let Some(p) = img.plane_mut(Channel::Y) {
            p.set_sample(0, 0, 10);
            p.set_sample(1, 0, 20);
        }
        // 90 degrees counter-clockwise: the right pixel moves to the top.
        let rotated = rotate_image(&img, IrotBox { angle: 1 }).unwrap();
        assert_eq!((rotated.width, rotated.height), (1, 2));
        let p = rotated.plane(Channel::Y).unwrap();
        assert_eq!(p.sample(0, 0), 20);
        assert_eq!(p.sample(0, 1), 10);
    }

    #[test]
    fn mirror_axes() {
        let mut img = PlanarImage::new(2, 2, Colorspace::Monochrome);
        img.add_plane(Channel::Y, 2, 2, 8).unwrap();
        if let Some(p) = img.plane_mut(Channel::Y) {
            p.set_sample(0, 0, 1);
            p.set_sample(1, 0, 2);
            p.set_sample(0, 1, 3);
            p.set_sample(1, 1, 4);
        }
        let mut lr = img.clone();
        mirror_image(&mut lr, ImirBox { axis: MirrorAxis::Vertical });
        let p = lr.plane(Channel::Y).unwrap();
        assert_eq!((p.sample(0, 0), p.sample(1, 0)), (2, 1));

        let mut tb = img;
        mirror_image(&mut tb, ImirBox { axis: MirrorAxis::Horizontal });
        let p = tb.plane(Channel::Y).unwrap();
        assert_eq!((p.sample(0, 0), p.sample(0, 1)), (3, 1));
    }

    #[test]
    fn crop_rejects_out_of_bounds_aperture() {
        use crate::fraction::Fraction;
        let mut img = PlanarImage::new(4, 4, Colorspace::Monochrome);
        img.add_plane(Channel::Y, 4, 4, 8).unwrap();
        let clap = ClapBox {
            width: Fraction::new(2, 1).unwrap(),
            height: Fraction::new(2, 1).unwrap(),
            horizontal_offset: Fraction::new(100, 1).unwrap(),
            vertical_offset: Fraction::new(0, 1).unwrap(),
        };
        assert!(crop_image(&img, &clap).is_err());
    }

    #[test]
    fn crop_centered_region() {
        use crate::fraction::Fraction;
        let mut img = PlanarImage::new(4, 4, Colorspace::Monochrome);
        img.add_plane(Channel::Y, 4, 4, 8).unwrap();
        if let Some(p) = img.plane_mut(Channel::Y) {
            for y in 0..4 {
                for x in 0..4 {
                    p.set_sample(x, y, u16::from(10 * y as u8 + x as u8));
                }
            }
        }
        let clap = ClapBox {
            width: Fraction::new(2, 1).unwrap(),
            height: Fraction::new(2, 1).unwrap(),
            horizontal_offset: Fraction::new(0, 1).unwrap(),
            vertical_offset: Fraction::new(0, 1).unwrap(),
        };
        let cropped = crop_image(&img, &clap).unwrap();
        assert_eq!((cropped.width, cropped.height), (2, 2));
        let p = cropped.plane(Channel::Y).unwrap();
        assert_eq!(p.sample(0, 0), 11);
        assert_eq!(p.sample(1, 1), 22);
    }
}
