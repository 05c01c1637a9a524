//! Minimal pyramidal TIFF writer for unit tests.

use crate::format::tiff::ByteOrder;

/// One tiled level with its stored tile payloads in row-major order.
#[derive(Clone)]
pub(crate) struct TestLevel {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
    pub samples_per_pixel: u16,
    pub compression: u16,
    pub extra_samples: Option<u16>,
    pub tiles: Vec<Vec<u8>>,
}

impl TestLevel {
    /// Uncompressed level whose tiles are filled with `fill(col, row)`.
    pub fn uncompressed(
        width: u32,
        height: u32,
        tile: u32,
        samples_per_pixel: u16,
        fill: impl Fn(u32, u32) -> u8,
    ) -> Self {
        let tiles_x = width.div_ceil(tile);
        let tiles_y = height.div_ceil(tile);
        let len = (tile * tile) as usize * samples_per_pixel as usize;
        let tiles = (0..tiles_y)
            .flat_map(|row| (0..tiles_x).map(move |col| (col, row)))
            .map(|(col, row)| vec![fill(col, row); len])
            .collect();
        Self {
            width,
            height,
            tile,
            samples_per_pixel,
            compression: 1,
            extra_samples: None,
            tiles,
        }
    }
}

struct Writer {
    order: ByteOrder,
    out: Vec<u8>,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        match self.order {
            ByteOrder::LittleEndian => self.out.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::BigEndian => self.out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::LittleEndian => self.out.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::BigEndian => self.out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        let bytes = match self.order {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        };
        self.out[at..at + 4].copy_from_slice(&bytes);
    }

    fn align(&mut self) {
        if self.out.len() % 2 == 1 {
            self.out.push(0);
        }
    }

    /// Single values go inline; longer arrays are written out of line.
    fn array(&mut self, values: &[u32]) -> u32 {
        if values.len() == 1 {
            return values[0];
        }
        let at = self.pos();
        for &v in values {
            self.u32(v);
        }
        at
    }

    fn pos(&self) -> u32 {
        self.out.len() as u32
    }
}

/// Classic TIFF with one directory per level, linked in order.
pub(crate) fn build_tiff(order: ByteOrder, levels: &[TestLevel]) -> Vec<u8> {
    let mut w = Writer {
        order,
        out: Vec::new(),
    };
    w.out.extend_from_slice(match order {
        ByteOrder::LittleEndian => b"II",
        ByteOrder::BigEndian => b"MM",
    });
    w.u16(42);
    let mut link = w.out.len();
    w.u32(0);

    for level in levels {
        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        for tile in &level.tiles {
            offsets.push(w.pos());
            counts.push(tile.len() as u32);
            w.out.extend_from_slice(tile);
        }
        w.align();

        let offsets_value = w.array(&offsets);
        let counts_value = w.array(&counts);

        // (tag, type, count, value); SHORT values sit in the low half.
        let mut entries: Vec<(u16, u16, u32, u32)> = vec![
            (256, 4, 1, level.width),
            (257, 4, 1, level.height),
            (258, 3, 1, 8),
            (259, 3, 1, level.compression as u32),
            (277, 3, 1, level.samples_per_pixel as u32),
            (322, 4, 1, level.tile),
            (323, 4, 1, level.tile),
            (324, 4, offsets.len() as u32, offsets_value),
            (325, 4, counts.len() as u32, counts_value),
        ];
        if let Some(extra) = level.extra_samples {
            entries.push((338, 3, 1, extra as u32));
        }

        let ifd = w.pos();
        w.patch_u32(link, ifd);
        w.u16(entries.len() as u16);
        for (tag, field_type, count, value) in entries {
            w.u16(tag);
            w.u16(field_type);
            w.u32(count);
            if field_type == 3 && count == 1 {
                w.u16(value as u16);
                w.u16(0);
            } else {
                w.u32(value);
            }
        }
        link = w.out.len();
        w.u32(0);
    }
    w.out
}
