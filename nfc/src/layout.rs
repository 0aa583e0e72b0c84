//! Mifare Classic sector/block addressing.
//!
//! The layout is fixed by the card family: sectors 0–31 hold 4 blocks each,
//! sectors 32–39 hold 16 blocks each (4K cards). The last block of every
//! sector is the trailer (keys + access bits) and never carries data.

/// Sectors with the small 4-block stride.
pub const SMALL_SECTORS: u8 = 32;

/// Blocks per sector below [`SMALL_SECTORS`].
const SMALL_STRIDE: u16 = 4;

/// Blocks per sector at and above [`SMALL_SECTORS`].
const LARGE_STRIDE: u16 = 16;

/// First absolute block index of the given sector.
pub fn sector_to_block(sector: u8) -> u16 {
    if sector < SMALL_SECTORS {
        u16::from(sector) * SMALL_STRIDE
    } else {
        u16::from(SMALL_SECTORS) * SMALL_STRIDE + u16::from(sector - SMALL_SECTORS) * LARGE_STRIDE
    }
}

/// Number of blocks in the given sector.
pub fn sector_block_count(sector: u8) -> u16 {
    if sector < SMALL_SECTORS {
        SMALL_STRIDE
    } else {
        LARGE_STRIDE
    }
}

/// Sector owning the given absolute block index.
pub fn block_to_sector(block: u16) -> u8 {
    let boundary = u16::from(SMALL_SECTORS) * SMALL_STRIDE;
    if block < boundary {
        (block / SMALL_STRIDE) as u8
    } else {
        SMALL_SECTORS + ((block - boundary) / LARGE_STRIDE) as u8
    }
}

/// Whether the block is a sector trailer (last block of its sector).
pub fn is_trailer_block(block: u16) -> bool {
    let sector = block_to_sector(block);
    block == sector_to_block(sector) + sector_block_count(sector) - 1
}
