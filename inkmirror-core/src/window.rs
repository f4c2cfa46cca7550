//! Memory window resolution.
//!
//! Turns a byte offset inside the display process's address space into
//! the page-aligned parameters the remote block-read primitive needs.
//!
//! ```text
//! block:  | start_block | start_block+1 | … | start_block+length_blocks-1 |
//! bytes:  |<-offset->|<------------- window_bytes ------------>|  slack  |
//! ```

use crate::error::MirrorError;

// ── MemoryWindow ─────────────────────────────────────────────────

/// Page-aligned description of one frame's worth of remote memory.
///
/// Immutable once resolved; one instance per capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWindow {
    /// Byte offset of the first pixel in the process address space.
    pub base_address: u64,
    /// Block size of the remote read primitive.
    pub page_size: u64,
    /// Bytes in one frame.
    pub window_bytes: u64,
    /// First block to read.
    pub start_block: u64,
    /// Leading bytes of the first block that precede the window.
    pub offset_in_page: u64,
    /// Number of blocks to read so the window is fully covered.
    pub length_blocks: u64,
}

impl MemoryWindow {
    /// Resolve the block parameters for a window starting at `base_address`.
    ///
    /// Fails with [`MirrorError::InvalidInput`] when `page_size` or
    /// `window_bytes` is zero, or when the blocks to read would not fit in
    /// the address space.
    pub fn resolve(base_address: u64, page_size: u64, window_bytes: u64) -> Result<Self, MirrorError> {
        if page_size == 0 {
            return Err(MirrorError::InvalidInput("page size must be positive".into()));
        }
        if window_bytes == 0 {
            return Err(MirrorError::InvalidInput("window size must be positive".into()));
        }

        let start_block = base_address / page_size;
        let offset_in_page = base_address % page_size;

        let too_large = || MirrorError::InvalidInput(format!("window of {window_bytes} bytes is too large"));
        let needed = window_bytes.checked_add(offset_in_page).ok_or_else(too_large)?;

        // One block of over-read normally absorbs the leading offset. When the
        // window tail and the offset together spill past that, read one more.
        let mut length_blocks = (window_bytes / page_size).checked_add(1).ok_or_else(too_large)?;
        if length_blocks.checked_mul(page_size).ok_or_else(too_large)? < needed {
            length_blocks = length_blocks.checked_add(1).ok_or_else(too_large)?;
            length_blocks.checked_mul(page_size).ok_or_else(too_large)?;
        }

        Ok(Self {
            base_address,
            page_size,
            window_bytes,
            start_block,
            offset_in_page,
            length_blocks,
        })
    }

    /// Total bytes the block read returns before trimming.
    pub fn read_bytes(&self) -> u64 {
        self.length_blocks * self.page_size
    }
}

// ── Address parsing ──────────────────────────────────────────────

/// Parse a hexadecimal address as printed in a process memory map.
///
/// Accepts an optional `0x` prefix and surrounding whitespace.
pub fn parse_hex_address(text: &str) -> Result<u64, MirrorError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(MirrorError::Parse("empty address".into()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| MirrorError::Parse(format!("invalid hex address {trimmed:?}: {e}")))
}

/// Extract the start address from a memory-map line.
///
/// Takes either a full `/proc/<pid>/maps` line (`start-end perms …`) or
/// just its leading field, and returns the start address.
pub fn parse_map_start(line: &str) -> Result<u64, MirrorError> {
    let field = line.trim().split('-').next().unwrap_or_default();
    parse_hex_address(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{PAGE_SIZE, WINDOW_BYTES};

    #[test]
    fn resolves_blocks_and_offset() {
        let w = MemoryWindow::resolve(0x7000_1008, 4096, WINDOW_BYTES as u64).unwrap();
        assert_eq!(w.start_block, 0x7000_1008 / 4096);
        assert_eq!(w.offset_in_page, 8);
        assert_eq!(w.length_blocks, WINDOW_BYTES as u64 / 4096 + 1);
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let err = MemoryWindow::resolve(1234, 0, 100).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidInput(_)));
    }

    #[test]
    fn zero_window_is_invalid() {
        let err = MemoryWindow::resolve(1234, 4096, 0).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidInput(_)));
    }

    #[test]
    fn oversized_window_is_invalid() {
        for (base, page, window) in [(4095, 4096, u64::MAX - 10), (0, 1, u64::MAX), (7, 8, u64::MAX - 2)] {
            let err = MemoryWindow::resolve(base, page, window).unwrap_err();
            assert!(matches!(err, MirrorError::InvalidInput(_)), "{base} {page} {window}");
        }
    }

    #[test]
    fn block_decomposition_reconstructs_address() {
        let pages = [1u64, 7, 512, 4096, 65536];
        let addresses = [0u64, 1, 4095, 4096, 4097, 0xdead_beef, 0x7f12_3456_7008, u64::MAX / 2];
        for &page in &pages {
            for &addr in &addresses {
                let w = MemoryWindow::resolve(addr, page, 1000).unwrap();
                assert_eq!(w.start_block * page + w.offset_in_page, addr);
                assert!(w.offset_in_page < page);
            }
        }
    }

    #[test]
    fn window_always_covered_after_trim() {
        let windows = [1u64, 100, 4095, 4096, 4097, 5000, 8191, WINDOW_BYTES as u64];
        for &window in &windows {
            for offset in [0u64, 1, 8, 2752, 3000, 4095] {
                let w = MemoryWindow::resolve(PAGE_SIZE * 100 + offset, PAGE_SIZE, window).unwrap();
                assert!(
                    w.read_bytes() >= window + w.offset_in_page,
                    "window {window} offset {offset} not covered"
                );
            }
        }
    }

    #[test]
    fn parses_map_lines() {
        assert_eq!(parse_hex_address("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_hex_address(" 7f2a3000\n").unwrap(), 0x7f2a_3000);
        assert_eq!(
            parse_map_start("73a1c000-74a1c000 rw-s 00000000 00:06 282 /dev/fb0").unwrap(),
            0x73a1_c000
        );
        assert!(matches!(parse_hex_address("zz"), Err(MirrorError::Parse(_))));
        assert!(matches!(parse_map_start("\n"), Err(MirrorError::Parse(_))));
    }
}
