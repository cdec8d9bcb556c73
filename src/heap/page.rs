//! Page header parsing and line-pointer iteration.
//!
//! Every heap page begins with a 24-byte header ([`PageHeader`]) followed by
//! an array of 4-byte line pointers growing towards `pd_lower`; tuple data
//! grows down from `pd_special` towards `pd_upper`. [`HeapPage`] wraps an
//! immutable page buffer and exposes bounds-checked access to both — raw
//! structs are never overlaid on the bytes.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::heap::constants::*;
use crate::heap::HeapError;

/// Parsed page header (24 bytes, present at the start of every page).
#[derive(Debug, Clone, Serialize)]
pub struct PageHeader {
    /// LSN of the last WAL record for this page.
    pub lsn: u64,
    /// Stored data checksum, zero when checksums are disabled.
    pub checksum: u16,
    /// Flag bits (PD_HAS_FREE_LINES, PD_PAGE_FULL, PD_ALL_VISIBLE).
    pub flags: u16,
    /// Offset to start of free space.
    pub lower: u16,
    /// Offset to end of free space.
    pub upper: u16,
    /// Offset to start of special space.
    pub special: u16,
    /// Page size and layout version, packed.
    pub pagesize_version: u16,
    /// Oldest prunable XID, or zero if none.
    pub prune_xid: u32,
}

impl PageHeader {
    /// Read the header fields from a page buffer.
    ///
    /// The slice must be at least SIZE_PAGE_HEADER (24) bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_PAGE_HEADER {
            return None;
        }

        // pd_lsn is stored as two 32-bit halves (xlogid, xrecoff).
        let xlogid = LittleEndian::read_u32(&data[PD_LSN..]);
        let xrecoff = LittleEndian::read_u32(&data[PD_LSN + 4..]);

        Some(PageHeader {
            lsn: (xlogid as u64) << 32 | xrecoff as u64,
            checksum: LittleEndian::read_u16(&data[PD_CHECKSUM..]),
            flags: LittleEndian::read_u16(&data[PD_FLAGS..]),
            lower: LittleEndian::read_u16(&data[PD_LOWER..]),
            upper: LittleEndian::read_u16(&data[PD_UPPER..]),
            special: LittleEndian::read_u16(&data[PD_SPECIAL..]),
            pagesize_version: LittleEndian::read_u16(&data[PD_PAGESIZE_VERSION..]),
            prune_xid: LittleEndian::read_u32(&data[PD_PRUNE_XID..]),
        })
    }

    /// Page size recorded in the header (high byte of pagesize_version).
    pub fn page_size(&self) -> usize {
        (self.pagesize_version & 0xFF00) as usize
    }

    /// Page layout version (low byte of pagesize_version).
    pub fn layout_version(&self) -> u8 {
        (self.pagesize_version & 0x00FF) as u8
    }

    /// Check the free-space invariants that every valid heap page satisfies.
    fn is_well_formed(&self) -> bool {
        let lower = self.lower as usize;
        let upper = self.upper as usize;
        let special = self.special as usize;
        lower >= SIZE_PAGE_HEADER && lower <= upper && upper <= special && special <= BLCKSZ
    }
}

/// Line pointer state, from the 2 flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LpFlags {
    /// Unused slot (length is always zero).
    Unused,
    /// Used slot pointing at tuple storage.
    Normal,
    /// HOT redirect to another slot.
    Redirect,
    /// Dead slot.
    Dead,
}

impl LpFlags {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            LP_UNUSED => LpFlags::Unused,
            LP_NORMAL => LpFlags::Normal,
            LP_REDIRECT => LpFlags::Redirect,
            _ => LpFlags::Dead,
        }
    }
}

/// One line pointer: read-only accessors over the packed u32
/// (`offset:15, flags:2, len:15`).
#[derive(Debug, Clone, Copy)]
pub struct LinePointer(u32);

impl LinePointer {
    /// Byte offset of the item from the start of the page.
    pub fn offset(&self) -> usize {
        (self.0 & 0x7FFF) as usize
    }

    /// Line pointer state.
    pub fn flags(&self) -> LpFlags {
        LpFlags::from_bits(((self.0 >> 15) & 0x03) as u8)
    }

    /// Byte length of the item (zero for redirects and unused slots).
    pub fn len(&self) -> usize {
        ((self.0 >> 17) & 0x7FFF) as usize
    }

    /// True when the slot carries no storage.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of opening a page buffer.
#[derive(Debug)]
pub enum OpenedPage<'a> {
    /// A well-formed page with items to walk.
    Heap(HeapPage<'a>),
    /// An all-zero page: freshly extended, never written. Yields no items.
    NewEmpty,
}

/// An immutable view over one 8 KiB page buffer.
#[derive(Debug)]
pub struct HeapPage<'a> {
    data: &'a [u8],
    /// Parsed header fields.
    pub header: PageHeader,
}

impl<'a> HeapPage<'a> {
    /// Validate and open a page buffer.
    ///
    /// Returns [`OpenedPage::NewEmpty`] for an all-zero page and
    /// [`HeapError::MalformedPage`] when the header violates the free-space
    /// invariants (callers count and skip such pages).
    pub fn open(data: &'a [u8]) -> Result<OpenedPage<'a>, HeapError> {
        if data.len() < BLCKSZ {
            return Err(HeapError::MalformedPage);
        }
        let data = &data[..BLCKSZ];

        let header = PageHeader::parse(data).ok_or(HeapError::MalformedPage)?;

        if header.upper == 0 && data.iter().all(|&b| b == 0) {
            return Ok(OpenedPage::NewEmpty);
        }

        if !header.is_well_formed() {
            return Err(HeapError::MalformedPage);
        }

        Ok(OpenedPage::Heap(HeapPage { data, header }))
    }

    /// Number of line pointer slots on the page.
    pub fn line_pointer_count(&self) -> usize {
        let lower = self.header.lower as usize;
        if lower <= SIZE_PAGE_HEADER {
            0
        } else {
            (lower - SIZE_PAGE_HEADER) / SIZE_LINE_POINTER
        }
    }

    /// Fetch the line pointer in `slot` (1-based, like offset numbers).
    pub fn line_pointer(&self, slot: usize) -> Option<LinePointer> {
        if slot == 0 || slot > self.line_pointer_count() {
            return None;
        }
        let off = SIZE_PAGE_HEADER + (slot - 1) * SIZE_LINE_POINTER;
        Some(LinePointer(LittleEndian::read_u32(&self.data[off..off + 4])))
    }

    /// Iterate the usable slots in slot order.
    ///
    /// Unused and dead slots are skipped. Redirect slots are passed through
    /// with `len = 0` so callers can follow or count them.
    pub fn items(&self) -> impl Iterator<Item = (usize, LinePointer)> + '_ {
        (1..=self.line_pointer_count()).filter_map(move |slot| {
            let lp = self.line_pointer(slot)?;
            match lp.flags() {
                LpFlags::Unused | LpFlags::Dead => None,
                LpFlags::Normal | LpFlags::Redirect => Some((slot, lp)),
            }
        })
    }

    /// Borrow the item bytes a Normal line pointer refers to.
    ///
    /// The range is checked against the page's special space; a pointer
    /// whose item escapes it yields [`HeapError::ItemOverrun`].
    pub fn item_bytes(&self, lp: &LinePointer) -> Result<&'a [u8], HeapError> {
        let off = lp.offset();
        let len = lp.len();
        let special = self.header.special as usize;

        if lp.is_empty() || off < SIZE_PAGE_HEADER || off % MAXIMUM_ALIGNOF != 0 {
            return Err(HeapError::ItemOverrun);
        }
        if off + len > special {
            return Err(HeapError::ItemOverrun);
        }
        Ok(&self.data[off..off + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(items: &[&[u8]]) -> Vec<u8> {
        let mut page = vec![0u8; BLCKSZ];
        let n = items.len();
        let lower = SIZE_PAGE_HEADER + n * SIZE_LINE_POINTER;

        let mut upper = BLCKSZ;
        for (i, item) in items.iter().enumerate() {
            upper = (upper - item.len()) & !(MAXIMUM_ALIGNOF - 1);
            page[upper..upper + item.len()].copy_from_slice(item);
            let lp = (upper as u32) | ((LP_NORMAL as u32) << 15) | ((item.len() as u32) << 17);
            let off = SIZE_PAGE_HEADER + i * SIZE_LINE_POINTER;
            LittleEndian::write_u32(&mut page[off..], lp);
        }

        LittleEndian::write_u16(&mut page[PD_LOWER..], lower as u16);
        LittleEndian::write_u16(&mut page[PD_UPPER..], upper as u16);
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], BLCKSZ as u16);
        LittleEndian::write_u16(&mut page[PD_PAGESIZE_VERSION..], 0x2004);
        page
    }

    #[test]
    fn test_open_all_zero_page() {
        let page = vec![0u8; BLCKSZ];
        match HeapPage::open(&page).unwrap() {
            OpenedPage::NewEmpty => {}
            OpenedPage::Heap(_) => panic!("all-zero page must be NewEmpty"),
        }
    }

    #[test]
    fn test_open_rejects_short_buffer() {
        let page = vec![0u8; 100];
        assert_eq!(HeapPage::open(&page).unwrap_err(), HeapError::MalformedPage);
    }

    #[test]
    fn test_open_rejects_inverted_bounds() {
        let mut page = vec![0u8; BLCKSZ];
        LittleEndian::write_u16(&mut page[PD_LOWER..], 4000);
        LittleEndian::write_u16(&mut page[PD_UPPER..], 100);
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], BLCKSZ as u16);
        assert_eq!(HeapPage::open(&page).unwrap_err(), HeapError::MalformedPage);
    }

    #[test]
    fn test_open_rejects_special_past_page() {
        let mut page = vec![0u8; BLCKSZ];
        LittleEndian::write_u16(&mut page[PD_LOWER..], SIZE_PAGE_HEADER as u16);
        LittleEndian::write_u16(&mut page[PD_UPPER..], 8000);
        // special cannot exceed the block, but u16 cannot express > 8192 here;
        // use upper > special instead
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], 7000);
        assert_eq!(HeapPage::open(&page).unwrap_err(), HeapError::MalformedPage);
    }

    #[test]
    fn test_line_pointer_packing() {
        let lp = LinePointer(8152 | (1 << 15) | (40 << 17));
        assert_eq!(lp.offset(), 8152);
        assert_eq!(lp.flags(), LpFlags::Normal);
        assert_eq!(lp.len(), 40);
    }

    #[test]
    fn test_items_iteration_and_bytes() {
        let item_a = [0xAAu8; 32];
        let item_b = [0xBBu8; 16];
        let page_bytes = build_page(&[&item_a, &item_b]);

        let page = match HeapPage::open(&page_bytes).unwrap() {
            OpenedPage::Heap(p) => p,
            _ => panic!("expected heap page"),
        };

        let items: Vec<_> = page.items().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, 1);
        assert_eq!(page.item_bytes(&items[0].1).unwrap(), &item_a[..]);
        assert_eq!(page.item_bytes(&items[1].1).unwrap(), &item_b[..]);
    }

    #[test]
    fn test_items_skip_dead_and_unused() {
        let item = [0xCCu8; 24];
        let mut page_bytes = build_page(&[&item, &item, &item]);

        // Mark slot 2 dead and slot 3 unused.
        let off2 = SIZE_PAGE_HEADER + SIZE_LINE_POINTER;
        let mut lp2 = LittleEndian::read_u32(&page_bytes[off2..]);
        lp2 = (lp2 & !(0x03 << 15)) | ((LP_DEAD as u32) << 15);
        LittleEndian::write_u32(&mut page_bytes[off2..], lp2);
        let off3 = SIZE_PAGE_HEADER + 2 * SIZE_LINE_POINTER;
        LittleEndian::write_u32(&mut page_bytes[off3..], 0);

        let page = match HeapPage::open(&page_bytes).unwrap() {
            OpenedPage::Heap(p) => p,
            _ => panic!("expected heap page"),
        };
        let slots: Vec<usize> = page.items().map(|(s, _)| s).collect();
        assert_eq!(slots, vec![1]);
    }

    #[test]
    fn test_item_bytes_rejects_overrun() {
        let item = [0xDDu8; 24];
        let mut page_bytes = build_page(&[&item]);

        // Shrink special below the item end.
        let off = SIZE_PAGE_HEADER;
        let lp = LinePointer(LittleEndian::read_u32(&page_bytes[off..]));
        LittleEndian::write_u16(&mut page_bytes[PD_SPECIAL..], (lp.offset() + 8) as u16);
        LittleEndian::write_u16(&mut page_bytes[PD_UPPER..], (lp.offset() + 8) as u16);

        let page = match HeapPage::open(&page_bytes).unwrap() {
            OpenedPage::Heap(p) => p,
            _ => panic!("expected heap page"),
        };
        let lp = page.line_pointer(1).unwrap();
        assert_eq!(page.item_bytes(&lp).unwrap_err(), HeapError::ItemOverrun);
    }

    #[test]
    fn test_random_pages_never_yield_out_of_bounds() {
        // Deterministic pseudo-random fill; open() either rejects the page
        // or every yielded item stays within [header, special).
        let mut seed = 0x2545F491u32;
        let mut page = vec![0u8; BLCKSZ];
        for round in 0..32 {
            for b in page.iter_mut() {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                *b = (seed >> 24) as u8;
            }
            if let Ok(OpenedPage::Heap(p)) = HeapPage::open(&page) {
                for (_, lp) in p.items() {
                    if let Ok(bytes) = p.item_bytes(&lp) {
                        assert!(lp.offset() >= SIZE_PAGE_HEADER, "round {}", round);
                        assert!(lp.offset() + bytes.len() <= p.header.special as usize);
                    }
                }
            }
        }
    }
}
