//! Paged packed integer array.
//!
//! Backing storage for every flat array the engine builds. A single
//! `Vec<u32>` would cap total storage at a little over 2^32 elements times
//! 4 bytes; snapshots with very large edge counts can exceed that on
//! 32-bit-indexable platforms, so storage is paged into fixed-size chunks
//! addressed by a 64-bit logical index.

const PAGE_BITS: u32 = 24;
const PAGE_SIZE: usize = 1 << PAGE_BITS;
const PAGE_MASK: u64 = (PAGE_SIZE as u64) - 1;

/// A flat `u32` array, chunked into pages so the total element count is
/// not bounded by a single allocation's `usize` limits on constrained
/// targets. No accessor allocates after construction.
#[derive(Debug, Clone)]
pub struct PagedU32Array {
    pages: Vec<Vec<u32>>,
    len: u64,
}

impl PagedU32Array {
    /// Allocate a zero-filled array of `len` elements.
    pub fn zeroed(len: u64) -> Self {
        let page_count = if len == 0 {
            0
        } else {
            ((len - 1) / PAGE_SIZE as u64) + 1
        };
        let mut pages = Vec::with_capacity(page_count as usize);
        let mut remaining = len;
        for _ in 0..page_count {
            let this_page = remaining.min(PAGE_SIZE as u64) as usize;
            pages.push(vec![0u32; this_page]);
            remaining -= this_page as u64;
        }
        PagedU32Array { pages, len }
    }

    /// Build a paged array from a single contiguous slice (used when
    /// adapting already-flat `Vec<u32>` input, e.g. the raw `nodes`/`edges`
    /// arrays from a parsed snapshot file).
    pub fn from_flat(flat: Vec<u32>) -> Self {
        let len = flat.len() as u64;
        if flat.len() <= PAGE_SIZE {
            return PagedU32Array {
                pages: vec![flat],
                len,
            };
        }
        let mut pages = Vec::new();
        let mut rest = flat.as_slice();
        while !rest.is_empty() {
            let take = rest.len().min(PAGE_SIZE);
            pages.push(rest[..take].to_vec());
            rest = &rest[take..];
        }
        PagedU32Array { pages, len }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn locate(index: u64) -> (usize, usize) {
        ((index >> PAGE_BITS) as usize, (index & PAGE_MASK) as usize)
    }

    #[inline]
    pub fn get(&self, index: u64) -> u32 {
        let (page, offset) = Self::locate(index);
        self.pages[page][offset]
    }

    #[inline]
    pub fn set(&mut self, index: u64, value: u32) {
        let (page, offset) = Self::locate(index);
        self.pages[page][offset] = value;
    }

    /// Iterate all elements in order without materializing a contiguous copy.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().flat_map(|page| page.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_roundtrips() {
        let mut arr = PagedU32Array::zeroed(10);
        assert_eq!(arr.len(), 10);
        for i in 0..10 {
            assert_eq!(arr.get(i), 0);
        }
        arr.set(3, 42);
        assert_eq!(arr.get(3), 42);
    }

    #[test]
    fn spans_multiple_pages() {
        let big_len = (1u64 << PAGE_BITS) + 5;
        let mut arr = PagedU32Array::zeroed(big_len);
        arr.set(0, 1);
        arr.set(1 << PAGE_BITS, 2);
        arr.set(big_len - 1, 3);
        assert_eq!(arr.get(0), 1);
        assert_eq!(arr.get(1 << PAGE_BITS), 2);
        assert_eq!(arr.get(big_len - 1), 3);
    }

    #[test]
    fn from_flat_preserves_order() {
        let flat: Vec<u32> = (0..1000).collect();
        let arr = PagedU32Array::from_flat(flat.clone());
        assert_eq!(arr.len(), 1000);
        let collected: Vec<u32> = arr.iter().collect();
        assert_eq!(collected, flat);
    }

    #[test]
    fn from_flat_spans_pages() {
        let big_len = (1usize << PAGE_BITS) + 5;
        let flat: Vec<u32> = (0..big_len as u32).collect();
        let arr = PagedU32Array::from_flat(flat.clone());
        assert_eq!(arr.len() as usize, big_len);
        assert_eq!(arr.get(0), flat[0]);
        assert_eq!(arr.get(big_len as u64 - 1), flat[big_len - 1]);
    }
}
