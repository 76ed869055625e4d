//! The image and its page index: an immutable, randomly-addressable view
//! of the input, subdivided into fixed-size pages, plus the pool of pages
//! not yet claimed by any archive reconstruction.
//!
//! The image is a thin wrapper around a borrowed, zero-copy `&[u8]` view,
//! the same way a mapped archive's bytes are treated elsewhere in this
//! crate's ecosystem; here that view additionally knows its page geometry
//! and is shared read-only across the whole pipeline.

use std::collections::HashSet;

use crate::result::{SalvageError, SalvageResult};

/// Index of a page within the image (a page *number*, not a byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(pub usize);

/// An immutable, randomly-addressable view of the input image.
///
/// Backed by a `memmap2::Mmap` in the CLI binary, or an owned `Vec<u8>` in
/// tests; either way this type only ever borrows a slice, so it places no
/// requirements on how the bytes were obtained.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
    page_size: usize,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8], page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self { bytes, page_size }
    }

    /// Validates and constructs an image view, rejecting an image too
    /// small or too oddly sized to contain anything useful before the
    /// pipeline runs. `Image::new` remains available for tests that build
    /// already-known-good in-memory fixtures.
    pub fn open(bytes: &'a [u8], page_size: usize) -> SalvageResult<Self> {
        if page_size == 0 {
            return Err(SalvageError::InvalidImage("page size must be positive"));
        }
        if bytes.is_empty() {
            return Err(SalvageError::InvalidImage("image is empty"));
        }
        Ok(Self::new(bytes, page_size))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages needed to cover the whole image (the last may be
    /// short).
    pub fn page_count(&self) -> usize {
        self.len().div_ceil(self.page_size)
    }

    /// The page containing byte offset `off`.
    pub fn page_of_offset(&self, off: usize) -> PageIndex {
        PageIndex(off / self.page_size)
    }

    /// Bytes remaining between `off` and the end of the page containing it.
    pub fn bytes_left_in_page(&self, off: usize) -> usize {
        self.page_size - (off % self.page_size)
    }

    /// The raw bytes of a page, clipped to the image's actual length if the
    /// page runs past the end of a non-page-aligned image.
    pub fn page_bytes(&self, idx: PageIndex) -> &'a [u8] {
        let start = (idx.0 * self.page_size).min(self.len());
        let end = ((idx.0 + 1) * self.page_size).min(self.len());
        &self.bytes[start..end]
    }

    /// The image's bytes starting at `off`, running to the end of the
    /// image.
    pub fn bytes_from(&self, off: usize) -> &'a [u8] {
        &self.bytes[off..]
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }
}

/// The set of image pages not yet claimed by any archive reconstruction.
///
/// Owned by the pipeline driver and passed by `&mut` reference through
/// reassembly — there is no process-wide singleton.
#[derive(Debug, Clone)]
pub struct PagePool {
    available: HashSet<PageIndex>,
}

impl PagePool {
    /// A fresh pool containing every page of an image with `page_count`
    /// pages.
    pub fn new(page_count: usize) -> Self {
        Self {
            available: (0..page_count).map(PageIndex).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// If `idx` is still in the pool, remove and return it.
    pub fn take(&mut self, idx: PageIndex) -> Option<PageIndex> {
        self.available.take(&idx)
    }

    /// Convenience: take whichever page contains byte offset `off`.
    pub fn take_at_offset(&mut self, image: &Image, off: usize) -> Option<PageIndex> {
        self.take(image.page_of_offset(off))
    }

    pub fn contains(&self, idx: PageIndex) -> bool {
        self.available.contains(&idx)
    }

    /// Every page index still in the pool, in no particular order. Used by
    /// the advisory gap-filling pass (`crate::reassemble::crc_gap_fill`) to
    /// enumerate candidates without removing them.
    pub fn candidates(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.available.iter().copied()
    }
}

/// Whether byte offset `off` falls within any of the present slots of
/// `slots`, given the image's page geometry.
pub fn slots_contain_offset(slots: &[Option<PageIndex>], image: &Image, off: usize) -> bool {
    let target = image.page_of_offset(off);
    slots.iter().any(|s| *s == Some(target))
}
