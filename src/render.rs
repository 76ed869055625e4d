//! Materializes a reconstructed page array into the final archive bytes,
//! plus the MD5 fingerprint used to name the output file.

use crate::image::{Image, PageIndex};

/// Concatenates a page array into bytes, without trimming. Each absent slot
/// contributes `page_size` zero bytes. Used both for the final render (after
/// trimming) and, internally, to re-parse CDHs from an in-progress
/// reconstruction (`crate::reassemble::place_local_file_headers`).
pub fn materialize(image: &Image, page_array: &[Option<PageIndex>]) -> Vec<u8> {
    let page_size = image.page_size();
    let mut out = Vec::with_capacity(page_array.len() * page_size);
    for slot in page_array {
        match slot {
            Some(idx) => {
                let bytes = image.page_bytes(*idx);
                out.extend_from_slice(bytes);
                // A page clipped short by the image's own end is padded to a
                // full page, so every page contributes exactly `page_size`
                // bytes and slot arithmetic elsewhere stays page-aligned.
                if bytes.len() < page_size {
                    out.resize(out.len() + (page_size - bytes.len()), 0);
                }
            }
            None => out.resize(out.len() + page_size, 0),
        }
    }
    out
}

/// Renders the final archive stream: materializes the page array, then
/// trims the leading `start_offset` bytes so the stream begins at what was
/// originally byte 0 of the archive.
pub fn render(image: &Image, page_array: &[Option<PageIndex>], start_offset: usize) -> Vec<u8> {
    let mut bytes = materialize(image, page_array);
    let start_offset = start_offset.min(bytes.len());
    bytes.drain(..start_offset);
    bytes
}

/// MD5 hex digest of a rendered stream, used as a naming convenience for the
/// output file (`recovered_<md5-hex>.zip`) — not a security property.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_zero_fills_absent_slots() {
        let data = vec![0xAAu8; 1024];
        let image = Image::new(&data, 1024);
        let page_array = vec![Some(PageIndex(0)), None];
        let bytes = materialize(&image, &page_array);
        assert_eq!(bytes.len(), 2048);
        assert!(bytes[..1024].iter().all(|&b| b == 0xAA));
        assert!(bytes[1024..].iter().all(|&b| b == 0));
    }

    #[test]
    fn render_trims_start_offset() {
        let data = vec![1u8; 2048];
        let image = Image::new(&data, 1024);
        let page_array = vec![Some(PageIndex(0)), Some(PageIndex(1))];
        let bytes = render(&image, &page_array, 1000);
        assert_eq!(bytes.len(), 1048);
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = fingerprint(b"hello");
        let b = fingerprint(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }
}
