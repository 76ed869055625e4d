//! Per-archive reassembly orchestration: central directory page gathering,
//! local file header placement, and advisory gap-filling, each expressed as
//! an independently testable total function that the pipeline driver
//! (`crate::pipeline`) composes.

use std::ops::Range;

use crate::entropy;
use crate::image::{Image, PageIndex, PagePool};
use crate::pipeline::Diagnostic;
use crate::scan;
use crate::spec::{flags, CentralDirectoryHeader, EndOfCentralDirectory, CDH_MAGIC};

/// A run of absent slots in a reconstructed page array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start_index: usize,
    pub length: usize,
}

/// Where a member's local file header landed, recorded so the advisory
/// gap-filler (§4.7) can checksum a candidate without re-deriving it.
#[derive(Debug, Clone)]
pub struct LfhPlacement {
    pub lfh_slot: usize,
    /// Byte offset of the LFH magic within its own page; preserved verbatim
    /// when the whole page is carried into the archive's page array.
    pub lfh_intra_offset: usize,
    pub filename_len: usize,
    pub compressed_size: u32,
    pub crc32: u32,
}

/// Result of running both reassembly passes for one archive.
#[derive(Debug, Clone)]
pub struct ArchiveBuild {
    pub page_array: Vec<Option<PageIndex>>,
    pub start_offset: usize,
    pub member_count: usize,
    pub placements: Vec<LfhPlacement>,
    pub gaps: Vec<Gap>,
}

/// Pass 1: reconstructs the ordered central-directory page run for one
/// archive's silo of clustered `CentralDirectoryHeader` records.
///
/// Consumes the silo in ascending `lfh_offset` order, so the returned page
/// list is itself ordered along increasing archive offset. Stops early once
/// the smallest remaining `lfh_offset` lies past every discovered archive's
/// CD region — those entries are left in place rather than misfiled.
pub fn assemble_central_directory(
    image: &Image,
    pool: &mut PagePool,
    mut silo: Vec<CentralDirectoryHeader>,
    all_cd_offsets: &[u32],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<PageIndex> {
    let mut pages: Vec<PageIndex> = Vec::new();

    while !silo.is_empty() {
        let (min_idx, _) = silo
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.lfh_offset)
            .expect("silo is non-empty");
        let chunk = silo.remove(min_idx);

        if all_cd_offsets.iter().all(|&co| chunk.lfh_offset > co) {
            break;
        }

        let page = image.page_of_offset(chunk.ptr);
        if pages.contains(&page) {
            // Re-encounter within a multi-CDH page: already claimed by this
            // archive, proceed without error.
        } else if let Some(taken) = pool.take(page) {
            pages.push(taken);
        } else {
            diagnostics.push(Diagnostic::CdPageLost { ptr: chunk.ptr });
        }
    }

    pages
}

/// Pass 1, step 3: binds a silo's assembled CD page list to the EOCD whose
/// own magic falls on the silo's final CD page. This is what connects
/// CDHs-by-clustering to EOCDs-by-content.
pub fn match_eocd<'a>(
    image: &Image,
    pages: &[PageIndex],
    eocds: &'a [EndOfCentralDirectory],
) -> Option<&'a EndOfCentralDirectory> {
    let last = *pages.last()?;
    eocds
        .iter()
        .find(|z| image.page_of_offset(z.ptr) == last)
}

/// Pass 2: places local-file-header pages for one archive, given its
/// assembled CD page run and matching EOCD.
///
/// Builds the scratch page array, copies the CD pages to their archive
/// position, re-parses CDH records from the assembled bytes (the
/// authoritative member list once page reassembly may have healed
/// cross-page splits), and for each, searches the whole image for its
/// synthesized LFH pattern — installing the page only when exactly one
/// match is found. Never guesses.
pub fn place_local_file_headers(
    image: &Image,
    pool: &mut PagePool,
    cd_pages: &[PageIndex],
    eocd: &EndOfCentralDirectory,
    diagnostics: &mut Vec<Diagnostic>,
) -> ArchiveBuild {
    let page_size = image.page_size();
    let mut page_array: Vec<Option<PageIndex>> = vec![None; eocd.page_count];

    let cd_start_page = (eocd.start_offset + eocd.cd_offset as usize) / page_size;
    for (i, page) in cd_pages.iter().enumerate() {
        let slot = cd_start_page + i;
        if slot < page_array.len() {
            page_array[slot] = Some(*page);
        }
    }

    let rendered = crate::render::materialize(image, &page_array);
    let scratch = Image::new(&rendered, page_size);
    let mut members = Vec::new();
    let mut placements = Vec::new();

    for ptr in scan::find_all(&rendered, &CDH_MAGIC) {
        let Some(cdh) = CentralDirectoryHeader::parse(&scratch, ptr) else {
            continue;
        };

        let pattern = cdh.to_lfh_pattern();
        let matches = scan::find_all(image.as_slice(), &pattern);
        let mut lfh_match = None;

        match matches.len() {
            0 => diagnostics.push(Diagnostic::LfhNotFound {
                lfh_offset: cdh.lfh_offset,
            }),
            1 => {
                let m = matches[0];
                let target_slot = (cdh.lfh_offset as usize + eocd.start_offset) / page_size;
                let page_at_m = image.page_of_offset(m);
                if target_slot < page_array.len() {
                    if let Some(taken) = pool.take(page_at_m) {
                        page_array[target_slot] = Some(taken);
                        lfh_match = Some((m, target_slot));
                    } else if page_array[target_slot] == Some(page_at_m) {
                        lfh_match = Some((m, target_slot));
                    } else {
                        diagnostics.push(Diagnostic::LostLfhPage { ptr: m });
                    }
                }
            }
            n => diagnostics.push(Diagnostic::AmbiguousLfhPlacement {
                lfh_offset: cdh.lfh_offset,
                matches: n,
            }),
        }

        if let Some((m, target_slot)) = lfh_match {
            placements.push(LfhPlacement {
                lfh_slot: target_slot,
                lfh_intra_offset: m % page_size,
                filename_len: cdh.filename.len(),
                compressed_size: cdh.compressed_size,
                crc32: cdh.crc32,
            });

            if flags::is_set(cdh.flags, flags::DATA_DESCRIPTOR) {
                place_data_descriptor(image, pool, &mut page_array, &cdh, m, target_slot, diagnostics);
            }
        }

        members.push(cdh);
    }

    let gaps = find_gaps(&page_array);

    ArchiveBuild {
        page_array,
        start_offset: eocd.start_offset,
        member_count: members.len(),
        placements,
        gaps,
    }
}

/// Places a member's trailing data descriptor page, when present.
///
/// Its archive-relative slot isn't given directly by any CDH field (the
/// descriptor follows the compressed payload, whose length this engine never
/// interprets), so it's derived from the same page displacement already
/// established by the member's own LFH placement: the number of image pages
/// between the LFH and the descriptor is assumed to carry over unchanged
/// into the archive's page array.
fn place_data_descriptor(
    image: &Image,
    pool: &mut PagePool,
    page_array: &mut [Option<PageIndex>],
    cdh: &CentralDirectoryHeader,
    lfh_match_ptr: usize,
    lfh_target_slot: usize,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let pattern = cdh.to_data_descriptor_pattern();
    let matches = scan::find_all(image.as_slice(), &pattern);
    match matches.len() {
        1 => {
            let dd_ptr = matches[0];
            let delta = image.page_of_offset(dd_ptr).0 as isize
                - image.page_of_offset(lfh_match_ptr).0 as isize;
            let dd_slot = lfh_target_slot as isize + delta;
            if dd_slot < 0 || dd_slot as usize >= page_array.len() {
                return;
            }
            let dd_slot = dd_slot as usize;
            let dd_page = image.page_of_offset(dd_ptr);
            if let Some(taken) = pool.take(dd_page) {
                page_array[dd_slot] = Some(taken);
            } else if page_array[dd_slot] != Some(dd_page) {
                diagnostics.push(Diagnostic::LostLfhPage { ptr: dd_ptr });
            }
        }
        0 => {}
        n => diagnostics.push(Diagnostic::AmbiguousDataDescriptor {
            lfh_offset: cdh.lfh_offset,
            matches: n,
        }),
    }
}

/// Scans a page array for runs of absent slots, sorted ascending by length:
/// candidates for a gap-filling strategy.
pub fn find_gaps(page_array: &[Option<PageIndex>]) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut run_start = None;
    for (i, slot) in page_array.iter().enumerate() {
        match (slot.is_none(), run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                gaps.push(Gap {
                    start_index: start,
                    length: i - start,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        gaps.push(Gap {
            start_index: start,
            length: page_array.len() - start,
        });
    }
    gaps.sort_by_key(|g| g.length);
    gaps
}

fn member_span(placement: &LfhPlacement, page_size: usize) -> Range<usize> {
    let header_size = 30 + placement.filename_len;
    let payload_pages = (header_size as u64 + placement.compressed_size as u64)
        .div_ceil(page_size as u64)
        .max(1) as usize;
    placement.lfh_slot..(placement.lfh_slot + payload_pages)
}

fn member_crc_matches(
    image: &Image,
    page_array: &[Option<PageIndex>],
    placement: &LfhPlacement,
    page_size: usize,
) -> bool {
    let span = member_span(placement, page_size);
    let mut buf = Vec::with_capacity(span.len() * page_size);
    for slot in span {
        match page_array.get(slot).copied().flatten() {
            Some(idx) => buf.extend_from_slice(image.page_bytes(idx)),
            None => return false,
        }
    }
    let header_size = 30 + placement.filename_len;
    let payload_start = placement.lfh_intra_offset + header_size;
    let payload_end = payload_start + placement.compressed_size as usize;
    if buf.len() < payload_end {
        return false;
    }
    crc32fast::hash(&buf[payload_start..payload_end]) == placement.crc32
}

/// Advisory, best-effort gap-filling: for single-page gaps
/// whose member is otherwise fully present, tries every remaining pool page
/// that doesn't look near-empty (`EntropyOracle`) and installs the one
/// candidate, if exactly one, whose CRC-32 matches the member's declared
/// checksum. Multi-page gaps are left untouched. Never errors; skipping
/// this pass entirely still leaves a conformant reconstruction.
pub fn crc_gap_fill(
    image: &Image,
    pool: &mut PagePool,
    page_array: &mut [Option<PageIndex>],
    placements: &[LfhPlacement],
) {
    let page_size = image.page_size();
    let gaps = find_gaps(page_array);

    for gap in gaps.iter().filter(|g| g.length == 1) {
        let slot = gap.start_index;
        let Some(placement) = placements
            .iter()
            .find(|p| slot != p.lfh_slot && member_span(p, page_size).contains(&slot))
        else {
            continue;
        };

        let span = member_span(placement, page_size);
        if span.clone().any(|s| s != slot && page_array.get(s).copied().flatten().is_none()) {
            continue; // more than one hole in this member's span
        }

        let mut candidates: Vec<PageIndex> = pool
            .candidates()
            .filter(|&p| !entropy::is_near_empty(image.page_bytes(p)))
            .collect();
        candidates.sort();

        let mut matching = None;
        for candidate in candidates {
            page_array[slot] = Some(candidate);
            if member_crc_matches(image, page_array, placement, page_size) {
                if matching.is_some() {
                    matching = None;
                    break;
                }
                matching = Some(candidate);
            }
        }
        page_array[slot] = None;

        if let Some(candidate) = matching {
            pool.take(candidate);
            page_array[slot] = Some(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lfh_bytes(flags: u16, filename: &[u8], crc: u32, csize: u32, usize_: u32) -> Vec<u8> {
        let mut v = crate::spec::LFH_MAGIC.to_vec();
        v.extend_from_slice(&20u16.to_le_bytes());
        v.extend_from_slice(&flags.to_le_bytes());
        v.extend_from_slice(&8u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&((1u16) << 5 | 1).to_le_bytes());
        v.extend_from_slice(&crc.to_le_bytes());
        v.extend_from_slice(&csize.to_le_bytes());
        v.extend_from_slice(&usize_.to_le_bytes());
        v.extend_from_slice(&(filename.len() as u16).to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(filename);
        v
    }

    #[test]
    fn find_gaps_sorted_ascending() {
        let page_array = vec![
            Some(PageIndex(0)),
            None,
            None,
            Some(PageIndex(3)),
            None,
            Some(PageIndex(5)),
        ];
        let gaps = find_gaps(&page_array);
        assert_eq!(
            gaps,
            vec![
                Gap { start_index: 4, length: 1 },
                Gap { start_index: 1, length: 2 },
            ]
        );
    }

    fn cdh_at(lfh_offset: u32, ptr: usize) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            version_made_by: 20,
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            mod_time: 0,
            mod_date: (1 << 5) | 1,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            lfh_offset,
            filename: Vec::new(),
            extra: Vec::new(),
            comment: Vec::new(),
            ptr,
            total_len: 0,
            boundary_taint: false,
        }
    }

    #[test]
    fn assemble_central_directory_orders_by_lfh_offset_and_stops_past_cd_region() {
        let data = vec![0u8; 4096];
        let image = Image::new(&data, 1024);
        let mut pool = PagePool::new(4);
        let mut diagnostics = Vec::new();

        // Offsets 2048 and 3072 are within the CD region (<= cd_offset 900);
        // 9999 lies past every archive's cd_offset and should halt the loop.
        let silo = vec![cdh_at(500, 3072), cdh_at(100, 2048), cdh_at(9999, 0)];
        let pages =
            assemble_central_directory(&image, &mut pool, silo, &[900], &mut diagnostics);

        assert_eq!(pages, vec![PageIndex(2), PageIndex(3)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn assemble_central_directory_tolerates_shared_page_reencounter() {
        let data = vec![0u8; 4096];
        let image = Image::new(&data, 1024);
        let mut pool = PagePool::new(4);
        let mut diagnostics = Vec::new();

        // Both CDHs live in page 2; the second shouldn't double-count or error.
        let silo = vec![cdh_at(10, 2048), cdh_at(20, 2100)];
        let pages =
            assemble_central_directory(&image, &mut pool, silo, &[900], &mut diagnostics);

        assert_eq!(pages, vec![PageIndex(2)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn no_gaps_in_full_array() {
        let page_array = vec![Some(PageIndex(0)), Some(PageIndex(1))];
        assert!(find_gaps(&page_array).is_empty());
    }

    #[test]
    fn assemble_central_directory_empty_silo_yields_no_pages() {
        let data = vec![0u8; 4096];
        let image = Image::new(&data, 1024);
        let mut pool = PagePool::new(4);
        let mut diagnostics = Vec::new();
        let pages =
            assemble_central_directory(&image, &mut pool, Vec::new(), &[100], &mut diagnostics);
        assert!(pages.is_empty());
    }

    #[test]
    fn crc_gap_fill_installs_unique_matching_candidate() {
        let page_size = 16usize;
        let lfh = lfh_bytes(0, b"a", 0, 4, 4);
        let mut image_bytes = vec![0u8; page_size * 3];
        image_bytes[0..lfh.len()].copy_from_slice(&lfh);
        let payload_offset_in_lfh = lfh.len();
        let payload = b"DATA";
        // Page 1 holds the payload (the "gap" candidate); page 2 is a decoy.
        image_bytes[page_size..page_size + payload.len()].copy_from_slice(payload);
        image_bytes[page_size * 2..page_size * 2 + payload.len()].copy_from_slice(b"XXXX");
        let _ = payload_offset_in_lfh;

        let image = Image::new(&image_bytes, page_size);
        let crc = crc32fast::hash(payload);

        let mut pool = PagePool::new(3);
        pool.take(PageIndex(0)); // the header page is already "placed"
        let mut page_array = vec![Some(PageIndex(0)), None];

        let placement = LfhPlacement {
            lfh_slot: 0,
            lfh_intra_offset: 0,
            filename_len: 1,
            compressed_size: 4,
            crc32: crc,
        };

        crc_gap_fill(&image, &mut pool, &mut page_array, &[placement]);
        assert_eq!(page_array[1], Some(PageIndex(1)));
    }
}
