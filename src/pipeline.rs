//! The pipeline driver: sequences scanning, clustering, and reassembly for
//! every archive discoverable in an image, and exposes the single
//! `salvage()` entry point the CLI binary consumes.
//!
//! The overall shape is find EOCDs, find candidate central directory
//! headers, cluster them by originating archive, reconstruct each
//! archive's page run, then render it to bytes — `salvage()` is this
//! crate's one obvious library entry point.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::cluster;
use crate::image::{Image, PagePool};
use crate::reassemble;
use crate::render;
use crate::report::RecoveryReport;
use crate::spec::{CentralDirectoryHeader, EndOfCentralDirectory, CDH_MAGIC, EOCD_MAGIC};

/// Everything non-fatal that can happen during reassembly: ambiguous
/// placement, a lost page, and an orphaned central directory silo. Record
/// rejection itself is silently skipped and has no variant here. Pushed to
/// a sink owned by the pipeline driver and threaded through the
/// `Reassembler` by `&mut` reference — there is no global/static state.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// A central directory header's page couldn't be found in the pool or
    /// in this archive's own page list.
    CdPageLost { ptr: usize },
    /// A central directory silo's assembled page run matched no known EOCD.
    NoCdMatchForEocd { eocd_ptr: usize },
    /// More than one offset in the image matched a synthesized LFH pattern.
    AmbiguousLfhPlacement { lfh_offset: u32, matches: usize },
    /// No offset in the image matched a synthesized LFH pattern.
    LfhNotFound { lfh_offset: u32 },
    /// A matched LFH's page was neither in the pool nor already placed.
    LostLfhPage { ptr: usize },
    /// More than one offset in the image matched a synthesized data
    /// descriptor pattern.
    AmbiguousDataDescriptor { lfh_offset: u32, matches: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::CdPageLost { ptr } => {
                write!(f, "central directory page lost (ptr=0x{ptr:x})")
            }
            Diagnostic::NoCdMatchForEocd { eocd_ptr } => {
                write!(f, "no central directory matched EOCD at 0x{eocd_ptr:x}")
            }
            Diagnostic::AmbiguousLfhPlacement { lfh_offset, matches } => write!(
                f,
                "ambiguous local file header placement for member at lfh_offset=0x{lfh_offset:x} ({matches} candidates)"
            ),
            Diagnostic::LfhNotFound { lfh_offset } => write!(
                f,
                "no local file header found for member at lfh_offset=0x{lfh_offset:x}"
            ),
            Diagnostic::LostLfhPage { ptr } => {
                write!(f, "local file header page lost (ptr=0x{ptr:x})")
            }
            Diagnostic::AmbiguousDataDescriptor { lfh_offset, matches } => write!(
                f,
                "ambiguous data descriptor placement for member at lfh_offset=0x{lfh_offset:x} ({matches} candidates)"
            ),
        }
    }
}

/// One reconstructed archive: its rendered bytes and the report describing
/// how the reconstruction went.
#[derive(Debug, Clone)]
pub struct RecoveredArchive {
    pub bytes: Vec<u8>,
    pub report: RecoveryReport,
}

/// Runs the full reassembly pipeline over `image` and returns one
/// [`RecoveredArchive`] per accepted EOCD that could be matched to a central
/// directory silo, in the order that silo was produced by clustering.
///
/// Returns an empty vector, without error, when no EOCD is found at all.
pub fn salvage(image: &Image) -> Vec<RecoveredArchive> {
    let eocds: Vec<EndOfCentralDirectory> = scan_records(image, &EOCD_MAGIC, EndOfCentralDirectory::parse);
    let k = eocds.len();
    if k == 0 {
        warn!("no EOCD records found in image; nothing to recover");
        return Vec::new();
    }
    info!("found {k} candidate archive(s) (accepted EOCD records)");

    let cdhs: Vec<CentralDirectoryHeader> = scan_records(image, &CDH_MAGIC, CentralDirectoryHeader::parse);
    debug!("parsed {} candidate central directory header(s)", cdhs.len());

    let all_cd_offsets: Vec<u32> = eocds.iter().map(|z| z.cd_offset).collect();
    let silos = cluster::silos(&cdhs, cluster::cdh_features, k);

    let mut pool = PagePool::new(image.page_count());
    let mut matched: HashSet<usize> = HashSet::new();
    let mut recovered = Vec::new();

    for silo in silos {
        let mut diagnostics = Vec::new();
        let cd_pages =
            reassemble::assemble_central_directory(image, &mut pool, silo, &all_cd_offsets, &mut diagnostics);

        let Some(eocd) = reassemble::match_eocd(image, &cd_pages, &eocds) else {
            if !cd_pages.is_empty() {
                warn!(
                    "central directory silo of {} page(s) matched no EOCD",
                    cd_pages.len()
                );
            }
            continue;
        };

        if !matched.insert(eocd.ptr) {
            warn!("a second silo also matched EOCD at 0x{:x}; ignoring it", eocd.ptr);
            continue;
        }

        recovered.push(build_archive(image, &mut pool, &cd_pages, eocd, diagnostics));
    }

    // Open question resolution (DESIGN.md): an EOCD with no matching silo at
    // all (e.g. its central directory records were clustered elsewhere, or
    // it has no members) still gets a best-effort render, anchored on just
    // its own page, rather than being silently dropped.
    for eocd in &eocds {
        if matched.contains(&eocd.ptr) {
            continue;
        }
        let mut diagnostics = vec![Diagnostic::NoCdMatchForEocd { eocd_ptr: eocd.ptr }];
        let mut cd_pages = Vec::new();
        if let Some(page) = pool.take(image.page_of_offset(eocd.ptr)) {
            cd_pages.push(page);
        }
        recovered.push(build_archive(image, &mut pool, &cd_pages, eocd, {
            std::mem::take(&mut diagnostics)
        }));
    }

    recovered
}

fn build_archive(
    image: &Image,
    pool: &mut PagePool,
    cd_pages: &[crate::image::PageIndex],
    eocd: &EndOfCentralDirectory,
    mut diagnostics: Vec<Diagnostic>,
) -> RecoveredArchive {
    let mut build = reassemble::place_local_file_headers(image, pool, cd_pages, eocd, &mut diagnostics);
    reassemble::crc_gap_fill(image, pool, &mut build.page_array, &build.placements);
    let gaps = reassemble::find_gaps(&build.page_array);

    let bytes = render::render(image, &build.page_array, build.start_offset);
    let fingerprint = render::fingerprint(&bytes);

    let report = RecoveryReport {
        member_count: build.member_count,
        cd_page_count: cd_pages.len(),
        lfh_placed_count: build.placements.len(),
        page_count: build.page_array.len(),
        gaps,
        diagnostics,
        fingerprint,
    };
    info!("{}", report.summary());
    for d in &report.diagnostics {
        debug!("{d}");
    }

    RecoveredArchive { bytes, report }
}

fn scan_records<T>(
    image: &Image,
    magic: &[u8; 4],
    parse: impl Fn(&Image, usize) -> Option<T>,
) -> Vec<T> {
    crate::scan::find_all(image.as_slice(), magic)
        .into_iter()
        .filter_map(|ptr| parse(image, ptr))
        .collect()
}
