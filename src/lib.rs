//! zipsalvage reconstructs ZIP archives from the raw contents of a
//! block-addressed storage medium whose filesystem metadata is gone.
//!
//! The input is an opaque image: a flat byte sequence in which the pages of
//! one or more original ZIP files are interleaved with unrelated data and
//! with one another, possibly out of order and possibly with pages missing.
//! This crate locates ZIP structural markers inside that image, groups them
//! by originating archive without any filesystem hints, and uses each
//! archive's recovered central directory to place local-file-header pages
//! back into a contiguous, readable stream:
//!
//! ```no_run
//! # use std::fs;
//! # use zipsalvage::image::Image;
//! # use zipsalvage::pipeline;
//! let bytes = fs::read("disk.img")?;
//! let image = Image::new(&bytes, 1024);
//! for archive in pipeline::salvage(&image) {
//!     println!("{}", archive.report.summary());
//!     fs::write(format!("recovered_{}.zip", archive.report.fingerprint), &archive.bytes)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The engine never decompresses or validates member payloads; it moves raw
//! compressed bytes back into place and leaves payload integrity checks to
//! standard ZIP readers. It does not repair individual damaged headers,
//! does not special-case encrypted archives, and does not understand
//! ZIP64. When a candidate local file header matches more than one
//! position in the image, placement is declined rather than guessed.

pub mod arch;
pub mod cluster;
pub mod entropy;
pub mod image;
pub mod pipeline;
pub mod reassemble;
pub mod render;
pub mod report;
pub mod result;
pub mod scan;
pub mod spec;
