use std::fs;
use std::fs::File;
use std::path::PathBuf;

use anyhow::*;
use log::*;
use memmap2::Mmap;
use structopt::*;

use zipsalvage::arch;
use zipsalvage::image::Image;
use zipsalvage::pipeline;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "zipsalvage",
    about = "Reconstructs ZIP archives from a raw, block-addressed image"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Directory to write recovered archives into.
    #[structopt(short, long, default_value = ".")]
    out_dir: PathBuf,

    #[structopt(name("image"))]
    image_path: PathBuf,

    /// Page size of the source medium, in bytes.
    #[structopt(name("page size"), default_value = "1024")]
    page_size: u64,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    let page_size = arch::usize(args.page_size).context("page size too large for this platform")?;

    info!("Memory mapping {:#?}", &args.image_path);
    let image_file = File::open(&args.image_path).context("Couldn't open image")?;
    let mapping = unsafe { Mmap::map(&image_file).context("Couldn't mmap image")? };

    let image = Image::open(&mapping, page_size).context("Invalid image")?;
    let recovered = pipeline::salvage(&image);

    if recovered.is_empty() {
        warn!("No archives found in {:#?}", &args.image_path);
        return Ok(());
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Couldn't create output directory {}", args.out_dir.display()))?;

    for archive in &recovered {
        let out_path = args.out_dir.join(format!("recovered_{}.zip", archive.report.fingerprint));
        fs::write(&out_path, &archive.bytes)
            .with_context(|| format!("Couldn't write {}", out_path.display()))?;
        info!("{}", archive.report.summary());
        for diagnostic in &archive.report.diagnostics {
            debug!("{diagnostic}");
        }
    }

    Ok(())
}
