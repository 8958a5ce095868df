use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use cstash_core::format::{stash_header_span, ENTRY_CALIB_META, ENTRY_REMAP_LEFT};
use cstash_core::session::{pack_session, PackOptions};
use cstash_core::{for_each_entry, slots, sniff, stash, RemapTable, SlotIndex, StashSummary};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cstash",
    about = "Calibration stash — pack, inspect, and slot-manage stereo calibration files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a calibration session directory into a stash file
    Pack {
        /// Session directory containing calib_result/
        session: PathBuf,
        /// Destination stash file
        output: PathBuf,
        /// Keep raw 4-byte offsets instead of the 3-byte compact encoding
        #[arg(long)]
        no_compact: bool,
    },
    /// Extract every archive entry into a directory
    Unpack {
        /// Stash, compressed archive, bare archive, or multi-slot file
        input: PathBuf,
        /// Directory to write entries into (created if missing)
        out_dir: PathBuf,
    },
    /// Print the per-entry size table and calibration summary
    List {
        /// File of any generation
        file: PathBuf,
    },
    /// Print the calibration summary from the stash header alone
    ///
    /// Reads only the header span — this is the cheap-listing path for
    /// files sitting behind a slow link.
    Header {
        /// Stash file (or multi-slot container; slots are listed instead)
        file: PathBuf,
    },
    /// Print the multi-slot index table
    Slots {
        /// Multi-slot container file
        file: PathBuf,
    },
    /// Install a stash into one slot of a container (created if missing)
    SlotSet {
        /// Multi-slot container file
        container: PathBuf,
        /// Target slot (0-2)
        slot: usize,
        /// Stash file to install
        stash: PathBuf,
    },
    /// Clear one slot; removes the container when the last slot empties
    SlotDelete {
        container: PathBuf,
        slot: usize,
    },
    /// Write one slot's stash bytes to a file
    SlotExtract {
        container: PathBuf,
        slot: usize,
        output: PathBuf,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn print_summary(s: &StashSummary) {
    println!("  resolution     : {}x{}", s.width, s.height);
    println!("  pairs used     : {}", s.pairs_used);
    println!("  stereo RMS     : {:.4} px", s.stereo_rms);
    println!("  epipolar error : {:.4} px (mean)", s.mean_epipolar_err);
    println!("  baseline       : {:.4} cm", s.baseline_cm);
    println!("  focal length   : {:.2} px", s.focal_length_px);
    println!(
        "  disparities    : [{}, {})",
        s.min_disparity,
        s.min_disparity + s.num_disparities as i32
    );
    println!("  packed at      : {}", if s.packed_at.is_empty() { "-" } else { &s.packed_at });
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_pack(session: PathBuf, output: PathBuf, no_compact: bool) -> anyhow::Result<()> {
    let opts = PackOptions { compact: !no_compact };
    let bytes = pack_session(&session, &opts)
        .with_context(|| format!("packing session {:?}", session))?;
    fs::write(&output, &bytes).with_context(|| format!("writing {:?}", output))?;
    eprintln!("  stash size  : {}", human_bytes(bytes.len() as u64));
    eprintln!("  written to  : {:?}", output);
    Ok(())
}

fn run_unpack(input: PathBuf, out_dir: PathBuf) -> anyhow::Result<()> {
    let bytes = fs::read(&input).with_context(|| format!("reading {:?}", input))?;
    let archive = sniff::peel(&bytes).context("unwrapping container layers")?;
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {:?}", out_dir))?;

    let mut count = 0u32;
    for_each_entry(&archive, |name, data| {
        let path = out_dir.join(name);
        fs::write(&path, data)?;
        eprintln!("  {:>10}  {}", human_bytes(data.len() as u64), name);
        count += 1;
        Ok(())
    })
    .context("walking archive entries")?;
    eprintln!("  {} entries extracted to {:?}", count, out_dir);
    Ok(())
}

fn run_list(file: PathBuf) -> anyhow::Result<()> {
    let bytes = fs::read(&file).with_context(|| format!("reading {:?}", file))?;
    let archive = sniff::peel(&bytes).context("unwrapping container layers")?;

    println!("=== {:?} ===", file);
    println!();
    println!("  {:>10}  entry", "size");
    println!("  {}", "-".repeat(40));

    let mut meta_json: Option<Vec<u8>> = None;
    let mut dims: Option<(u32, u32)> = None;
    for_each_entry(&archive, |name, data| {
        println!("  {:>10}  {}", human_bytes(data.len() as u64), name);
        if name == ENTRY_CALIB_META {
            meta_json = Some(data.to_vec());
        }
        if name == ENTRY_REMAP_LEFT {
            if let Ok(table) = RemapTable::load(data) {
                dims = Some((table.width, table.height));
            }
        }
        Ok(())
    })
    .context("walking archive entries")?;

    let (width, height) = dims.unwrap_or_default();
    let summary = StashSummary::from_parts(width, height, meta_json.as_deref(), String::new());
    println!();
    print_summary(&summary);
    Ok(())
}

fn run_header(file: PathBuf) -> anyhow::Result<()> {
    // Only the header span is needed; read_head on a remote channel would
    // fetch exactly this prefix.
    let bytes = fs::read(&file).with_context(|| format!("reading {:?}", file))?;
    if sniff::sniff(&bytes) == sniff::Layer::MultiSlot {
        // A multi-slot container has no single stash header; its index
        // carries the same quick-read fields per slot.
        let index = slots::parse_index(&bytes).context("parsing multi-slot index")?;
        print_slot_table(&file, &index);
        return Ok(());
    }
    let head = &bytes[..bytes.len().min(stash_header_span())];
    let summary = stash::read_header_only(head).context("parsing stash header")?;
    println!("=== {:?} (header only) ===", file);
    println!();
    print_summary(&summary);
    Ok(())
}

fn run_slots(file: PathBuf) -> anyhow::Result<()> {
    let bytes = fs::read(&file).with_context(|| format!("reading {:?}", file))?;
    let index = slots::parse_index(&bytes).context("parsing multi-slot index")?;
    print_slot_table(&file, &index);
    Ok(())
}

fn print_slot_table(file: &Path, index: &SlotIndex) {
    println!("=== {:?} ===", file);
    println!();
    println!(
        "  {:>4}  {:>12}  {:>10}  {:>12}  {:>8}  packed at",
        "slot", "offset", "size", "resolution", "RMS"
    );
    println!("  {}", "-".repeat(70));
    for (i, entry) in index.slots.iter().enumerate() {
        match entry {
            Some(e) => println!(
                "  {:>4}  {:>12}  {:>10}  {:>12}  {:>8.4}  {}",
                i,
                e.offset,
                human_bytes(e.size),
                format!("{}x{}", e.width, e.height),
                e.stereo_rms,
                if e.packed_at.is_empty() { "-" } else { &e.packed_at }
            ),
            None => println!("  {:>4}  (empty)", i),
        }
    }
}

fn run_slot_set(container: PathBuf, slot: usize, stash_file: PathBuf) -> anyhow::Result<()> {
    let new_stash = fs::read(&stash_file).with_context(|| format!("reading {:?}", stash_file))?;
    let existing = fs::read(&container).ok();
    let built = slots::build(existing.as_deref(), slot, Some(&new_stash))
        .with_context(|| format!("installing slot {}", slot))?
        .context("installing a stash always yields a container")?;
    fs::write(&container, &built).with_context(|| format!("writing {:?}", container))?;
    eprintln!("  slot {} set ({} container)", slot, human_bytes(built.len() as u64));
    Ok(())
}

fn run_slot_delete(container: PathBuf, slot: usize) -> anyhow::Result<()> {
    let existing = fs::read(&container).with_context(|| format!("reading {:?}", container))?;
    match slots::build(Some(&existing), slot, None)
        .with_context(|| format!("clearing slot {}", slot))?
    {
        Some(built) => {
            fs::write(&container, &built)
                .with_context(|| format!("writing {:?}", container))?;
            eprintln!("  slot {} cleared ({} container)", slot, human_bytes(built.len() as u64));
        }
        None => {
            fs::remove_file(&container)
                .with_context(|| format!("removing {:?}", container))?;
            eprintln!("  slot {} cleared; last slot — container removed", slot);
        }
    }
    Ok(())
}

fn run_slot_extract(container: PathBuf, slot: usize, output: PathBuf) -> anyhow::Result<()> {
    let bytes = fs::read(&container).with_context(|| format!("reading {:?}", container))?;
    let stash_bytes =
        slots::extract_slot(&bytes, slot).with_context(|| format!("extracting slot {}", slot))?;
    fs::write(&output, stash_bytes).with_context(|| format!("writing {:?}", output))?;
    eprintln!(
        "  slot {} extracted: {} to {:?}",
        slot,
        human_bytes(stash_bytes.len() as u64),
        output
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack { session, output, no_compact } => run_pack(session, output, no_compact),
        Commands::Unpack { input, out_dir } => run_unpack(input, out_dir),
        Commands::List { file } => run_list(file),
        Commands::Header { file } => run_header(file),
        Commands::Slots { file } => run_slots(file),
        Commands::SlotSet { container, slot, stash } => run_slot_set(container, slot, stash),
        Commands::SlotDelete { container, slot } => run_slot_delete(container, slot),
        Commands::SlotExtract { container, slot, output } => {
            run_slot_extract(container, slot, output)
        }
    }
}
