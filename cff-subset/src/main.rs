//! binary CFF subset tool
//!
//! Takes a font file with a `CFF ` table and a list of glyph ids, and writes
//! either the subset CFF table or, when glyph ids are retained, a copy of the
//! font with its CFF table replaced.

use clap::Parser;
use cff_subset::{parse_gids, subset, CffSource, Plan};
use write_fonts::{
    read::{tables::cff::Cff, FontRef, TopLevelTable},
    FontBuilder,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input font file.
    #[arg(short, long)]
    path: std::path::PathBuf,

    /// List of glyph ids, e.g. 0,5-9 or * for all glyphs
    #[arg(short, long)]
    gids: Option<String>,

    /// The output file
    #[arg(short, long)]
    output_file: std::path::PathBuf,

    /// If set don't renumber glyph ids in the subset.
    #[arg(long)]
    retain_gids: bool,

    /// Write the whole font instead of the bare CFF table, requires --retain-gids
    #[arg(long, requires = "retain_gids")]
    font_output: bool,

    ///run subsetter N times
    #[arg(short, long)]
    num_iterations: Option<u32>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let gids = match parse_gids(&args.gids.unwrap_or_default()) {
        Ok(gids) => gids,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let font_bytes = std::fs::read(&args.path).expect("Invalid input font file found");
    let font = FontRef::new(&font_bytes).expect("Error reading font bytes");
    let source = match CffSource::from_font(&font) {
        Ok(Some(source)) => source,
        Ok(None) => {
            eprintln!("Font has no CFF table");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut cff_bytes = Vec::new();
    for _ in 0..args.num_iterations.unwrap_or(1) {
        let plan = Plan::new(&gids, source.num_glyphs(), args.retain_gids);
        match subset(&source, &plan) {
            Ok(out) => {
                cff_bytes = out;
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        };
    }

    let output_bytes = if args.font_output {
        let mut builder = FontBuilder::new();
        builder.add_raw(Cff::TAG, cff_bytes);
        builder.copy_missing_tables(font);
        builder.build()
    } else {
        cff_bytes
    };
    std::fs::write(&args.output_file, output_bytes).unwrap();
}
