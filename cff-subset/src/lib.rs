//! Subsetting of the [CFF] table.
//!
//! Given the original table and a [`Plan`], [`subset`] produces a new table
//! holding only the retained glyphs, the subroutines they use and the strings
//! they reference, with all indices and offsets renumbered.
//!
//! [CFF]: https://learn.microsoft.com/en-us/typography/opentype/spec/cff

mod charset;
pub mod charstring;
mod dict;
mod plan;
mod rewrite;
mod serialize;
mod sid;
mod source;
mod subrs;

use thiserror::Error;
use write_fonts::{
    read::{tables::postscript, FontRef, ReadError},
    types::GlyphId,
};

use charset::SubsetCharset;
use rewrite::CharStringRewriter;
use serialize::CffTable;
use sid::SidRemap;
use subrs::{Body, ClosureCollector, SubrRemap};

pub use charset::CharsetFormat;
pub use plan::{parse_gids, Plan};
pub use sid::NUM_STANDARD_STRINGS;
pub use source::{CffSource, PrivateDict, TopDict};
pub use subrs::{subr_bias, NESTING_DEPTH_LIMIT};

#[derive(Debug, Error)]
pub enum SubsetError {
    #[error("Invalid input gid {0}")]
    InvalidGid(String),

    #[error("Invalid gid range {start}-{end}")]
    InvalidGidRange { start: u32, end: u32 },

    #[error("Error reading font data: {0}")]
    ReadError(ReadError),

    #[error("Malformed CFF data: {0}")]
    CffData(String),

    #[error("CID-keyed CFF fonts are not supported")]
    CidKeyedFont,

    #[error("Top DICT has no CharStrings offset")]
    MissingCharStrings,

    #[error("INDEX with {count} entries exceeds the limit of 65535")]
    IndexOverflow { count: usize },

    #[error("Subroutine calls in glyph {gid} exceed the nesting depth limit")]
    NestingDepthExceeded { gid: u32 },

    #[error("Top DICT offsets did not converge after {0} passes")]
    TopDictOffsetsDidNotConverge(usize),

    #[error("Private DICT Subrs offset did not converge")]
    SubrsOffsetDidNotConverge,
}

impl From<ReadError> for SubsetError {
    fn from(err: ReadError) -> Self {
        SubsetError::ReadError(err)
    }
}

impl From<postscript::Error> for SubsetError {
    fn from(err: postscript::Error) -> Self {
        match err {
            postscript::Error::Read(err) => SubsetError::ReadError(err),
            err => SubsetError::CffData(err.to_string()),
        }
    }
}

/// Subsets the `CFF ` table of `font`.
///
/// Returns `None` if the font has no such table.
pub fn subset_cff(font: &FontRef, plan: &Plan) -> Result<Option<Vec<u8>>, SubsetError> {
    let Some(source) = CffSource::from_font(font)? else {
        log::info!("No CFF table to subset");
        return Ok(None);
    };
    subset(&source, plan).map(Some)
}

/// Builds a CFF table containing the glyphs of `source` selected by `plan`.
///
/// Output glyphs whose source glyph is not retained, as happens when glyph
/// ids are retained, are written as a lone `endchar`.
pub fn subset(source: &CffSource, plan: &Plan) -> Result<Vec<u8>, SubsetError> {
    log::info!(
        "Subsetting table 'CFF ' to {} glyphs",
        plan.num_output_glyphs()
    );
    let num_glyphs = source.num_glyphs();

    // strings referenced by the Top DICT are numbered ahead of glyph names
    let mut sids = SidRemap::default();
    let top_dict = source.top_dict.remap_sids(&mut sids);
    let glyph_sids = charset::remap_glyph_sids(plan, &source.charset, &mut sids);
    let charset = SubsetCharset::new(glyph_sids);
    log::debug!("Retaining {} custom strings", sids.len());

    let mut collector = ClosureCollector::new(&source.global_subrs, &source.local_subrs);
    for gid in plan
        .glyph_set()
        .iter()
        .take_while(|gid| gid.to_u32() < num_glyphs)
    {
        collector.collect(gid.to_u32(), source.char_strings[gid.to_u32() as usize]);
    }
    let closures = collector.finish()?;
    let global = SubrRemap::new(&closures.global);
    let local = SubrRemap::new(&closures.local);
    log::debug!(
        "Retaining {} of {} global subrs (bias {}) and {} of {} local subrs (bias {})",
        global.len(),
        source.global_subrs.len(),
        global.bias(),
        local.len(),
        source.local_subrs.len(),
        local.bias()
    );

    let rewriter = CharStringRewriter::new(
        &global,
        subr_bias(source.global_subrs.len()),
        &local,
        subr_bias(source.local_subrs.len()),
        &closures.hint_masks,
    );
    let char_strings = (0..plan.num_output_glyphs())
        .map(|new_gid| {
            let old_gid = plan.old_gid(GlyphId::new(new_gid as u32));
            match source.char_strings.get(old_gid.to_u32() as usize) {
                Some(data) if plan.glyph_set().contains(old_gid) => {
                    rewriter.rewrite(Body::CharString(old_gid.to_u32()), data)
                }
                _ => vec![charstring::operator::ENDCHAR as u8],
            }
        })
        .collect();
    let global_subrs = global
        .old_indices()
        .iter()
        .map(|&old| {
            let data = source.global_subrs[old as usize];
            rewriter.rewrite(Body::GlobalSubr(old), data)
        })
        .collect();
    let local_subrs = local
        .old_indices()
        .iter()
        .map(|&old| {
            let data = source.local_subrs[old as usize];
            rewriter.rewrite(Body::LocalSubr(old), data)
        })
        .collect();
    let strings = sids
        .retained()
        .iter()
        .map(|old| source.strings.get(*old as usize).copied().unwrap_or_default())
        .collect();

    let table = serialize::write_cff(&CffTable {
        name: source.name,
        top_dict,
        strings,
        global_subrs,
        charset,
        char_strings,
        private_dict: &source.private_dict,
        local_subrs,
    })?;
    log::info!("Subset table 'CFF ' is {} bytes", table.len());
    Ok(table)
}
