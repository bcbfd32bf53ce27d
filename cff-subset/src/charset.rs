//! Building the charset of the subset font.
//!
//! See "13 Charsets" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf#page=21>

use write_fonts::{read::tables::postscript::StringId, types::GlyphId};

use crate::{sid::SidRemap, Plan};

/// Binary format of a charset.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CharsetFormat {
    /// One SID per glyph.
    Format0,
    /// Ranges with a one byte count of remaining glyphs.
    Format1,
    /// Ranges with a two byte count of remaining glyphs.
    Format2,
}

/// A run of glyphs with consecutive SIDs.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct CharsetRange {
    pub first: u16,
    /// number of glyphs in the run, not counting the first one
    pub n_left: u16,
}

/// Charset of the subset font, with `.notdef` implied.
#[derive(Clone, Debug)]
pub(crate) struct SubsetCharset {
    sids: Vec<u16>,
    ranges: Vec<CharsetRange>,
    format: CharsetFormat,
}

impl SubsetCharset {
    /// Chooses the smallest encoding for the new SIDs of glyphs `1..N`.
    pub(crate) fn new(sids: Vec<StringId>) -> Self {
        let sids: Vec<u16> = sids.into_iter().map(StringId::to_u16).collect();
        let ranges = collect_ranges(&sids);
        let format0_size = 1 + sids.len() * 2;
        let format1_size = 1 + ranges.len() * 3;
        let format2_size = 1 + ranges.len() * 4;
        let format1_valid = ranges.iter().all(|range| range.n_left <= 0xFF);
        let format = if format1_valid && format1_size < format0_size {
            CharsetFormat::Format1
        } else if format2_size < format0_size {
            CharsetFormat::Format2
        } else {
            CharsetFormat::Format0
        };
        log::debug!(
            "Charset for {} glyphs uses {format:?} with {} ranges",
            sids.len() + 1,
            ranges.len()
        );
        Self {
            sids,
            ranges,
            format,
        }
    }

    pub(crate) fn format(&self) -> CharsetFormat {
        self.format
    }

    pub(crate) fn size(&self) -> usize {
        1 + match self.format {
            CharsetFormat::Format0 => self.sids.len() * 2,
            CharsetFormat::Format1 => self.ranges.len() * 3,
            CharsetFormat::Format2 => self.ranges.len() * 4,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        match self.format {
            CharsetFormat::Format0 => {
                out.push(0);
                for sid in &self.sids {
                    out.extend(sid.to_be_bytes());
                }
            }
            CharsetFormat::Format1 => {
                out.push(1);
                for range in &self.ranges {
                    out.extend(range.first.to_be_bytes());
                    out.push(range.n_left as u8);
                }
            }
            CharsetFormat::Format2 => {
                out.push(2);
                for range in &self.ranges {
                    out.extend(range.first.to_be_bytes());
                    out.extend(range.n_left.to_be_bytes());
                }
            }
        }
    }
}

fn collect_ranges(sids: &[u16]) -> Vec<CharsetRange> {
    let mut ranges: Vec<CharsetRange> = Vec::new();
    for sid in sids {
        match ranges.last_mut() {
            Some(last)
                if last.n_left < u16::MAX
                    && last.first as u32 + last.n_left as u32 + 1 == *sid as u32 =>
            {
                last.n_left += 1
            }
            _ => ranges.push(CharsetRange {
                first: *sid,
                n_left: 0,
            }),
        }
    }
    ranges
}

/// Computes the new SID of each output glyph after `.notdef`.
///
/// `charset` maps original glyph ids to SIDs. Glyphs beyond its end use
/// their new glyph id as SID.
pub(crate) fn remap_glyph_sids(
    plan: &Plan,
    charset: &[StringId],
    sids: &mut SidRemap,
) -> Vec<StringId> {
    (1..plan.num_output_glyphs())
        .map(|new_gid| {
            let old_gid = plan.old_gid(GlyphId::new(new_gid as u32));
            let sid = charset
                .get(old_gid.to_u32() as usize)
                .copied()
                .unwrap_or(StringId::new(new_gid as u16));
            sids.add(sid)
        })
        .collect()
}
