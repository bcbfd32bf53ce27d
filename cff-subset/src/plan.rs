//! The glyph plan and parsing of glyph id lists.

use fnv::FnvHashMap;
use write_fonts::{read::collections::IntSet, types::GlyphId};

use crate::SubsetError;

/// Glyphs to retain and their new glyph ids.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    glyph_set: IntSet<GlyphId>,
    // new gid -> old gid
    reverse_glyph_map: FnvHashMap<GlyphId, GlyphId>,
    num_output_glyphs: usize,
}

impl Plan {
    /// Creates a plan retaining `input_gids` out of a font with
    /// `font_num_glyphs` glyphs.
    ///
    /// `.notdef` is always retained and out of range ids are dropped. Retained
    /// glyphs are numbered consecutively in ascending order unless
    /// `retain_gids` is set, in which case every glyph keeps its id and the
    /// removed ones become empty.
    pub fn new(input_gids: &IntSet<GlyphId>, font_num_glyphs: u32, retain_gids: bool) -> Self {
        // inclusive even when `input_gids` is inverted
        let mut glyph_set = IntSet::empty();
        if font_num_glyphs > 0 {
            glyph_set.insert_range(GlyphId::NOTDEF..=GlyphId::new(font_num_glyphs - 1));
            glyph_set.intersect(input_gids);
        }
        glyph_set.insert(GlyphId::NOTDEF);

        let new_to_old: Vec<(GlyphId, GlyphId)> = if retain_gids {
            glyph_set.iter().map(|gid| (gid, gid)).collect()
        } else {
            glyph_set
                .iter()
                .zip(0u32..)
                .map(|(old, new)| (GlyphId::new(new), old))
                .collect()
        };
        let num_output_glyphs = if retain_gids {
            glyph_set
                .last()
                .map(|gid| gid.to_u32() as usize + 1)
                .unwrap_or_default()
        } else {
            new_to_old.len()
        };
        log::info!(
            "Retaining {} of {font_num_glyphs} glyphs, {num_output_glyphs} in output",
            new_to_old.len()
        );
        Self {
            glyph_set,
            reverse_glyph_map: new_to_old.into_iter().collect(),
            num_output_glyphs,
        }
    }

    /// Creates a plan from a precomputed mapping.
    ///
    /// `reverse_glyph_map` maps new glyph ids to old ones. Output glyphs with
    /// no entry map to the old glyph with the same id.
    pub fn from_parts(
        glyph_set: IntSet<GlyphId>,
        reverse_glyph_map: FnvHashMap<GlyphId, GlyphId>,
        num_output_glyphs: usize,
    ) -> Self {
        Self {
            glyph_set,
            reverse_glyph_map,
            num_output_glyphs,
        }
    }

    /// The old glyph ids of all retained glyphs.
    pub fn glyph_set(&self) -> &IntSet<GlyphId> {
        &self.glyph_set
    }

    pub fn num_output_glyphs(&self) -> usize {
        self.num_output_glyphs
    }

    pub fn old_gid(&self, new_gid: GlyphId) -> GlyphId {
        self.reverse_glyph_map
            .get(&new_gid)
            .copied()
            .unwrap_or(new_gid)
    }
}

/// Parses a comma separated list of glyph ids and ranges like `0,3-5,9`.
///
/// `*` selects every glyph.
pub fn parse_gids(gid_str: &str) -> Result<IntSet<GlyphId>, SubsetError> {
    if gid_str.trim() == "*" {
        return Ok(IntSet::<GlyphId>::all());
    }

    let mut result = IntSet::empty();
    if gid_str.trim().is_empty() {
        return Ok(result);
    }
    for gid in gid_str.split(',').map(str::trim) {
        if let Some((start, end)) = gid.split_once('-') {
            let start = start
                .trim()
                .parse::<u32>()
                .map_err(|_| SubsetError::InvalidGid(start.to_owned()))?;
            let end = end
                .trim()
                .parse::<u32>()
                .map_err(|_| SubsetError::InvalidGid(end.to_owned()))?;
            if start > end {
                return Err(SubsetError::InvalidGidRange { start, end });
            }
            result.insert_range(GlyphId::new(start)..=GlyphId::new(end));
        } else {
            let glyph_id = gid
                .parse::<u32>()
                .map_err(|_| SubsetError::InvalidGid(gid.to_owned()))?;
            result.insert(GlyphId::new(glyph_id));
        }
    }
    Ok(result)
}
