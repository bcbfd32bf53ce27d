//! The parts of an original CFF table that survive subsetting.

use write_fonts::{
    read::{
        tables::{
            cff::Cff,
            postscript::{dict, Charset, Index1, StringId},
        },
        FontData, FontRead, FontRef, ReadError, TableProvider,
    },
    types::{Fixed, GlyphId},
};

use crate::{sid::SidRemap, SubsetError};

/// Top DICT values carried over to the subset font.
#[derive(Clone, Debug, PartialEq)]
pub struct TopDict {
    pub version: Option<StringId>,
    pub notice: Option<StringId>,
    pub copyright: Option<StringId>,
    pub full_name: Option<StringId>,
    pub family_name: Option<StringId>,
    pub weight: Option<StringId>,
    pub is_fixed_pitch: bool,
    pub italic_angle: f64,
    pub underline_position: f64,
    pub underline_thickness: f64,
    pub font_bbox: [f64; 4],
}

impl Default for TopDict {
    fn default() -> Self {
        Self {
            version: None,
            notice: None,
            copyright: None,
            full_name: None,
            family_name: None,
            weight: None,
            is_fixed_pitch: false,
            italic_angle: 0.0,
            underline_position: -100.0,
            underline_thickness: 50.0,
            font_bbox: [0.0; 4],
        }
    }
}

impl TopDict {
    /// Returns a copy with all string ids renumbered through `sids`.
    ///
    /// Strings are registered in the order Version, Notice, Copyright,
    /// FullName, FamilyName, Weight.
    pub(crate) fn remap_sids(&self, sids: &mut SidRemap) -> Self {
        let mut remap = |sid: Option<StringId>| sid.map(|sid| sids.add(sid));
        let version = remap(self.version);
        let notice = remap(self.notice);
        let copyright = remap(self.copyright);
        let full_name = remap(self.full_name);
        let family_name = remap(self.family_name);
        let weight = remap(self.weight);
        Self {
            version,
            notice,
            copyright,
            full_name,
            family_name,
            weight,
            ..self.clone()
        }
    }
}

/// Private DICT values carried over to the subset font.
///
/// Blue zones and stem snaps hold absolute values.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivateDict {
    pub blue_values: Vec<f64>,
    pub other_blues: Vec<f64>,
    pub family_blues: Vec<f64>,
    pub family_other_blues: Vec<f64>,
    pub blue_scale: f64,
    pub blue_shift: f64,
    pub blue_fuzz: f64,
    pub std_hw: f64,
    pub std_vw: f64,
    pub stem_snap_h: Vec<f64>,
    pub stem_snap_v: Vec<f64>,
    pub force_bold: bool,
    pub language_group: i32,
    pub expansion_factor: f64,
    pub default_width_x: f64,
    pub nominal_width_x: f64,
}

impl PrivateDict {
    pub const DEFAULT_BLUE_SCALE: f64 = 0.039625;
    pub const DEFAULT_BLUE_SHIFT: f64 = 7.0;
    pub const DEFAULT_BLUE_FUZZ: f64 = 1.0;
    pub const DEFAULT_EXPANSION_FACTOR: f64 = 0.06;
}

impl Default for PrivateDict {
    fn default() -> Self {
        Self {
            blue_values: vec![],
            other_blues: vec![],
            family_blues: vec![],
            family_other_blues: vec![],
            blue_scale: Self::DEFAULT_BLUE_SCALE,
            blue_shift: Self::DEFAULT_BLUE_SHIFT,
            blue_fuzz: Self::DEFAULT_BLUE_FUZZ,
            std_hw: 0.0,
            std_vw: 0.0,
            stem_snap_h: vec![],
            stem_snap_v: vec![],
            force_bold: false,
            language_group: 0,
            expansion_factor: Self::DEFAULT_EXPANSION_FACTOR,
            default_width_x: 0.0,
            nominal_width_x: 0.0,
        }
    }
}

/// A name keyed CFF font, borrowing its data from the original table.
#[derive(Clone, Debug, Default)]
pub struct CffSource<'a> {
    /// Name of the font in the Name INDEX.
    pub name: &'a [u8],
    /// Custom strings, the first one having SID 391.
    pub strings: Vec<&'a [u8]>,
    pub top_dict: TopDict,
    pub char_strings: Vec<&'a [u8]>,
    pub global_subrs: Vec<&'a [u8]>,
    pub local_subrs: Vec<&'a [u8]>,
    /// SID of each glyph, indexed by glyph id.
    pub charset: Vec<StringId>,
    pub private_dict: PrivateDict,
}

impl<'a> CffSource<'a> {
    /// Reads the `CFF ` table of `font`.
    ///
    /// Returns `None` if the font has no such table.
    pub fn from_font(font: &FontRef<'a>) -> Result<Option<Self>, SubsetError> {
        let cff = match font.cff() {
            Ok(cff) => cff,
            Err(ReadError::TableIsMissing(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::from_cff(&cff).map(Some)
    }

    /// Reads the first font of `cff`.
    pub fn from_cff(cff: &Cff<'a>) -> Result<Self, SubsetError> {
        let offset_data = cff.offset_data();
        let name = cff.names().get(0)?;
        let top_dict_data = cff.top_dicts().get(0)?;

        let mut top_dict = TopDict::default();
        let mut char_strings_offset = None;
        let mut charset_offset = 0;
        let mut private_range = None;
        for entry in dict::entries(top_dict_data, None) {
            match entry? {
                dict::Entry::Version(sid) => top_dict.version = Some(sid),
                dict::Entry::Notice(sid) => top_dict.notice = Some(sid),
                dict::Entry::Copyright(sid) => top_dict.copyright = Some(sid),
                dict::Entry::FullName(sid) => top_dict.full_name = Some(sid),
                dict::Entry::FamilyName(sid) => top_dict.family_name = Some(sid),
                dict::Entry::Weight(sid) => top_dict.weight = Some(sid),
                dict::Entry::IsFixedPitch(fixed_pitch) => top_dict.is_fixed_pitch = fixed_pitch,
                dict::Entry::ItalicAngle(angle) => top_dict.italic_angle = angle.to_f64(),
                dict::Entry::UnderlinePosition(position) => {
                    top_dict.underline_position = position.to_f64()
                }
                dict::Entry::UnderlineThickness(thickness) => {
                    top_dict.underline_thickness = thickness.to_f64()
                }
                dict::Entry::FontBbox(bbox) => top_dict.font_bbox = bbox.map(Fixed::to_f64),
                dict::Entry::CharstringsOffset(offset) => char_strings_offset = Some(offset),
                dict::Entry::Charset(offset) => charset_offset = offset,
                dict::Entry::PrivateDictRange(range) => private_range = Some(range),
                dict::Entry::Ros { .. } | dict::Entry::FdArrayOffset(_) => {
                    return Err(SubsetError::CidKeyedFont)
                }
                _ => {}
            }
        }

        let char_strings_offset = char_strings_offset.ok_or(SubsetError::MissingCharStrings)?;
        let char_strings = read_index(offset_data, char_strings_offset)?;
        let charset = read_charset(offset_data, charset_offset, char_strings.len() as u32)?;

        let (private_dict, local_subrs) = match private_range {
            Some(range) => {
                let private_data = offset_data
                    .as_bytes()
                    .get(range.clone())
                    .ok_or(ReadError::OutOfBounds)?;
                let (private_dict, subrs_offset) = read_private_dict(private_data)?;
                let local_subrs = match subrs_offset {
                    Some(offset) => read_index(offset_data, range.start + offset)?,
                    None => vec![],
                };
                (private_dict, local_subrs)
            }
            None => Default::default(),
        };

        let source = Self {
            name,
            strings: index_items(&cff.strings())?,
            top_dict,
            char_strings,
            global_subrs: index_items(&cff.global_subrs())?,
            local_subrs,
            charset,
            private_dict,
        };
        log::debug!(
            "Read CFF font with {} glyphs, {} strings, {} global and {} local subrs",
            source.char_strings.len(),
            source.strings.len(),
            source.global_subrs.len(),
            source.local_subrs.len()
        );
        Ok(source)
    }

    pub fn num_glyphs(&self) -> u32 {
        self.char_strings.len() as u32
    }
}

fn index_items<'a>(index: &Index1<'a>) -> Result<Vec<&'a [u8]>, SubsetError> {
    (0..index.count() as usize)
        .map(|i| index.get(i).map_err(Into::into))
        .collect()
}

fn read_index(data: FontData<'_>, offset: usize) -> Result<Vec<&[u8]>, SubsetError> {
    let index = Index1::read(data.split_off(offset).ok_or(ReadError::OutOfBounds)?)?;
    index_items(&index)
}

fn read_charset(
    data: FontData<'_>,
    offset: usize,
    num_glyphs: u32,
) -> Result<Vec<StringId>, SubsetError> {
    let charset = Charset::new(data, offset, num_glyphs)?;
    // predefined charsets cover fewer glyphs than a font may have, glyphs
    // past the end fall back to their glyph id
    Ok((0..num_glyphs)
        .map_while(|gid| charset.string_id(GlyphId::new(gid)).ok())
        .collect())
}

/// Returns the Private DICT values and the offset of the local subrs
/// relative to the start of the Private DICT.
fn read_private_dict(data: &[u8]) -> Result<(PrivateDict, Option<usize>), SubsetError> {
    let mut private_dict = PrivateDict::default();
    let mut subrs_offset = None;
    let flatten = |blues: &dict::Blues| -> Vec<f64> {
        blues
            .values()
            .iter()
            .flat_map(|(bottom, top)| [bottom.to_f64(), top.to_f64()])
            .collect()
    };
    let snaps = |snaps: &dict::StemSnaps| -> Vec<f64> {
        snaps.values().iter().map(|value| value.to_f64()).collect()
    };
    for entry in dict::entries(data, None) {
        match entry? {
            dict::Entry::BlueValues(blues) => private_dict.blue_values = flatten(&blues),
            dict::Entry::OtherBlues(blues) => private_dict.other_blues = flatten(&blues),
            dict::Entry::FamilyBlues(blues) => private_dict.family_blues = flatten(&blues),
            dict::Entry::FamilyOtherBlues(blues) => {
                private_dict.family_other_blues = flatten(&blues)
            }
            dict::Entry::BlueScale(value) => private_dict.blue_scale = value.to_f64(),
            dict::Entry::BlueShift(value) => private_dict.blue_shift = value.to_f64(),
            dict::Entry::BlueFuzz(value) => private_dict.blue_fuzz = value.to_f64(),
            dict::Entry::StdHw(value) => private_dict.std_hw = value.to_f64(),
            dict::Entry::StdVw(value) => private_dict.std_vw = value.to_f64(),
            dict::Entry::StemSnapH(values) => private_dict.stem_snap_h = snaps(&values),
            dict::Entry::StemSnapV(values) => private_dict.stem_snap_v = snaps(&values),
            dict::Entry::ForceBold(force_bold) => private_dict.force_bold = force_bold,
            dict::Entry::LanguageGroup(group) => private_dict.language_group = group,
            dict::Entry::ExpansionFactor(value) => private_dict.expansion_factor = value.to_f64(),
            dict::Entry::DefaultWidthX(value) => private_dict.default_width_x = value.to_f64(),
            dict::Entry::NominalWidthX(value) => private_dict.nominal_width_x = value.to_f64(),
            dict::Entry::SubrsOffset(offset) => subrs_offset = Some(offset),
            _ => {}
        }
    }
    Ok((private_dict, subrs_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_dict_values() {
        let data = [
            // BlueValues as deltas -20 0 500 10
            119, 139, 248, 136, 149, 6, //
            // StdVW 80
            219, 11, //
            // BlueScale 0.5
            30, 0x0A, 0x5F, 12, 9, //
            // Subrs 42
            181, 19,
        ];
        let (private_dict, subrs_offset) = read_private_dict(&data).unwrap();
        assert_eq!(private_dict.blue_values, [-20.0, -20.0, 480.0, 490.0]);
        assert_eq!(private_dict.std_vw, 80.0);
        assert_eq!(private_dict.blue_scale, 0.5);
        assert_eq!(private_dict.blue_fuzz, 1.0);
        assert_eq!(subrs_offset, Some(42));
    }

    #[test]
    fn top_dict_sids_in_operator_order() {
        let top_dict = TopDict {
            version: Some(StringId::new(395)),
            notice: Some(StringId::new(391)),
            copyright: Some(StringId::new(393)),
            full_name: Some(StringId::new(395)),
            weight: Some(StringId::new(388)),
            ..Default::default()
        };
        let mut sids = SidRemap::default();
        let remapped = top_dict.remap_sids(&mut sids);
        assert_eq!(remapped.version, Some(StringId::new(391)));
        assert_eq!(remapped.notice, Some(StringId::new(392)));
        assert_eq!(remapped.copyright, Some(StringId::new(393)));
        assert_eq!(remapped.full_name, Some(StringId::new(391)));
        assert_eq!(remapped.family_name, None);
        assert_eq!(remapped.weight, Some(StringId::new(388)));
        assert_eq!(sids.retained(), [4, 0, 2]);
    }
}
