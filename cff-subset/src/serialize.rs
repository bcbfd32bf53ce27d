//! Writing the subset CFF table.
//!
//! See "5 Table Data" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf#page=10>

use write_fonts::read::tables::postscript::StringId;

use crate::{
    charset::SubsetCharset,
    dict::{self, private, top, DictWriter},
    source::{PrivateDict, TopDict},
    SubsetError,
};

/// Version 1.0, header size 4, absolute offset size 4.
const HEADER: [u8; 4] = [1, 0, 4, 4];

/// Upper bound on Top DICT serialization passes.
const MAX_TOP_DICT_PASSES: usize = 8;

const MAX_SUBRS_OFFSET_PASSES: usize = 4;

const MAX_INDEX_COUNT: usize = u16::MAX as usize;

/// The components of the output table, already remapped.
pub(crate) struct CffTable<'a> {
    pub name: &'a [u8],
    pub top_dict: TopDict,
    pub strings: Vec<&'a [u8]>,
    pub global_subrs: Vec<Vec<u8>>,
    pub charset: SubsetCharset,
    pub char_strings: Vec<Vec<u8>>,
    pub private_dict: &'a PrivateDict,
    pub local_subrs: Vec<Vec<u8>>,
}

/// Offsets written into the Top DICT.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
struct TopDictOffsets {
    charset: usize,
    char_strings: usize,
    private_size: usize,
    private: usize,
}

/// Smallest offset size that can hold `max_offset`.
fn off_size(max_offset: usize) -> u8 {
    match max_offset {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Returns the number of bytes of an INDEX holding `items`.
pub(crate) fn index_size<T: AsRef<[u8]>>(items: &[T]) -> Result<usize, SubsetError> {
    if items.len() > MAX_INDEX_COUNT {
        return Err(SubsetError::IndexOverflow { count: items.len() });
    }
    if items.is_empty() {
        return Ok(2);
    }
    let data_size: usize = items.iter().map(|item| item.as_ref().len()).sum();
    let off_size = off_size(data_size + 1) as usize;
    Ok(2 + 1 + (items.len() + 1) * off_size + data_size)
}

pub(crate) fn write_index<T: AsRef<[u8]>>(
    items: &[T],
    out: &mut Vec<u8>,
) -> Result<(), SubsetError> {
    if items.len() > MAX_INDEX_COUNT {
        return Err(SubsetError::IndexOverflow { count: items.len() });
    }
    out.extend((items.len() as u16).to_be_bytes());
    if items.is_empty() {
        return Ok(());
    }
    let data_size: usize = items.iter().map(|item| item.as_ref().len()).sum();
    let off_size = off_size(data_size + 1);
    out.push(off_size);
    let mut offset = 1usize;
    let write_offset = |offset: usize, out: &mut Vec<u8>| {
        let bytes = (offset as u32).to_be_bytes();
        out.extend_from_slice(&bytes[4 - off_size as usize..]);
    };
    write_offset(offset, out);
    for item in items {
        offset += item.as_ref().len();
        write_offset(offset, out);
    }
    for item in items {
        out.extend_from_slice(item.as_ref());
    }
    Ok(())
}

fn write_sid(dict: &mut DictWriter, sid: Option<StringId>, op: u16) {
    if let Some(sid) = sid {
        dict.int(sid.to_u16() as i32).operator(op);
    }
}

fn write_top_dict(top_dict: &TopDict, offsets: &TopDictOffsets) -> Vec<u8> {
    let mut dict = DictWriter::new();
    write_sid(&mut dict, top_dict.version, top::VERSION);
    write_sid(&mut dict, top_dict.notice, top::NOTICE);
    write_sid(&mut dict, top_dict.full_name, top::FULL_NAME);
    write_sid(&mut dict, top_dict.family_name, top::FAMILY_NAME);
    write_sid(&mut dict, top_dict.weight, top::WEIGHT);
    for value in top_dict.font_bbox {
        dict.number(value);
    }
    dict.operator(top::FONT_BBOX);
    write_sid(&mut dict, top_dict.copyright, top::COPYRIGHT);
    if top_dict.is_fixed_pitch {
        dict.int(1).operator(top::IS_FIXED_PITCH);
    }
    dict.number_unless(top_dict.italic_angle, 0.0, top::ITALIC_ANGLE)
        .number_unless(top_dict.underline_position, -100.0, top::UNDERLINE_POSITION)
        .number_unless(top_dict.underline_thickness, 50.0, top::UNDERLINE_THICKNESS)
        .int(offsets.charset as i32)
        .operator(top::CHARSET)
        .int(offsets.char_strings as i32)
        .operator(top::CHAR_STRINGS)
        .int(offsets.private_size as i32)
        .int(offsets.private as i32)
        .operator(top::PRIVATE);
    dict.into_bytes()
}

/// Writes the Private DICT without its `Subrs` entry.
fn write_private_dict_base(private_dict: &PrivateDict) -> DictWriter {
    let mut dict = DictWriter::new();
    dict.delta_array(&private_dict.blue_values, private::BLUE_VALUES)
        .delta_array(&private_dict.other_blues, private::OTHER_BLUES)
        .delta_array(&private_dict.family_blues, private::FAMILY_BLUES)
        .delta_array(&private_dict.family_other_blues, private::FAMILY_OTHER_BLUES)
        .number_unless(
            private_dict.blue_fuzz,
            PrivateDict::DEFAULT_BLUE_FUZZ,
            private::BLUE_FUZZ,
        )
        .number_unless(private_dict.std_hw, 0.0, private::STD_HW)
        .number_unless(private_dict.std_vw, 0.0, private::STD_VW)
        .delta_array(&private_dict.stem_snap_h, private::STEM_SNAP_H)
        .delta_array(&private_dict.stem_snap_v, private::STEM_SNAP_V)
        .number_unless(private_dict.default_width_x, 0.0, private::DEFAULT_WIDTH_X)
        .number_unless(private_dict.nominal_width_x, 0.0, private::NOMINAL_WIDTH_X)
        .number_unless(
            private_dict.blue_scale,
            PrivateDict::DEFAULT_BLUE_SCALE,
            private::BLUE_SCALE,
        )
        .number_unless(
            private_dict.blue_shift,
            PrivateDict::DEFAULT_BLUE_SHIFT,
            private::BLUE_SHIFT,
        );
    if private_dict.force_bold {
        dict.int(1).operator(private::FORCE_BOLD);
    }
    dict.number_unless(
        private_dict.language_group as f64,
        0.0,
        private::LANGUAGE_GROUP,
    )
    .number_unless(
        private_dict.expansion_factor,
        PrivateDict::DEFAULT_EXPANSION_FACTOR,
        private::EXPANSION_FACTOR,
    );
    dict
}

/// Writes the Private DICT, followed directly by the local subrs if
/// `has_subrs` is set.
///
/// The `Subrs` offset is relative to the start of the Private DICT and thus
/// equal to the DICT's own length, which depends on the width of the offset
/// operand.
fn write_private_dict(
    private_dict: &PrivateDict,
    has_subrs: bool,
) -> Result<Vec<u8>, SubsetError> {
    let mut dict = write_private_dict_base(private_dict);
    if !has_subrs {
        return Ok(dict.into_bytes());
    }
    let base_len = dict.len();
    // assume a two byte operand plus the operator, then correct the width
    let mut subrs_offset = base_len + 3;
    for _ in 0..MAX_SUBRS_OFFSET_PASSES {
        let len = base_len + dict::int_len(subrs_offset as i32) + 1;
        if len == subrs_offset {
            dict.int(subrs_offset as i32).operator(private::SUBRS);
            debug_assert_eq!(dict.len(), subrs_offset);
            return Ok(dict.into_bytes());
        }
        subrs_offset = len;
    }
    Err(SubsetError::SubrsOffsetDidNotConverge)
}

/// Serializes a complete CFF table.
pub(crate) fn write_cff(table: &CffTable) -> Result<Vec<u8>, SubsetError> {
    let name_index_size = index_size(&[table.name])?;
    let string_index_size = index_size(&table.strings)?;
    let global_subrs_size = index_size(&table.global_subrs)?;
    let char_strings_size = index_size(&table.char_strings)?;
    let has_subrs = !table.local_subrs.is_empty();
    let private_dict = write_private_dict(table.private_dict, has_subrs)?;

    // Offsets depend on the size of the Top DICT which depends on the
    // offsets, iterate until they agree.
    let mut offsets = TopDictOffsets::default();
    let mut resolved = None;
    for pass in 0..MAX_TOP_DICT_PASSES {
        let top_dict = write_top_dict(&table.top_dict, &offsets);
        let top_dict_index_size = index_size(&[&top_dict])?;
        let charset = HEADER.len()
            + name_index_size
            + top_dict_index_size
            + string_index_size
            + global_subrs_size;
        let char_strings = charset + table.charset.size();
        let next = TopDictOffsets {
            charset,
            char_strings,
            private_size: private_dict.len(),
            private: char_strings + char_strings_size,
        };
        if next == offsets {
            log::debug!(
                "Top DICT offsets resolved after {} passes, {:?} charset at {}",
                pass + 1,
                table.charset.format(),
                offsets.charset
            );
            resolved = Some(top_dict);
            break;
        }
        offsets = next;
    }
    let top_dict = resolved.ok_or(SubsetError::TopDictOffsetsDidNotConverge(
        MAX_TOP_DICT_PASSES,
    ))?;

    let mut out = Vec::with_capacity(offsets.private + private_dict.len());
    out.extend(HEADER);
    write_index(&[table.name], &mut out)?;
    write_index(&[&top_dict], &mut out)?;
    write_index(&table.strings, &mut out)?;
    write_index(&table.global_subrs, &mut out)?;
    debug_assert_eq!(out.len(), offsets.charset);
    table.charset.write(&mut out);
    debug_assert_eq!(out.len(), offsets.char_strings);
    write_index(&table.char_strings, &mut out)?;
    debug_assert_eq!(out.len(), offsets.private);
    out.extend(private_dict);
    if has_subrs {
        write_index(&table.local_subrs, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use write_fonts::read::{
        tables::{
            cff::Cff,
            postscript::{dict as read_dict, Index1},
        },
        FontData, FontRead,
    };

    fn index_bytes<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
        let mut out = vec![];
        write_index(items, &mut out).unwrap();
        assert_eq!(out.len(), index_size(items).unwrap());
        out
    }

    #[test]
    fn index_layout() {
        let items: [&[u8]; 2] = [b"a", b"bc"];
        assert_eq!(index_bytes(&items), [0, 2, 1, 1, 2, 4, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_index() {
        assert_eq!(index_bytes::<&[u8]>(&[]), [0, 0]);
    }

    #[test]
    fn offset_size_counts_the_final_offset() {
        // offsets run up to 256 which needs two bytes
        let bytes = index_bytes(&[vec![0u8; 255]]);
        assert_eq!(&bytes[..7], [0, 1, 2, 0, 1, 1, 0]);
        assert_eq!(bytes.len(), 2 + 1 + 2 * 2 + 255);

        let bytes = index_bytes(&[vec![0u8; 254]]);
        assert_eq!(&bytes[..5], [0, 1, 1, 1, 255]);
    }

    #[test]
    fn index_overflow() {
        let items = vec![[0u8; 0]; MAX_INDEX_COUNT + 1];
        assert!(matches!(
            index_size(&items),
            Err(SubsetError::IndexOverflow { count }) if count == MAX_INDEX_COUNT + 1
        ));
    }

    fn private_with_blues(count: usize) -> PrivateDict {
        PrivateDict {
            blue_values: vec![0.0; count],
            ..Default::default()
        }
    }

    #[test]
    fn subrs_offset_is_dict_length() {
        // 103 deltas and the operator
        let dict = write_private_dict(&private_with_blues(103), true).unwrap();
        assert_eq!(dict.len(), 106);
        assert_eq!(&dict[104..], [245, 19]);

        // 107 would also fit, the two byte guess of 108 is kept
        let dict = write_private_dict(&private_with_blues(104), true).unwrap();
        assert_eq!(dict.len(), 108);
        assert_eq!(&dict[105..], [247, 0, 19]);
    }

    #[test]
    fn subrs_offset_widens() {
        // 108 does not fit in a single byte operand
        let dict = write_private_dict(&private_with_blues(105), true).unwrap();
        assert_eq!(dict.len(), 109);
        assert_eq!(&dict[106..], [247, 1, 19]);
    }

    #[test]
    fn private_dict_order_and_defaults() {
        let private_dict = PrivateDict {
            blue_values: vec![-10.0, 0.0],
            blue_fuzz: 0.0,
            std_vw: 80.0,
            nominal_width_x: 500.0,
            blue_shift: 7.0,
            force_bold: true,
            ..Default::default()
        };
        let dict = write_private_dict(&private_dict, false).unwrap();
        assert_eq!(
            dict,
            [
                129, 149, 6, // BlueValues
                139, 12, 11, // BlueFuzz 0
                219, 11, // StdVW
                248, 136, 21, // nominalWidthX
                140, 12, 14, // ForceBold
            ]
        );
    }

    #[test]
    fn top_dict_layout() {
        let top_dict = TopDict {
            font_bbox: [-50.0, -200.0, 1000.0, 900.0],
            underline_position: -120.0,
            ..Default::default()
        };
        let offsets = TopDictOffsets {
            charset: 30,
            char_strings: 40,
            private_size: 10,
            private: 2000,
        };
        assert_eq!(
            write_top_dict(&top_dict, &offsets),
            [
                89, 251, 92, 250, 124, 250, 24, 5, // FontBBox
                251, 12, 12, 3, // UnderlinePosition
                169, 15, // charset
                179, 17, // CharStrings
                149, 28, 0x07, 0xD0, 18, // Private
            ]
        );
    }

    #[test]
    fn private_offset_crosses_into_five_byte_form() {
        // With a three byte Private offset operand the offset is the glyph
        // length + 41, so past 32726 it no longer fits and the operand widens
        // to five bytes, moving everything after the Top DICT.
        let private_dict = PrivateDict::default();
        for glyph_len in 32720..32734 {
            let table = CffTable {
                name: b"A",
                top_dict: TopDict::default(),
                strings: vec![],
                global_subrs: vec![],
                charset: SubsetCharset::new(vec![]),
                char_strings: vec![vec![14; glyph_len]],
                private_dict: &private_dict,
                local_subrs: vec![],
            };
            let data = write_cff(&table).unwrap();
            let cff = Cff::read(FontData::new(&data)).unwrap();
            let top_dict = cff.top_dicts().get(0).unwrap();

            let mut charset = None;
            let mut char_strings = None;
            let mut private = None;
            for entry in read_dict::entries(top_dict, None) {
                match entry.unwrap() {
                    read_dict::Entry::Charset(offset) => charset = Some(offset),
                    read_dict::Entry::CharstringsOffset(offset) => char_strings = Some(offset),
                    read_dict::Entry::PrivateDictRange(range) => private = Some(range),
                    _ => {}
                }
            }
            let (charset, char_strings, private) =
                (charset.unwrap(), char_strings.unwrap(), private.unwrap());

            let wide = glyph_len > 32726;
            let operand_len = if wide { 5 } else { 3 };
            assert_eq!(private.start, glyph_len + 38 + operand_len);
            // the empty Private DICT ends the table
            assert_eq!(private, data.len()..data.len());
            let operator_start = top_dict.len() - 1 - operand_len;
            assert_eq!(top_dict[operator_start], if wide { 29 } else { 28 });

            // the offsets point at what was written
            assert_eq!(data[charset], 0);
            assert_eq!(charset + 1, char_strings);
            let index = Index1::read(FontData::new(&data[char_strings..])).unwrap();
            assert_eq!(index.count(), 1);
            assert_eq!(index.get(0).unwrap().len(), glyph_len);
        }
    }
}
