//! Writing PostScript DICT data.
//!
//! See "4 DICT Data" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf#page=9>

/// Escape opcode for accessing two byte operators.
const ESCAPE: u8 = 12;

/// Lead byte of a binary coded decimal real number.
const REAL: u8 = 30;

/// Top DICT operators.
///
/// Two byte operators are represented as `0x0C00 | second_byte`.
pub(crate) mod top {
    pub const VERSION: u16 = 0;
    pub const NOTICE: u16 = 1;
    pub const FULL_NAME: u16 = 2;
    pub const FAMILY_NAME: u16 = 3;
    pub const WEIGHT: u16 = 4;
    pub const FONT_BBOX: u16 = 5;
    pub const CHARSET: u16 = 15;
    pub const CHAR_STRINGS: u16 = 17;
    pub const PRIVATE: u16 = 18;
    pub const COPYRIGHT: u16 = 0x0C00;
    pub const IS_FIXED_PITCH: u16 = 0x0C01;
    pub const ITALIC_ANGLE: u16 = 0x0C02;
    pub const UNDERLINE_POSITION: u16 = 0x0C03;
    pub const UNDERLINE_THICKNESS: u16 = 0x0C04;
}

/// Private DICT operators.
pub(crate) mod private {
    pub const BLUE_VALUES: u16 = 6;
    pub const OTHER_BLUES: u16 = 7;
    pub const FAMILY_BLUES: u16 = 8;
    pub const FAMILY_OTHER_BLUES: u16 = 9;
    pub const STD_HW: u16 = 10;
    pub const STD_VW: u16 = 11;
    pub const SUBRS: u16 = 19;
    pub const DEFAULT_WIDTH_X: u16 = 20;
    pub const NOMINAL_WIDTH_X: u16 = 21;
    pub const BLUE_SCALE: u16 = 0x0C09;
    pub const BLUE_SHIFT: u16 = 0x0C0A;
    pub const BLUE_FUZZ: u16 = 0x0C0B;
    pub const STEM_SNAP_H: u16 = 0x0C0C;
    pub const STEM_SNAP_V: u16 = 0x0C0D;
    pub const FORCE_BOLD: u16 = 0x0C0E;
    pub const LANGUAGE_GROUP: u16 = 0x0C11;
    pub const EXPANSION_FACTOR: u16 = 0x0C12;
}

/// Returns the number of bytes needed for the shortest DICT encoding of
/// `value`.
pub(crate) fn int_len(value: i32) -> usize {
    match value {
        -107..=107 => 1,
        -1131..=1131 => 2,
        -32768..=32767 => 3,
        _ => 5,
    }
}

/// Appends the shortest DICT encoding of `value`.
pub(crate) fn encode_int(value: i32, out: &mut Vec<u8>) {
    match value {
        -107..=107 => out.push((value + 139) as u8),
        108..=1131 => {
            let v = value - 108;
            out.extend([((v >> 8) + 247) as u8, v as u8]);
        }
        -1131..=-108 => {
            let v = -value - 108;
            out.extend([((v >> 8) + 251) as u8, v as u8]);
        }
        -32768..=32767 => {
            out.push(28);
            out.extend((value as i16).to_be_bytes());
        }
        _ => {
            out.push(29);
            out.extend(value.to_be_bytes());
        }
    }
}

/// Appends `value` in the binary coded decimal form.
fn encode_real(value: f64, out: &mut Vec<u8>) {
    let value = if value.is_finite() { value } else { 0.0 };
    let mut text = format!("{value:.6}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
    text.truncate(trimmed);
    if text == "-0" {
        text = "0".into();
    }
    let mut nibbles: Vec<u8> = text
        .bytes()
        .map(|c| match c {
            b'.' => 0xA,
            b'-' => 0xE,
            digit => digit - b'0',
        })
        .collect();
    nibbles.push(0xF);
    if nibbles.len() % 2 == 1 {
        nibbles.push(0xF);
    }
    out.push(REAL);
    out.extend(nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
}

/// Accumulates operands and operators of a single DICT.
#[derive(Clone, Debug, Default)]
pub(crate) struct DictWriter {
    data: Vec<u8>,
}

impl DictWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn int(&mut self, value: i32) -> &mut Self {
        encode_int(value, &mut self.data);
        self
    }

    /// Writes an integer when `value` is integral, a real otherwise.
    pub(crate) fn number(&mut self, value: f64) -> &mut Self {
        if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
            self.int(value as i32)
        } else {
            encode_real(value, &mut self.data);
            self
        }
    }

    pub(crate) fn operator(&mut self, op: u16) -> &mut Self {
        if op >> 8 == ESCAPE as u16 {
            self.data.extend([ESCAPE, op as u8]);
        } else {
            self.data.push(op as u8);
        }
        self
    }

    /// Writes `values` as a delta encoded array followed by `op`.
    ///
    /// Nothing is written for an empty array.
    pub(crate) fn delta_array(&mut self, values: &[f64], op: u16) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let mut previous = 0.0;
        for value in values {
            self.number(value - previous);
            previous = *value;
        }
        self.operator(op)
    }

    /// Writes `op` with a single operand unless `value` equals `default`.
    pub(crate) fn number_unless(&mut self, value: f64, default: f64, op: u16) -> &mut Self {
        if value != default {
            self.number(value).operator(op);
        }
        self
    }
}
