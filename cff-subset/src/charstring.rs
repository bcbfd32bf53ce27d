//! Decoding and encoding of Type 2 charstring tokens.
//!
//! Only the structure of a charstring matters to the subsetter: where each
//! number starts and ends and which operator follows. Values are kept just
//! precisely enough to resolve subroutine calls.
//!
//! See "3.2 Charstring Number Encoding" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5177.Type2.pdf#page=12>

use std::ops::Range;

/// Escape opcode for accessing two byte operators.
const ESCAPE: u8 = 12;

/// Charstring operators that the subsetter needs to recognize.
///
/// Two byte operators are represented as `0x0C00 | second_byte`.
pub mod operator {
    pub const HSTEM: u16 = 1;
    pub const VSTEM: u16 = 3;
    pub const CALLSUBR: u16 = 10;
    pub const RETURN: u16 = 11;
    pub const ENDCHAR: u16 = 14;
    pub const HSTEMHM: u16 = 18;
    pub const HINTMASK: u16 = 19;
    pub const CNTRMASK: u16 = 20;
    pub const VSTEMHM: u16 = 23;
    pub const CALLGSUBR: u16 = 29;
}

/// A single charstring token.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Token {
    /// A number pushed to the argument stack.
    ///
    /// 16.16 fixed point numbers only keep their integer part.
    Operand(i32),
    /// An operator.
    Operator(u16),
}

/// Sequential decoder over the bytes of a charstring or subroutine.
///
/// Iteration yields each token with the byte range it occupies. If the data
/// ends in the middle of an encoding, iteration stops and the partial bytes
/// remain available through [`Decoder::remaining`].
#[derive(Clone, Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes that have not been consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    /// Consumes `len` raw bytes, such as the mask following a `hintmask`.
    ///
    /// Returns `None` without consuming anything if fewer bytes remain.
    pub fn skip_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn decode(&self, start: usize) -> Option<(Token, usize)> {
        let data = self.data;
        let b0 = *data.get(start)?;
        Some(match b0 {
            32..=246 => (Token::Operand(b0 as i32 - 139), 1),
            247..=250 => {
                let b1 = *data.get(start + 1)? as i32;
                (Token::Operand((b0 as i32 - 247) * 256 + b1 + 108), 2)
            }
            251..=254 => {
                let b1 = *data.get(start + 1)? as i32;
                (Token::Operand(-(b0 as i32 - 251) * 256 - b1 - 108), 2)
            }
            28 => {
                let bytes = data.get(start + 1..start + 3)?;
                (
                    Token::Operand(i16::from_be_bytes([bytes[0], bytes[1]]) as i32),
                    3,
                )
            }
            255 => {
                let bytes: [u8; 4] = data.get(start + 1..start + 5)?.try_into().ok()?;
                (Token::Operand(i32::from_be_bytes(bytes) >> 16), 5)
            }
            ESCAPE => {
                let b1 = *data.get(start + 1)?;
                (Token::Operator(((ESCAPE as u16) << 8) | b1 as u16), 2)
            }
            _ => (Token::Operator(b0 as u16), 1),
        })
    }
}

impl Iterator for Decoder<'_> {
    type Item = (Token, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let (token, len) = self.decode(start)?;
        self.pos = start + len;
        Some((token, start..self.pos))
    }
}

/// Appends the shortest charstring encoding of `value`.
///
/// The five byte fixed point form is never produced.
pub fn encode_int(value: i16, out: &mut Vec<u8>) {
    let v = value as i32;
    match v {
        -107..=107 => out.push((v + 139) as u8),
        108..=1131 => {
            let v = v - 108;
            out.extend([((v >> 8) + 247) as u8, v as u8]);
        }
        -1131..=-108 => {
            let v = -v - 108;
            out.extend([((v >> 8) + 251) as u8, v as u8]);
        }
        _ => {
            out.push(28);
            out.extend(value.to_be_bytes());
        }
    }
}
