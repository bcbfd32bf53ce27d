//! Rewriting of subroutine calls after renumbering.

use crate::{
    charstring::{self, operator, Decoder, Token},
    subrs::{unbias, Body, HintMasks, SubrRemap},
};

/// Rewrites charstrings so that their subroutine calls refer to the
/// renumbered subroutines.
///
/// Apart from the operands of `callsubr` and `callgsubr`, every byte is
/// copied unchanged.
pub(crate) struct CharStringRewriter<'a> {
    global: &'a SubrRemap,
    local: &'a SubrRemap,
    // biases of the original subroutine INDEXes
    global_bias: i32,
    local_bias: i32,
    hint_masks: &'a HintMasks,
}

impl<'a> CharStringRewriter<'a> {
    pub(crate) fn new(
        global: &'a SubrRemap,
        global_bias: i32,
        local: &'a SubrRemap,
        local_bias: i32,
        hint_masks: &'a HintMasks,
    ) -> Self {
        Self {
            global,
            local,
            global_bias,
            local_bias,
            hint_masks,
        }
    }

    pub(crate) fn rewrite(&self, body: Body, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        // value of each operand on the stack and where its encoding starts
        // in `out`
        let mut operands: Vec<(i32, usize)> = Vec::new();
        let mut stem_count = 0;
        let mut decoder = Decoder::new(data);
        while let Some((token, range)) = decoder.next() {
            let bytes = &data[range.clone()];
            let op = match token {
                Token::Operand(value) => {
                    operands.push((value, out.len()));
                    out.extend_from_slice(bytes);
                    continue;
                }
                Token::Operator(op) => op,
            };
            match op {
                operator::CALLSUBR | operator::CALLGSUBR => {
                    let (remap, bias) = if op == operator::CALLSUBR {
                        (self.local, self.local_bias)
                    } else {
                        (self.global, self.global_bias)
                    };
                    // The popped operand is always the last thing written since
                    // every operator empties the stack.
                    if let Some((value, start)) = operands.pop() {
                        if let Some(new_value) = remapped_operand(value, bias, remap) {
                            out.truncate(start);
                            charstring::encode_int(new_value, &mut out);
                        } else {
                            log::debug!("Call to unmapped subroutine {value} in {body:?}");
                        }
                    }
                    out.extend_from_slice(bytes);
                    operands.clear();
                }
                operator::HSTEM | operator::VSTEM | operator::HSTEMHM | operator::VSTEMHM => {
                    stem_count += operands.len() / 2;
                    operands.clear();
                    out.extend_from_slice(bytes);
                }
                operator::HINTMASK | operator::CNTRMASK => {
                    stem_count += operands.len() / 2;
                    operands.clear();
                    out.extend_from_slice(bytes);
                    let mask_len = self
                        .hint_masks
                        .get(&(body, range.start))
                        .copied()
                        .unwrap_or_else(|| stem_count.div_ceil(8));
                    let Some(mask) = decoder.skip_bytes(mask_len) else {
                        break;
                    };
                    out.extend_from_slice(mask);
                }
                _ => {
                    operands.clear();
                    out.extend_from_slice(bytes);
                }
            }
        }
        // trailing bytes of a truncated encoding are kept as they are
        out.extend_from_slice(decoder.remaining());
        out
    }
}

fn remapped_operand(value: i32, bias: i32, remap: &SubrRemap) -> Option<i16> {
    let old = unbias(value, bias, usize::MAX)?;
    if !remap.has(old) {
        return None;
    }
    i16::try_from(remap.biased_num(old)?).ok()
}
