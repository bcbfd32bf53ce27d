//! Subroutine closure and renumbering.
//!
//! See "Local/Global Subrs INDEXes" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf#page=25>

use fnv::FnvHashMap;

use crate::{
    charstring::{operator, Decoder, Token},
    SubsetError,
};

/// Maximum nesting depth for subroutine calls.
///
/// See "Appendix B Type 2 Charstring Implementation Limits" at
/// <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5177.Type2.pdf#page=33>
pub const NESTING_DEPTH_LIMIT: u32 = 10;

/// Maximum number of operands on the argument stack.
const MAX_STACK_DEPTH: usize = 48;

/// Computes the bias that is added to a subroutine operand for a
/// subroutine INDEX with `count` entries.
pub fn subr_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

/// Resolves a biased subroutine operand to an index into a subroutine INDEX
/// of `len` entries.
pub(crate) fn unbias(operand: i32, bias: i32, len: usize) -> Option<usize> {
    let index = usize::try_from(operand.checked_add(bias)?).ok()?;
    (index < len).then_some(index)
}

/// Identifies a charstring program: a glyph or one of the subroutines.
///
/// Glyphs and subroutines are identified by their index in the original
/// font.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Body {
    CharString(u32),
    GlobalSubr(u32),
    LocalSubr(u32),
}

/// Byte length of each hint mask, keyed by the program and the position of
/// its `hintmask` or `cntrmask` operator.
pub(crate) type HintMasks = FnvHashMap<(Body, usize), usize>;

/// Subroutines reachable from the retained glyphs.
#[derive(Clone, Debug, Default)]
pub(crate) struct SubrClosures {
    /// `true` for each reachable global subroutine.
    pub global: Vec<bool>,
    /// `true` for each reachable local subroutine.
    pub local: Vec<bool>,
    pub hint_masks: HintMasks,
}

/// How a walk over one program ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Flow {
    /// End of the program or `return`; the caller continues.
    Return,
    /// `endchar`; the whole glyph is done.
    EndChar,
}

/// Interpreter state shared by a glyph and all subroutines it calls.
#[derive(Default)]
struct Traversal {
    stack: Vec<i32>,
    stem_count: usize,
}

/// One family of subroutines along with the per-glyph visited guard.
struct SubrFamily<'a> {
    subrs: &'a [&'a [u8]],
    bias: i32,
    closure: Vec<bool>,
    // generation in which each subroutine was last walked
    visited: Vec<u32>,
}

impl<'a> SubrFamily<'a> {
    fn new(subrs: &'a [&'a [u8]]) -> Self {
        Self {
            subrs,
            bias: subr_bias(subrs.len()),
            closure: vec![false; subrs.len()],
            visited: vec![0; subrs.len()],
        }
    }
}

/// Computes the transitive set of subroutines called by a set of glyphs.
pub(crate) struct ClosureCollector<'a> {
    global: SubrFamily<'a>,
    local: SubrFamily<'a>,
    hint_masks: HintMasks,
    generation: u32,
    // first glyph whose calls nest deeper than the limit
    too_deep: Option<u32>,
}

impl<'a> ClosureCollector<'a> {
    pub(crate) fn new(global_subrs: &'a [&'a [u8]], local_subrs: &'a [&'a [u8]]) -> Self {
        Self {
            global: SubrFamily::new(global_subrs),
            local: SubrFamily::new(local_subrs),
            hint_masks: Default::default(),
            generation: 0,
            too_deep: None,
        }
    }

    /// Adds the subroutines reachable from the charstring of glyph `gid`.
    pub(crate) fn collect(&mut self, gid: u32, charstring: &[u8]) {
        // A new generation resets the visited guard of both families.
        self.generation = match self.generation.checked_add(1) {
            Some(generation) => generation,
            None => {
                self.global.visited.fill(0);
                self.local.visited.fill(0);
                1
            }
        };
        let mut traversal = Traversal::default();
        self.walk(gid, Body::CharString(gid), charstring, &mut traversal, 0);
    }

    /// Returns the closures, or an error if some glyph nests subroutine calls
    /// beyond [`NESTING_DEPTH_LIMIT`].
    ///
    /// Such a closure is incomplete, and renumbering the subroutines it
    /// misses would leave calls pointing at the wrong bodies.
    pub(crate) fn finish(self) -> Result<SubrClosures, SubsetError> {
        if let Some(gid) = self.too_deep {
            return Err(SubsetError::NestingDepthExceeded { gid });
        }
        Ok(SubrClosures {
            global: self.global.closure,
            local: self.local.closure,
            hint_masks: self.hint_masks,
        })
    }

    fn walk(
        &mut self,
        gid: u32,
        body: Body,
        data: &[u8],
        traversal: &mut Traversal,
        depth: u32,
    ) -> Flow {
        let mut decoder = Decoder::new(data);
        while let Some((token, range)) = decoder.next() {
            let op = match token {
                Token::Operand(value) => {
                    // Keep going past the limit: the rewriter sees every call
                    // in this body, so the closure has to as well.
                    if traversal.stack.len() == MAX_STACK_DEPTH {
                        log::warn!("Argument stack overflow in {body:?}");
                    }
                    traversal.stack.push(value);
                    continue;
                }
                Token::Operator(op) => op,
            };
            match op {
                operator::CALLSUBR | operator::CALLGSUBR => {
                    let Some(operand) = traversal.stack.pop() else {
                        continue;
                    };
                    let is_local = op == operator::CALLSUBR;
                    let family = if is_local {
                        &mut self.local
                    } else {
                        &mut self.global
                    };
                    let Some(index) = unbias(operand, family.bias, family.subrs.len()) else {
                        log::warn!("Subroutine operand {operand} out of range in {body:?}");
                        continue;
                    };
                    if family.visited[index] == self.generation {
                        continue;
                    }
                    if depth >= NESTING_DEPTH_LIMIT {
                        log::warn!("Subroutine nesting depth limit exceeded in {body:?}");
                        self.too_deep.get_or_insert(gid);
                        return Flow::EndChar;
                    }
                    family.visited[index] = self.generation;
                    family.closure[index] = true;
                    let subr = family.subrs[index];
                    let callee = if is_local {
                        Body::LocalSubr(index as u32)
                    } else {
                        Body::GlobalSubr(index as u32)
                    };
                    if self.walk(gid, callee, subr, traversal, depth + 1) == Flow::EndChar {
                        return Flow::EndChar;
                    }
                }
                operator::RETURN => return Flow::Return,
                operator::ENDCHAR => return Flow::EndChar,
                operator::HSTEM | operator::VSTEM | operator::HSTEMHM | operator::VSTEMHM => {
                    traversal.stem_count += traversal.stack.len() / 2;
                    traversal.stack.clear();
                }
                operator::HINTMASK | operator::CNTRMASK => {
                    // operands left on the stack are an implied vstem
                    traversal.stem_count += traversal.stack.len() / 2;
                    traversal.stack.clear();
                    let mask_len = traversal.stem_count.div_ceil(8);
                    self.hint_masks
                        .entry((body, range.start))
                        .or_insert(mask_len);
                    if decoder.skip_bytes(mask_len).is_none() {
                        return Flow::Return;
                    }
                }
                _ => traversal.stack.clear(),
            }
        }
        Flow::Return
    }
}

/// Renumbering of one family of subroutines to consecutive indices.
#[derive(Clone, Debug, Default)]
pub(crate) struct SubrRemap {
    // old index -> new index
    new_indices: Vec<Option<u32>>,
    // new index -> old index
    old_indices: Vec<u32>,
    bias: i32,
}

impl SubrRemap {
    /// Assigns new indices to the members of `closure` in ascending order of
    /// their old index.
    pub(crate) fn new(closure: &[bool]) -> Self {
        let mut new_indices = vec![None; closure.len()];
        let mut old_indices = Vec::new();
        for (old, _) in closure.iter().enumerate().filter(|(_, used)| **used) {
            new_indices[old] = Some(old_indices.len() as u32);
            old_indices.push(old as u32);
        }
        let bias = subr_bias(old_indices.len());
        Self {
            new_indices,
            old_indices,
            bias,
        }
    }

    pub(crate) fn has(&self, old: usize) -> bool {
        self.new_index(old).is_some()
    }

    pub(crate) fn new_index(&self, old: usize) -> Option<u32> {
        self.new_indices.get(old).copied().flatten()
    }

    /// The operand that calls the subroutine with the old index `old` after
    /// renumbering.
    pub(crate) fn biased_num(&self, old: usize) -> Option<i32> {
        Some(self.new_index(old)? as i32 - self.bias)
    }

    /// Old indices of the retained subroutines, in their new order.
    pub(crate) fn old_indices(&self) -> &[u32] {
        &self.old_indices
    }

    pub(crate) fn bias(&self) -> i32 {
        self.bias
    }

    pub(crate) fn len(&self) -> usize {
        self.old_indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure_of(
        global_subrs: &[&[u8]],
        local_subrs: &[&[u8]],
        charstrings: &[&[u8]],
    ) -> SubrClosures {
        let mut collector = ClosureCollector::new(global_subrs, local_subrs);
        for (gid, charstring) in charstrings.iter().enumerate() {
            collector.collect(gid as u32, charstring);
        }
        collector.finish().unwrap()
    }

    fn members(closure: &[bool]) -> Vec<usize> {
        closure
            .iter()
            .enumerate()
            .filter_map(|(i, used)| used.then_some(i))
            .collect()
    }

    #[test]
    fn bias_tiers() {
        assert_eq!(subr_bias(0), 107);
        assert_eq!(subr_bias(1), 107);
        assert_eq!(subr_bias(1239), 107);
        assert_eq!(subr_bias(1240), 1131);
        assert_eq!(subr_bias(33899), 1131);
        assert_eq!(subr_bias(33900), 32768);
    }

    #[test]
    fn transitive_closure() {
        // gsubr 1 calls local subr 2, which calls gsubr 3
        let global: [&[u8]; 4] = [&[11], &[34, 10, 11], &[11], &[11]];
        let local: [&[u8]; 3] = [&[11], &[11], &[35, 29, 11]];
        // glyph 0 calls gsubr 1 (operand 1 - 107 = -106)
        let closures = closure_of(&global, &local, &[&[33, 29, 14], &[14]]);
        assert_eq!(members(&closures.global), [1, 3]);
        assert_eq!(members(&closures.local), [2]);
    }

    #[test]
    fn closure_persists_across_glyphs() {
        let global: [&[u8]; 3] = [&[11], &[11], &[11]];
        let closures = closure_of(&global, &[], &[&[32, 29, 14], &[34, 29, 14], &[32, 29, 14]]);
        assert_eq!(members(&closures.global), [0, 2]);
    }

    #[test]
    fn out_of_range_call_is_not_followed() {
        let global: [&[u8]; 1] = [&[11]];
        // -106 + 107 = 1 is out of bounds, -108 + 107 is negative
        let closures = closure_of(&global, &[], &[&[33, 29, 251, 0, 29, 32, 29, 14]]);
        assert_eq!(members(&closures.global), [0]);
    }

    #[test]
    fn endchar_and_return_end_traversal() {
        let global: [&[u8]; 3] = [&[14], &[11, 33, 29], &[11]];
        // gsubr 0 ends the glyph so gsubr 2 is never called; gsubr 1 returns
        // before calling gsubr 1 again
        let closures = closure_of(&global, &[], &[&[33, 29, 32, 29, 34, 29, 14]]);
        assert_eq!(members(&closures.global), [0, 1]);
    }

    #[test]
    fn cyclic_calls_terminate() {
        // gsubr 0 calls itself, gsubr 1 calls gsubr 0
        let global: [&[u8]; 2] = [&[32, 29, 11], &[32, 29, 11]];
        let closures = closure_of(&global, &[], &[&[33, 29, 14]]);
        assert_eq!(members(&closures.global), [0, 1]);
    }

    /// Global subrs where subr i calls subr i + 1 and the last one returns.
    fn call_chain(len: u8) -> Vec<Vec<u8>> {
        (0..len)
            .map(|i| match i + 1 {
                next if next < len => vec![139 - 107 + next, 29, 11],
                _ => vec![11],
            })
            .collect()
    }

    #[test]
    fn nesting_up_to_the_limit() {
        // the glyph is at depth 0 and the last of ten subrs at depth 10
        let bodies = call_chain(10);
        let global: Vec<&[u8]> = bodies.iter().map(|b| b.as_slice()).collect();
        let closures = closure_of(&global, &[], &[&[32, 29, 14]]);
        assert_eq!(members(&closures.global), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn nesting_past_the_limit_is_an_error() {
        let bodies = call_chain(20);
        let global: Vec<&[u8]> = bodies.iter().map(|b| b.as_slice()).collect();
        let mut collector = ClosureCollector::new(&global, &[]);
        collector.collect(0, &[14]);
        collector.collect(3, &[32, 29, 14]);
        assert!(matches!(
            collector.finish(),
            Err(SubsetError::NestingDepthExceeded { gid: 3 })
        ));
    }

    #[test]
    fn stack_overflow_does_not_hide_calls() {
        let global: [&[u8]; 2] = [&[11], &[11]];
        // 50 operands, then a call to gsubr 1
        let mut charstring = vec![139; 50];
        charstring.extend([33, 29, 14]);
        let closures = closure_of(&global, &[], &[&charstring]);
        assert_eq!(members(&closures.global), [1]);
    }

    #[test]
    fn truncated_program_is_not_an_error() {
        let global: [&[u8]; 2] = [&[11], &[11]];
        let closures = closure_of(&global, &[], &[&[32, 29, 28, 0]]);
        assert_eq!(members(&closures.global), [0]);
    }

    #[test]
    fn hint_mask_bytes_are_not_decoded() {
        let local: [&[u8]; 1] = [&[11]];
        // nine stems need two mask bytes; the second one would read as
        // callsubr with the first one (-107) as its operand
        let mut charstring = vec![139; 18];
        charstring.extend([18, 19, 32, 10, 14]);
        let closures = closure_of(&[], &local, &[&charstring]);
        assert!(members(&closures.local).is_empty());
        assert_eq!(
            closures.hint_masks.get(&(Body::CharString(0), 19)),
            Some(&2)
        );
    }

    #[test]
    fn stems_declared_in_subroutines_size_hint_masks() {
        // gsubr 0 declares eight stems, the glyph then adds an implied vstem
        // before its hintmask
        let mut gsubr = vec![139; 16];
        gsubr.extend([1, 11]);
        let global: [&[u8]; 1] = [&gsubr];
        let closures = closure_of(&global, &[], &[&[32, 29, 139, 139, 19, 0xFF, 0x80, 14]]);
        assert_eq!(
            closures.hint_masks.get(&(Body::CharString(0), 4)),
            Some(&2)
        );
    }

    #[test]
    fn remap_assigns_ascending_indices() {
        let mut closure = vec![false; 50];
        closure[5] = true;
        closure[2] = true;
        closure[40] = true;
        let remap = SubrRemap::new(&closure);
        assert_eq!(remap.old_indices(), [2, 5, 40]);
        assert_eq!(remap.bias(), 107);
        assert!(remap.has(5));
        assert!(!remap.has(6));
        assert!(!remap.has(500));
        assert_eq!(remap.biased_num(2), Some(-107));
        assert_eq!(remap.biased_num(40), Some(-105));
        assert_eq!(remap.biased_num(3), None);
    }

    #[test]
    fn remap_bias_uses_new_count() {
        let remap = SubrRemap::new(&vec![true; 1240]);
        assert_eq!(remap.bias(), 1131);
        assert_eq!(remap.biased_num(0), Some(-1131));
        let remap = SubrRemap::new(&[false; 1240]);
        assert_eq!(remap.len(), 0);
        assert_eq!(remap.bias(), 107);
    }
}
