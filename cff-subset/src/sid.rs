//! Renumbering of custom string identifiers.

use fnv::FnvHashMap;
use write_fonts::read::tables::postscript::StringId;

/// Number of predefined strings. Custom strings start at this SID.
///
/// See "Appendix A - Standard Strings" at <https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf#page=29>
pub const NUM_STANDARD_STRINGS: u16 = 391;

/// Assigns consecutive new SIDs to custom strings in the order in which they
/// are first referenced.
///
/// Standard strings are never renumbered.
#[derive(Clone, Debug, Default)]
pub(crate) struct SidRemap {
    // old string INDEX position -> new string INDEX position
    forward: FnvHashMap<u16, u16>,
    // new string INDEX position -> old string INDEX position
    retained: Vec<u16>,
}

impl SidRemap {
    /// Returns the new identifier for `sid`, assigning one if this custom
    /// string has not been seen yet.
    pub(crate) fn add(&mut self, sid: StringId) -> StringId {
        let Some(old) = sid.to_u16().checked_sub(NUM_STANDARD_STRINGS) else {
            return sid;
        };
        let new = match self.forward.get(&old) {
            Some(new) => *new,
            None => {
                let new = self.retained.len() as u16;
                self.forward.insert(old, new);
                self.retained.push(old);
                new
            }
        };
        StringId::new(NUM_STANDARD_STRINGS + new)
    }

    /// Positions in the original string INDEX of the retained strings, in
    /// their new order.
    pub(crate) fn retained(&self) -> &[u16] {
        &self.retained
    }

    pub(crate) fn len(&self) -> usize {
        self.retained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(raw: u16) -> StringId {
        StringId::new(raw)
    }

    #[test]
    fn standard_strings_pass_through() {
        let mut remap = SidRemap::default();
        assert_eq!(remap.add(sid(0)), sid(0));
        assert_eq!(remap.add(sid(17)), sid(17));
        assert_eq!(remap.add(sid(390)), sid(390));
        assert_eq!(remap.len(), 0);
    }

    #[test]
    fn custom_strings_in_first_use_order() {
        let mut remap = SidRemap::default();
        assert_eq!(remap.add(sid(391)), sid(391));
        assert_eq!(remap.add(sid(500)), sid(392));
        assert_eq!(remap.add(sid(391)), sid(391));
        assert_eq!(remap.add(sid(450)), sid(393));
        assert_eq!(remap.add(sid(500)), sid(392));
        assert_eq!(remap.retained(), [0, 109, 59]);
        assert_eq!(remap.len(), 3);
    }
}
