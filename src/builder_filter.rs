//! C5: per-fill builder classification, lifecycle grouping, and taint
//! detection (spec §4.5).

use crate::address::Address;
use crate::models::RawFill;

/// A contiguous run of fills between a position's departure from, and
/// return to, zero net size (spec §3 "Lifecycles").
pub struct Lifecycle<'a> {
    pub fills: Vec<&'a RawFill>,
    pub tainted: bool,
}

pub struct BuilderFilter {
    target_builder: Option<Address>,
}

impl BuilderFilter {
    pub fn new(target_builder: Option<Address>) -> Self {
        Self { target_builder }
    }

    pub fn builder_of(fill: &RawFill) -> Option<&str> {
        fill.builder_address()
    }

    /// `true` iff a target builder is configured AND either the fill's
    /// reported builder address matches it, or the builder is absent but
    /// `builderFee > 0` (spec §4.5; the latter rule is the preserved open
    /// question from spec §9 — it taints on fee alone, even paid to a
    /// different builder).
    pub fn is_builder_fill(&self, fill: &RawFill) -> bool {
        let Some(target) = &self.target_builder else {
            return false;
        };
        match Self::builder_of(fill) {
            Some(addr) => addr.eq_ignore_ascii_case(target.as_str()),
            None => fill.builder_fee.is_some_and(|fee| fee > 0.0),
        }
    }

    /// `[]` when no target builder is configured; else every fill
    /// attributed to it.
    pub fn filter_builder<'a>(&self, fills: &'a [RawFill]) -> Vec<&'a RawFill> {
        if self.target_builder.is_none() {
            return Vec::new();
        }
        fills.iter().filter(|f| self.is_builder_fill(f)).collect()
    }

    /// Sorts coin-matching fills by time, then walks them maintaining a
    /// signed running net size, splitting into lifecycles at every
    /// `0 -> non-zero` open and `-> 0` close. A trailing, still-open
    /// lifecycle is emitted too.
    pub fn group_by_lifecycle<'a>(&self, fills: &'a [RawFill], coin: &str) -> Vec<Lifecycle<'a>> {
        let mut matching: Vec<&RawFill> = fills
            .iter()
            .filter(|f| f.coin.eq_ignore_ascii_case(coin))
            .collect();
        matching.sort_by_key(|f| f.time);

        let mut lifecycles = Vec::new();
        let mut current: Vec<&RawFill> = Vec::new();
        let mut net_size = 0.0_f64;

        for fill in matching {
            let was_flat = net_size == 0.0;
            net_size += fill.signed_size();
            current.push(fill);

            if was_flat {
                // A fresh cycle begins exactly on this fill.
            }
            if net_size == 0.0 {
                lifecycles.push(self.close_lifecycle(std::mem::take(&mut current)));
            }
        }

        if !current.is_empty() {
            lifecycles.push(self.close_lifecycle(current));
        }

        lifecycles
    }

    fn close_lifecycle<'a>(&self, fills: Vec<&'a RawFill>) -> Lifecycle<'a> {
        let tainted = self.detect_taint(&fills);
        Lifecycle { fills, tainted }
    }

    /// `hasBuilder && hasNonBuilder` after a single pass with early exit
    /// once both flags are set (spec §4.5).
    pub fn detect_taint(&self, fills: &[&RawFill]) -> bool {
        let mut has_builder = false;
        let mut has_non_builder = false;
        for fill in fills {
            if self.is_builder_fill(fill) {
                has_builder = true;
            } else {
                has_non_builder = true;
            }
            if has_builder && has_non_builder {
                return true;
            }
        }
        false
    }

    pub fn any_lifecycle_tainted(&self, fills: &[RawFill], coin: &str) -> bool {
        self.group_by_lifecycle(fills, coin)
            .iter()
            .any(|l| l.tainted)
    }
}
