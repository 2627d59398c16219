//! Width-tagged interval lattice over fixed-width integers.
//!
//! A `Crange` denotes a subset of the 2^w values of a w-bit integer as a
//! contiguous arc modulo 2^w: `[lo, hi]` inclusive, wrapping past zero when
//! `lo > hi`. The dedicated `Empty` and `Full` variants keep arcs honest
//! (an arc never denotes the empty or the full set). All transfer functions
//! are total and over-approximate: every concrete result of an operation on
//! members of the inputs is a member of the output.

use crate::instructions::{BinaryOp, CmpPredicate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crange {
    width: u16,
    kind: RangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum RangeKind {
    Empty,
    Full,
    Arc { lo: u128, hi: u128 },
}

fn mask(width: u16) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Crange {
    pub fn empty(width: u16) -> Self {
        Self {
            width,
            kind: RangeKind::Empty,
        }
    }

    pub fn full(width: u16) -> Self {
        Self {
            width,
            kind: RangeKind::Full,
        }
    }

    pub fn point(width: u16, value: u128) -> Self {
        let v = value & mask(width);
        Self {
            width,
            kind: RangeKind::Arc { lo: v, hi: v },
        }
    }

    /// Inclusive arc `[lo, hi]` modulo 2^width; wraps when `lo > hi`.
    /// Normalizes an all-covering arc to `Full`.
    pub fn arc(width: u16, lo: u128, hi: u128) -> Self {
        let m = mask(width);
        let lo = lo & m;
        let hi = hi & m;
        if hi.wrapping_sub(lo) & m == m {
            return Self::full(width);
        }
        Self {
            width,
            kind: RangeKind::Arc { lo, hi },
        }
    }

    /// Arc between two signed endpoints (`lo <= hi`), encoded at `width`.
    pub fn from_signed(width: u16, lo: i128, hi: i128) -> Self {
        debug_assert!(lo <= hi);
        Self::arc(width, lo as u128, hi as u128)
    }

    pub fn from_constant(c: &crate::values::Constant) -> Option<Self> {
        c.to_bits().map(|bits| Self::point(c.width(), bits))
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, RangeKind::Empty)
    }

    pub fn is_full(&self) -> bool {
        matches!(self.kind, RangeKind::Full)
    }

    pub fn is_point(&self) -> bool {
        matches!(self.kind, RangeKind::Arc { lo, hi } if lo == hi)
    }

    pub fn as_point(&self) -> Option<u128> {
        match self.kind {
            RangeKind::Arc { lo, hi } if lo == hi => Some(lo),
            _ => None,
        }
    }

    pub fn contains(&self, value: u128) -> bool {
        let v = value & mask(self.width);
        match self.kind {
            RangeKind::Empty => false,
            RangeKind::Full => true,
            RangeKind::Arc { lo, hi } => {
                if lo <= hi {
                    lo <= v && v <= hi
                } else {
                    v >= lo || v <= hi
                }
            }
        }
    }

    /// Number of values denoted. Only `Full` at width 128 does not fit in a
    /// `u128`, so that case is answered by `is_full` instead.
    fn arc_card(&self) -> Option<u128> {
        match self.kind {
            RangeKind::Arc { lo, hi } => {
                Some((hi.wrapping_sub(lo) & mask(self.width)) + 1)
            }
            _ => None,
        }
    }

    pub fn contains_range(&self, other: &Crange) -> bool {
        match (&self.kind, &other.kind) {
            (_, RangeKind::Empty) => true,
            (RangeKind::Full, _) => true,
            (RangeKind::Empty, _) => false,
            (_, RangeKind::Full) => false,
            (
                RangeKind::Arc { lo: alo, hi: ahi },
                RangeKind::Arc { lo: blo, hi: bhi },
            ) => {
                let m = mask(self.width);
                let a_len = ahi.wrapping_sub(*alo) & m;
                let b_lo_off = blo.wrapping_sub(*alo) & m;
                let b_hi_off = bhi.wrapping_sub(*alo) & m;
                b_lo_off <= b_hi_off && b_hi_off <= a_len
            }
        }
    }

    /// Smallest sound hull of the two sets (join).
    pub fn union(&self, other: &Crange) -> Crange {
        debug_assert_eq!(self.width, other.width);
        let w = self.width;
        match (&self.kind, &other.kind) {
            (RangeKind::Empty, _) => other.clone(),
            (_, RangeKind::Empty) => self.clone(),
            (RangeKind::Full, _) | (_, RangeKind::Full) => Crange::full(w),
            (
                RangeKind::Arc { lo: alo, hi: ahi },
                RangeKind::Arc { lo: blo, hi: bhi },
            ) => {
                if self.contains_range(other) {
                    return self.clone();
                }
                if other.contains_range(self) {
                    return other.clone();
                }
                let mut best: Option<Crange> = None;
                for (lo, hi) in [(*alo, *bhi), (*blo, *ahi)] {
                    let candidate = Crange::arc(w, lo, hi);
                    if candidate.contains_range(self) && candidate.contains_range(other) {
                        let better = match (&best, candidate.arc_card()) {
                            (None, _) => true,
                            (Some(b), Some(c)) => {
                                b.arc_card().map_or(true, |bc| c < bc)
                            }
                            (Some(_), None) => false,
                        };
                        if better {
                            best = Some(candidate);
                        }
                    }
                }
                best.unwrap_or_else(|| Crange::full(w))
            }
        }
    }

    /// Sound over-approximation of the intersection (meet). Exact whenever
    /// the true intersection is a single arc.
    pub fn intersect(&self, other: &Crange) -> Crange {
        debug_assert_eq!(self.width, other.width);
        let w = self.width;
        match (&self.kind, &other.kind) {
            (RangeKind::Empty, _) | (_, RangeKind::Empty) => Crange::empty(w),
            (RangeKind::Full, _) => other.clone(),
            (_, RangeKind::Full) => self.clone(),
            (RangeKind::Arc { .. }, RangeKind::Arc { .. }) => {
                let mut result = Crange::empty(w);
                for (al, ah) in self.segments() {
                    for (bl, bh) in other.segments() {
                        let lo = al.max(bl);
                        let hi = ah.min(bh);
                        if lo <= hi {
                            result = result.union(&Crange::arc(w, lo, hi));
                        }
                    }
                }
                result
            }
        }
    }

    /// Set complement.
    pub fn inverse(&self) -> Crange {
        let w = self.width;
        let m = mask(w);
        match self.kind {
            RangeKind::Empty => Crange::full(w),
            RangeKind::Full => Crange::empty(w),
            RangeKind::Arc { lo, hi } => {
                Crange::arc(w, hi.wrapping_add(1) & m, lo.wrapping_sub(1) & m)
            }
        }
    }

    /// Non-wrapping unsigned segments covering the arc, for piecewise math.
    fn segments(&self) -> Vec<(u128, u128)> {
        let m = mask(self.width);
        match self.kind {
            RangeKind::Empty => vec![],
            RangeKind::Full => vec![(0, m)],
            RangeKind::Arc { lo, hi } => {
                if lo <= hi {
                    vec![(lo, hi)]
                } else {
                    vec![(lo, m), (0, hi)]
                }
            }
        }
    }

    /// `(min, max)` under the unsigned interpretation.
    pub fn unsigned_bounds(&self) -> Option<(u128, u128)> {
        let m = mask(self.width);
        match self.kind {
            RangeKind::Empty => None,
            RangeKind::Full => Some((0, m)),
            RangeKind::Arc { lo, hi } => {
                if lo <= hi {
                    Some((lo, hi))
                } else {
                    Some((0, m))
                }
            }
        }
    }

    pub fn unsigned_max(&self) -> Option<u128> {
        self.unsigned_bounds().map(|(_, hi)| hi)
    }

    fn to_signed(&self, value: u128) -> i128 {
        let w = self.width;
        if w >= 128 {
            value as i128
        } else {
            let half = 1u128 << (w - 1);
            if value >= half {
                value as i128 - (1i128 << w)
            } else {
                value as i128
            }
        }
    }

    fn signed_limits(width: u16) -> (i128, i128) {
        if width >= 128 {
            (i128::MIN, i128::MAX)
        } else {
            let half = 1i128 << (width - 1);
            (-half, half - 1)
        }
    }

    /// `(min, max)` under the signed interpretation; a hull when the arc
    /// straddles the signed discontinuity.
    pub fn signed_bounds(&self) -> Option<(i128, i128)> {
        let w = self.width;
        let (smin, smax) = Self::signed_limits(w);
        match self.kind {
            RangeKind::Empty => None,
            RangeKind::Full => Some((smin, smax)),
            RangeKind::Arc { lo, hi } => {
                let smax_u = mask(w) >> 1;
                let smin_u = smax_u.wrapping_add(1) & mask(w);
                if w > 1 && self.contains(smax_u) && self.contains(smin_u) && lo != hi {
                    Some((smin, smax))
                } else {
                    Some((self.to_signed(lo), self.to_signed(hi)))
                }
            }
        }
    }

    fn encode_signed(width: u16, value: i128) -> u128 {
        (value as u128) & mask(width)
    }

    // ---- casts -----------------------------------------------------------

    pub fn zero_extend(&self, new_width: u16) -> Crange {
        debug_assert!(new_width >= self.width);
        match self.kind {
            RangeKind::Empty => Crange::empty(new_width),
            RangeKind::Full => Crange::arc(new_width, 0, mask(self.width)),
            RangeKind::Arc { lo, hi } => {
                if lo <= hi {
                    Crange::arc(new_width, lo, hi)
                } else {
                    // The wrapped arc is no longer contiguous after widening.
                    Crange::arc(new_width, 0, mask(self.width))
                }
            }
        }
    }

    pub fn sign_extend(&self, new_width: u16) -> Crange {
        debug_assert!(new_width >= self.width);
        match self.signed_bounds() {
            None => Crange::empty(new_width),
            Some((lo, hi)) => Crange::arc(
                new_width,
                Self::encode_signed(new_width, lo),
                Self::encode_signed(new_width, hi),
            ),
        }
    }

    pub fn truncate(&self, new_width: u16) -> Crange {
        debug_assert!(new_width <= self.width);
        match self.kind {
            RangeKind::Empty => Crange::empty(new_width),
            RangeKind::Full => Crange::full(new_width),
            RangeKind::Arc { lo, hi } => {
                // Reduction modulo 2^w' keeps a short enough arc contiguous.
                match self.arc_card() {
                    Some(card) if card <= mask(new_width) => {
                        Crange::arc(new_width, lo & mask(new_width), hi & mask(new_width))
                    }
                    _ => Crange::full(new_width),
                }
            }
        }
    }

    pub fn zext_or_trunc(&self, new_width: u16) -> Crange {
        use std::cmp::Ordering;
        match new_width.cmp(&self.width) {
            Ordering::Greater => self.zero_extend(new_width),
            Ordering::Less => self.truncate(new_width),
            Ordering::Equal => self.clone(),
        }
    }

    // ---- arithmetic ------------------------------------------------------

    pub fn add(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        let m = mask(w);
        match (a.arc_card(), b.arc_card()) {
            (Some(ca), Some(cb)) => {
                if ca - 1 > m - (cb - 1) {
                    return Crange::full(w);
                }
                let (alo, ahi) = a.arc_endpoints();
                let (blo, bhi) = b.arc_endpoints();
                Crange::arc(w, alo.wrapping_add(blo), ahi.wrapping_add(bhi))
            }
            _ => {
                if a.is_empty() || b.is_empty() {
                    Crange::empty(w)
                } else {
                    Crange::full(w)
                }
            }
        }
    }

    pub fn sub(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        let m = mask(w);
        match (a.arc_card(), b.arc_card()) {
            (Some(ca), Some(cb)) => {
                if ca - 1 > m - (cb - 1) {
                    return Crange::full(w);
                }
                let (alo, ahi) = a.arc_endpoints();
                let (blo, bhi) = b.arc_endpoints();
                Crange::arc(w, alo.wrapping_sub(bhi), ahi.wrapping_sub(blo))
            }
            _ => {
                if a.is_empty() || b.is_empty() {
                    Crange::empty(w)
                } else {
                    Crange::full(w)
                }
            }
        }
    }

    pub fn mul(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        let m = mask(w);
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (bl, bh) = b.unsigned_bounds().expect("non-empty");
        if let Some(p) = ah.checked_mul(bh) {
            if p <= m {
                return Crange::arc(w, al.wrapping_mul(bl), p);
            }
        }
        // Unsigned view overflows; a signed product may still fit.
        let (sal, sah) = a.signed_bounds().expect("non-empty");
        let (sbl, sbh) = b.signed_bounds().expect("non-empty");
        let (smin, smax) = Self::signed_limits(w);
        let mut min_p = i128::MAX;
        let mut max_p = i128::MIN;
        for x in [sal, sah] {
            for y in [sbl, sbh] {
                match x.checked_mul(y) {
                    Some(p) if p >= smin && p <= smax => {
                        min_p = min_p.min(p);
                        max_p = max_p.max(p);
                    }
                    _ => return Crange::full(w),
                }
            }
        }
        Crange::from_signed(w, min_p, max_p)
    }

    pub fn udiv(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (bl, bh) = b.unsigned_bounds().expect("non-empty");
        if bh == 0 {
            return Crange::empty(w);
        }
        Crange::arc(w, al / bh, ah / bl.max(1))
    }

    pub fn sdiv(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (nl, nh) = a.signed_bounds().expect("non-empty");
        let (dl, dh) = b.signed_bounds().expect("non-empty");
        if dl <= 0 && dh >= 0 {
            if dl == 0 && dh == 0 {
                return Crange::empty(w);
            }
            return Crange::full(w);
        }
        let (smin, smax) = Self::signed_limits(w);
        let mut min_q = i128::MAX;
        let mut max_q = i128::MIN;
        for x in [nl, nh] {
            for y in [dl, dh] {
                if x == smin && y == -1 {
                    return Crange::full(w);
                }
                let q = x / y;
                min_q = min_q.min(q);
                max_q = max_q.max(q);
            }
        }
        Crange::from_signed(w, min_q, max_q)
    }

    pub fn urem(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (bl, bh) = b.unsigned_bounds().expect("non-empty");
        if bh == 0 {
            return Crange::empty(w);
        }
        if ah < bl {
            // Remainder can never reduce the dividend.
            return Crange::arc(w, al, ah);
        }
        Crange::arc(w, 0, ah.min(bh - 1))
    }

    pub fn srem(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (nl, nh) = a.signed_bounds().expect("non-empty");
        let (dl, dh) = b.signed_bounds().expect("non-empty");
        let m_abs = dl.unsigned_abs().max(dh.unsigned_abs());
        if m_abs == 0 {
            return Crange::empty(w);
        }
        let bound = (m_abs - 1).min(i128::MAX as u128) as i128;
        let lo = if nl < 0 { nl.max(-bound) } else { 0 };
        let hi = if nh > 0 { nh.min(bound) } else { 0 };
        Crange::from_signed(w, lo, hi)
    }

    pub fn shl(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        let m = mask(w);
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (sl, sh) = b.unsigned_bounds().expect("non-empty");
        if sh >= u128::from(w) || ah > m >> (sh as u32) {
            return Crange::full(w);
        }
        Crange::arc(w, al << (sl as u32), ah << (sh as u32))
    }

    pub fn lshr(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (sl, sh) = b.unsigned_bounds().expect("non-empty");
        let sl = sl.min(127) as u32;
        let sh = sh.min(127) as u32;
        Crange::arc(w, al >> sh, ah >> sl)
    }

    pub fn ashr(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (nl, nh) = a.signed_bounds().expect("non-empty");
        let (sl, sh) = b.unsigned_bounds().expect("non-empty");
        let sl = sl.min(127) as u32;
        let sh = sh.min(127) as u32;
        let corners = [nl >> sl, nl >> sh, nh >> sl, nh >> sh];
        let min_r = *corners.iter().min().expect("non-empty corners");
        let max_r = *corners.iter().max().expect("non-empty corners");
        Crange::from_signed(w, min_r, max_r)
    }

    pub fn bit_and(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (_, ah) = a.unsigned_bounds().expect("non-empty");
        let (_, bh) = b.unsigned_bounds().expect("non-empty");
        Crange::arc(w, 0, ah.min(bh))
    }

    pub fn bit_or(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (al, ah) = a.unsigned_bounds().expect("non-empty");
        let (bl, bh) = b.unsigned_bounds().expect("non-empty");
        Crange::arc(w, al.max(bl), ones_hull(ah | bh))
    }

    pub fn bit_xor(&self, other: &Crange) -> Crange {
        let (a, b) = promote(self, other);
        let w = a.width;
        if a.is_empty() || b.is_empty() {
            return Crange::empty(w);
        }
        let (_, ah) = a.unsigned_bounds().expect("non-empty");
        let (_, bh) = b.unsigned_bounds().expect("non-empty");
        Crange::arc(w, 0, ones_hull(ah | bh))
    }

    fn arc_endpoints(&self) -> (u128, u128) {
        match self.kind {
            RangeKind::Arc { lo, hi } => (lo, hi),
            _ => unreachable!("arc_endpoints on non-arc"),
        }
    }

    /// The set of values `x` for which `x pred y` can hold for some
    /// `y` in `other` (allowed-region semantics).
    pub fn cmp_region(pred: CmpPredicate, other: &Crange) -> Crange {
        let w = other.width;
        let m = mask(w);
        if other.is_empty() {
            return Crange::empty(w);
        }
        let (ul, uh) = other.unsigned_bounds().expect("non-empty");
        let (sl, sh) = other.signed_bounds().expect("non-empty");
        let (smin, smax) = Self::signed_limits(w);
        match pred {
            CmpPredicate::Eq => other.clone(),
            CmpPredicate::Ne => match other.as_point() {
                Some(_) => other.inverse(),
                None => Crange::full(w),
            },
            CmpPredicate::Ult => {
                if uh == 0 {
                    Crange::empty(w)
                } else {
                    Crange::arc(w, 0, uh - 1)
                }
            }
            CmpPredicate::Ule => Crange::arc(w, 0, uh),
            CmpPredicate::Ugt => {
                if ul == m {
                    Crange::empty(w)
                } else {
                    Crange::arc(w, ul + 1, m)
                }
            }
            CmpPredicate::Uge => Crange::arc(w, ul, m),
            CmpPredicate::Slt => {
                if sh == smin {
                    Crange::empty(w)
                } else {
                    Crange::from_signed(w, smin, sh - 1)
                }
            }
            CmpPredicate::Sle => Crange::from_signed(w, smin, sh),
            CmpPredicate::Sgt => {
                if sl == smax {
                    Crange::empty(w)
                } else {
                    Crange::from_signed(w, sl + 1, smax)
                }
            }
            CmpPredicate::Sge => Crange::from_signed(w, sl, smax),
        }
    }
}

/// Promote both operands to their common (maximum) width.
fn promote(lhs: &Crange, rhs: &Crange) -> (Crange, Crange) {
    let target = lhs.width.max(rhs.width);
    (lhs.zext_or_trunc(target), rhs.zext_or_trunc(target))
}

/// Smallest `2^k - 1` covering `x`: the tightest all-ones bound for
/// bitwise-or results.
fn ones_hull(x: u128) -> u128 {
    if x == 0 {
        0
    } else {
        let bits = 128 - x.leading_zeros();
        if bits >= 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        }
    }
}

/// Dispatch table for the range engine's `Binary` transfer.
pub fn apply_binary(op: BinaryOp, lhs: &Crange, rhs: &Crange) -> Crange {
    match op {
        BinaryOp::Add => lhs.add(rhs),
        BinaryOp::Sub => lhs.sub(rhs),
        BinaryOp::Mul => lhs.mul(rhs),
        BinaryOp::UDiv => lhs.udiv(rhs),
        BinaryOp::SDiv => lhs.sdiv(rhs),
        BinaryOp::URem => lhs.urem(rhs),
        BinaryOp::SRem => lhs.srem(rhs),
        BinaryOp::Shl => lhs.shl(rhs),
        BinaryOp::LShr => lhs.lshr(rhs),
        BinaryOp::AShr => lhs.ashr(rhs),
        BinaryOp::And => lhs.bit_and(rhs),
        BinaryOp::Or => lhs.bit_or(rhs),
        BinaryOp::Xor => lhs.bit_xor(rhs),
    }
}

impl fmt::Display for Crange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RangeKind::Empty => write!(f, "i{} empty", self.width),
            RangeKind::Full => write!(f, "i{} full", self.width),
            RangeKind::Arc { lo, hi } if lo == hi => write!(f, "i{} {{{}}}", self.width, lo),
            RangeKind::Arc { lo, hi } => write!(f, "i{} [{}, {}]", self.width, lo, hi),
        }
    }
}
