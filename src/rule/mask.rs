use std::{collections::BTreeSet, fmt};

/// Where a permission string was read from
///
/// Audit logs use a few codes that have no profile equivalent (`c`, `d`, `a`),
/// profile text may carry exec qualifiers that must be kept as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDialect {
    Log,
    Profile,
}

const READ: u8 = 1;
const WRITE: u8 = 1 << 1;
const LINK: u8 = 1 << 2;
const LOCK: u8 = 1 << 3;
const EXEC: u8 = 1 << 4;
const MMAP: u8 = 1 << 5;
const INHERIT: u8 = 1 << 6;

const KNOWN: [(char, u8); 7] = [
    ('r', READ),
    ('w', WRITE),
    ('l', LINK),
    ('k', LOCK),
    ('x', EXEC),
    ('m', MMAP),
    ('i', INHERIT),
];

/// Exec qualifiers that replace the default `i` in front of `x`, in rendering order
const EXEC_QUALIFIERS: [char; 6] = ['P', 'p', 'C', 'c', 'U', 'u'];

/// Log-only codes and the permission they collapse to
const LOG_REMAP: [(char, char); 3] = [('c', 'w'), ('d', 'w'), ('a', 'w')];

/// Set of file permissions over `{r,w,l,k,x,m,i}` plus unknown passthrough characters
///
/// Construction normalizes the input once; afterwards the mask only grows
/// through [`PermissionMask::union`], which is plain set arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PermissionMask {
    bits: u8,
    other: BTreeSet<char>,
}

impl PermissionMask {
    pub fn parse(raw: &str, dialect: MaskDialect) -> Self {
        let mut mask = Self::default();
        for c in raw.chars().filter(|c| !matches!(c, '"' | '\'' | ',') && !c.is_whitespace()) {
            let c = match dialect {
                MaskDialect::Log => LOG_REMAP
                    .iter()
                    .find(|(from, _)| *from == c)
                    .map_or(c, |(_, to)| *to),
                MaskDialect::Profile => c,
            };
            match KNOWN.iter().find(|(k, _)| *k == c) {
                Some((_, bit)) => mask.bits |= bit,
                None => {
                    mask.other.insert(c);
                }
            }
        }
        mask.normalize_exec();
        mask
    }

    /// `x` without a qualifier implies `i`; `i` without `x` grants nothing
    fn normalize_exec(&mut self) {
        if !self.has(EXEC) {
            self.bits &= !INHERIT;
        } else if !EXEC_QUALIFIERS.iter().any(|q| self.other.contains(q)) {
            self.bits |= INHERIT;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0 && self.other.is_empty()
    }

    /// Whether the mask grants `c`, either as a known permission or a passthrough character
    pub fn contains(&self, c: char) -> bool {
        match KNOWN.iter().find(|(k, _)| *k == c) {
            Some((_, bit)) => self.bits & bit != 0,
            None => self.other.contains(&c),
        }
    }

    /// Character-set union; commutative and idempotent
    pub fn union(&mut self, other: &PermissionMask) {
        self.bits |= other.bits;
        self.other.extend(other.other.iter().copied());
    }

    fn has(&self, bit: u8) -> bool {
        self.bits & bit != 0
    }
}

impl fmt::Display for PermissionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (c, bit) in [('r', READ), ('w', WRITE), ('l', LINK), ('k', LOCK)] {
            if self.has(bit) {
                out.push(c);
            }
        }

        let exec = self.has(EXEC);
        if exec {
            let qualifiers: String = EXEC_QUALIFIERS
                .iter()
                .filter(|q| self.other.contains(q))
                .collect();
            out.push_str(&qualifiers);
            if self.has(INHERIT) {
                out.push('i');
            }
            out.push('x');
        }
        if self.has(MMAP) {
            out.push('m');
        }

        for c in &self.other {
            if exec && EXEC_QUALIFIERS.contains(c) {
                continue;
            }
            out.push(*c);
        }
        f.write_str(&out)
    }
}
