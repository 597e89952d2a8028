use core::fmt;
use core::str::FromStr;

use crate::{
    Error, VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_CLEANSTACK,
    VERIFY_CONST_SCRIPTCODE, VERIFY_DERSIG, VERIFY_DISCOURAGE_UPGRADABLE_NOPS,
    VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM, VERIFY_LOW_S, VERIFY_MINIMALDATA,
    VERIFY_MINIMALIF, VERIFY_NULLDUMMY, VERIFY_NULLFAIL, VERIFY_P2SH, VERIFY_SIGPUSHONLY,
    VERIFY_STRICTENC, VERIFY_WITNESS, VERIFY_WITNESS_PUBKEYTYPE,
};

/// Core's names for each verification flag, in bit order.
const FLAG_NAMES: &[(&str, u32)] = &[
    ("P2SH", VERIFY_P2SH),
    ("STRICTENC", VERIFY_STRICTENC),
    ("DERSIG", VERIFY_DERSIG),
    ("LOW_S", VERIFY_LOW_S),
    ("NULLDUMMY", VERIFY_NULLDUMMY),
    ("SIGPUSHONLY", VERIFY_SIGPUSHONLY),
    ("MINIMALDATA", VERIFY_MINIMALDATA),
    ("DISCOURAGE_UPGRADABLE_NOPS", VERIFY_DISCOURAGE_UPGRADABLE_NOPS),
    ("CLEANSTACK", VERIFY_CLEANSTACK),
    ("CHECKLOCKTIMEVERIFY", VERIFY_CHECKLOCKTIMEVERIFY),
    ("CHECKSEQUENCEVERIFY", VERIFY_CHECKSEQUENCEVERIFY),
    ("WITNESS", VERIFY_WITNESS),
    ("DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM", VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM),
    ("MINIMALIF", VERIFY_MINIMALIF),
    ("NULLFAIL", VERIFY_NULLFAIL),
    ("WITNESS_PUBKEYTYPE", VERIFY_WITNESS_PUBKEYTYPE),
    ("CONST_SCRIPTCODE", VERIFY_CONST_SCRIPTCODE),
];

const SUPPORTED_FLAGS: u32 = VERIFY_P2SH
    | VERIFY_STRICTENC
    | VERIFY_DERSIG
    | VERIFY_LOW_S
    | VERIFY_NULLDUMMY
    | VERIFY_SIGPUSHONLY
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS
    | VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM
    | VERIFY_MINIMALIF
    | VERIFY_NULLFAIL
    | VERIFY_WITNESS_PUBKEYTYPE
    | VERIFY_CONST_SCRIPTCODE;

/// Wrapper for script verification flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub const NONE: ScriptFlags = ScriptFlags(0);

    /// Validates raw flag bits. WITNESS implies P2SH.
    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        if bits & !SUPPORTED_FLAGS != 0 {
            return Err(Error::ERR_INVALID_FLAGS);
        }
        Ok(Self(Self::apply_implied_bits(bits)))
    }

    /// Parses Core's flag names, e.g. `["P2SH", "STRICTENC"]`.
    ///
    /// `NONE` and empty names contribute nothing.
    pub fn from_names<'a, I>(names: I) -> Result<Self, ParseFlagsError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut bits = 0;
        for name in names {
            let name = name.trim();
            if name.is_empty() || name == "NONE" {
                continue;
            }
            let (_, bit) = FLAG_NAMES
                .iter()
                .find(|(known, _)| *known == name)
                .ok_or_else(|| ParseFlagsError::UnknownFlag(name.to_owned()))?;
            bits |= bit;
        }
        Ok(Self(Self::apply_implied_bits(bits)))
    }

    /// Core names of the set flags, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `flags` is set.
    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    /// True when any bit of `flags` is set.
    pub fn intersects(self, flags: u32) -> bool {
        self.0 & flags != 0
    }

    fn apply_implied_bits(mut bits: u32) -> u32 {
        if bits & VERIFY_WITNESS != 0 {
            bits |= VERIFY_P2SH;
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFlagsError {
    #[error("unknown script verification flag `{0}`")]
    UnknownFlag(String),
}

impl FromStr for ScriptFlags {
    type Err = ParseFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_names(s.split(','))
    }
}

impl fmt::Display for ScriptFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ScriptFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ScriptFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = String::deserialize(deserializer)?;
        names.parse().map_err(serde::de::Error::custom)
    }
}
