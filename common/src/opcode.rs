use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Major opcode, bits 11..9 of the instruction word.
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq)]
pub enum Opcode {
    And = 0,
    Tad,
    Isz,
    Dca,
    Jms,
    Jmp,
    Iot,
    Opr,
}

impl Opcode {
    pub const NUM_BITS: u16 = 3;
    pub const SHIFT: u16 = 9;

    pub fn from_word(word: u16) -> Opcode {
        // Total: the top 3 bits of a 12-bit word always name an opcode.
        Opcode::from_u16((word >> Self::SHIFT) & ((1 << Self::NUM_BITS) - 1)).unwrap()
    }

    /// Encoding base for the memory-reference opcodes.
    pub fn base(self) -> u16 {
        (self as u16) << Self::SHIFT
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::And => "AND",
            Opcode::Tad => "TAD",
            Opcode::Isz => "ISZ",
            Opcode::Dca => "DCA",
            Opcode::Jms => "JMS",
            Opcode::Jmp => "JMP",
            Opcode::Iot => "IOT",
            Opcode::Opr => "OPR",
        }
    }

    pub fn from_mem_ref_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Some(match mnemonic {
            "AND" => Opcode::And,
            "TAD" => Opcode::Tad,
            "ISZ" => Opcode::Isz,
            "DCA" => Opcode::Dca,
            "JMS" => Opcode::Jms,
            "JMP" => Opcode::Jmp,
            _ => return None,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Memory-reference instruction fields.

pub const INDIRECT_BIT: u16 = 0o400;
pub const PAGE_BIT: u16 = 0o200;

////////////////////////////////////////////////////////////////////////////////
// Operate microinstruction bits. Group 1 has bit 8 clear; group 2 has bit 8
// set and bit 3 clear; group 3 has bits 8 and 3 set (wrapped into the group-1
// mnemonic table below since the encodings don't collide).

pub const OPR_GROUP1_BASE: u16 = 0o7000;
pub const OPR_GROUP2_BASE: u16 = 0o7400;

pub mod group1 {
    pub const CLA: u16 = 0o0200;
    pub const CLL: u16 = 0o0100;
    pub const CMA: u16 = 0o0040;
    pub const CML: u16 = 0o0020;
    pub const RAR: u16 = 0o0010;
    pub const RAL: u16 = 0o0004;
    pub const BSW: u16 = 0o0002;
    pub const IAC: u16 = 0o0001;
}

pub mod group2 {
    pub const CLA: u16 = 0o0200;
    pub const SMA: u16 = 0o0100;
    pub const SZA: u16 = 0o0040;
    pub const SNL: u16 = 0o0020;
    // Carried by the SNA/SPA/SZL aliases; not a skip condition.
    pub const ALIAS: u16 = 0o0010;
    pub const OSR: u16 = 0o0004;
    pub const HLT: u16 = 0o0002;
}

pub mod group3 {
    pub const CLA: u16 = 0o0200;
    pub const MQA: u16 = 0o0100;
    pub const MQL: u16 = 0o0020;
}

/// Selects group 3 when set together with bit 8.
pub const GROUP3_BIT: u16 = 0o0010;

/// Group-1 mnemonics, as bit contributions over `OPR_GROUP1_BASE`.
pub fn group1_bits(mnemonic: &str) -> Option<u16> {
    Some(match mnemonic {
        "NOP" => 0,
        "CLA" => group1::CLA,
        "CLL" => group1::CLL,
        "CMA" => group1::CMA,
        "CML" => group1::CML,
        "RAR" => group1::RAR,
        "RAL" => group1::RAL,
        "BSW" => group1::BSW,
        "IAC" => group1::IAC,
        _ => return None,
    })
}

/// Group-2 mnemonics, as bit contributions over `OPR_GROUP2_BASE`. SNA, SPA,
/// and SZL are assembler-only aliases; the emulator decode uses the base bits.
pub fn group2_bits(mnemonic: &str) -> Option<u16> {
    use group2::*;
    Some(match mnemonic {
        "SMA" => SMA,
        "SZA" => SZA,
        "SNL" => SNL,
        "SNA" => SZA | ALIAS,
        "SPA" => SMA | ALIAS,
        "SZL" => SNL | ALIAS,
        "CLA" => CLA,
        "OSR" => OSR,
        "HLT" => HLT,
        _ => return None,
    })
}

/// True for mnemonics that force group-2 classification. CLA appears in both
/// groups and decides nothing on its own.
pub fn is_group2_only(mnemonic: &str) -> bool {
    mnemonic != "CLA" && group2_bits(mnemonic).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_bits() {
        assert_eq!(Opcode::from_word(0o0000), Opcode::And);
        assert_eq!(Opcode::from_word(0o1203), Opcode::Tad);
        assert_eq!(Opcode::from_word(0o5777), Opcode::Jmp);
        assert_eq!(Opcode::from_word(0o6046), Opcode::Iot);
        assert_eq!(Opcode::from_word(0o7300), Opcode::Opr);
    }

    #[test]
    fn group_tables() {
        assert_eq!(OPR_GROUP1_BASE | group1_bits("CLA").unwrap(), 0o7200);
        assert_eq!(
            OPR_GROUP1_BASE | group1_bits("CLA").unwrap() | group1_bits("CLL").unwrap(),
            0o7300
        );
        assert_eq!(OPR_GROUP2_BASE | group2_bits("SZA").unwrap(), 0o7440);
        assert_eq!(OPR_GROUP2_BASE | group2_bits("SNA").unwrap(), 0o7450);
        assert_eq!(OPR_GROUP2_BASE | group2_bits("SPA").unwrap(), 0o7510);
    }

    #[test]
    fn group2_detection() {
        assert!(is_group2_only("SMA"));
        assert!(is_group2_only("HLT"));
        assert!(!is_group2_only("CLA"));
        assert!(!is_group2_only("RAR"));
    }
}
