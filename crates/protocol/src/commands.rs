//! pigpio command codes and their classification
//!
//! The daemon protocol carries no length field or type tag for the fourth
//! header word. How `p3` is interpreted depends entirely on which command the
//! frame belongs to, so the classification below is part of the wire format:
//!
//! - **never fails**: `p3` is always an unsigned result, even when the top bit
//!   is set (tick counters, hardware revisions)
//! - **extended request**: `p3` is the number of extension bytes following the
//!   request header
//! - **extended response**: a positive `p3` is the number of extension bytes
//!   following the response header

pub const MODES: u32 = 0;
pub const MODEG: u32 = 1;
pub const PUD: u32 = 2;
pub const READ: u32 = 3;
pub const WRITE: u32 = 4;
pub const PWM: u32 = 5;
pub const PRS: u32 = 6;
pub const PFS: u32 = 7;
pub const SERVO: u32 = 8;
pub const WDOG: u32 = 9;
pub const BR1: u32 = 10;
pub const BR2: u32 = 11;
pub const BC1: u32 = 12;
pub const BC2: u32 = 13;
pub const BS1: u32 = 14;
pub const BS2: u32 = 15;
pub const TICK: u32 = 16;
pub const HWVER: u32 = 17;
pub const NO: u32 = 18;
pub const NB: u32 = 19;
pub const NP: u32 = 20;
pub const NC: u32 = 21;
pub const PRG: u32 = 22;
pub const PFG: u32 = 23;
pub const PRRG: u32 = 24;
pub const HELP: u32 = 25;
pub const PIGPV: u32 = 26;
pub const WVCLR: u32 = 27;
pub const WVAG: u32 = 28;
pub const WVAS: u32 = 29;
pub const WVGO: u32 = 30;
pub const WVGOR: u32 = 31;
pub const WVBSY: u32 = 32;
pub const WVHLT: u32 = 33;
pub const WVSM: u32 = 34;
pub const WVSP: u32 = 35;
pub const WVSC: u32 = 36;
pub const TRIG: u32 = 37;
pub const PROC: u32 = 38;
pub const PROCD: u32 = 39;
pub const PROCR: u32 = 40;
pub const PROCS: u32 = 41;
pub const SLRO: u32 = 42;
pub const SLR: u32 = 43;
pub const SLRC: u32 = 44;
pub const PROCP: u32 = 45;
pub const MICS: u32 = 46;
pub const MILS: u32 = 47;
pub const PARSE: u32 = 48;
pub const WVCRE: u32 = 49;
pub const WVDEL: u32 = 50;
pub const WVTX: u32 = 51;
pub const WVTXR: u32 = 52;
pub const WVNEW: u32 = 53;
pub const I2CO: u32 = 54;
pub const I2CC: u32 = 55;
pub const I2CRD: u32 = 56;
pub const I2CWD: u32 = 57;
pub const I2CWQ: u32 = 58;
pub const I2CRS: u32 = 59;
pub const I2CWS: u32 = 60;
pub const I2CRB: u32 = 61;
pub const I2CWB: u32 = 62;
pub const I2CRW: u32 = 63;
pub const I2CWW: u32 = 64;
pub const I2CRK: u32 = 65;
pub const I2CWK: u32 = 66;
pub const I2CRI: u32 = 67;
pub const I2CWI: u32 = 68;
pub const I2CPC: u32 = 69;
pub const I2CPK: u32 = 70;
pub const SPIO: u32 = 71;
pub const SPIC: u32 = 72;
pub const SPIR: u32 = 73;
pub const SPIW: u32 = 74;
pub const SPIX: u32 = 75;
pub const SERO: u32 = 76;
pub const SERC: u32 = 77;
pub const SERRB: u32 = 78;
pub const SERWB: u32 = 79;
pub const SERR: u32 = 80;
pub const SERW: u32 = 81;
pub const SERDA: u32 = 82;
pub const GDC: u32 = 83;
pub const GPW: u32 = 84;
pub const HC: u32 = 85;
pub const HP: u32 = 86;
pub const CF1: u32 = 87;
pub const CF2: u32 = 88;
pub const BI2CC: u32 = 89;
pub const BI2CO: u32 = 90;
pub const BI2CZ: u32 = 91;
pub const I2CZ: u32 = 92;
pub const WVCHA: u32 = 93;
pub const SLRI: u32 = 94;
pub const CGI: u32 = 95;
pub const CSI: u32 = 96;
pub const FG: u32 = 97;
pub const FN: u32 = 98;
pub const NOIB: u32 = 99;
pub const WVTXM: u32 = 100;
pub const WVTAT: u32 = 101;
pub const PADS: u32 = 102;
pub const PADG: u32 = 103;
pub const FO: u32 = 104;
pub const FC: u32 = 105;
pub const FR: u32 = 106;
pub const FW: u32 = 107;
pub const FS: u32 = 108;
pub const FL: u32 = 109;
pub const SHELL: u32 = 110;
pub const BSPIC: u32 = 111;
pub const BSPIO: u32 = 112;
pub const BSPIX: u32 = 113;
pub const BSCX: u32 = 114;
pub const EVM: u32 = 115;
pub const EVT: u32 = 116;
pub const PROCU: u32 = 117;
pub const WVCAP: u32 = 118;

/// Name/code table, indexed by command code.
const COMMAND_NAMES: [&str; 119] = [
    "MODES", "MODEG", "PUD", "READ", "WRITE", "PWM", "PRS", "PFS", "SERVO", "WDOG", "BR1", "BR2",
    "BC1", "BC2", "BS1", "BS2", "TICK", "HWVER", "NO", "NB", "NP", "NC", "PRG", "PFG", "PRRG",
    "HELP", "PIGPV", "WVCLR", "WVAG", "WVAS", "WVGO", "WVGOR", "WVBSY", "WVHLT", "WVSM", "WVSP",
    "WVSC", "TRIG", "PROC", "PROCD", "PROCR", "PROCS", "SLRO", "SLR", "SLRC", "PROCP", "MICS",
    "MILS", "PARSE", "WVCRE", "WVDEL", "WVTX", "WVTXR", "WVNEW", "I2CO", "I2CC", "I2CRD",
    "I2CWD", "I2CWQ", "I2CRS", "I2CWS", "I2CRB", "I2CWB", "I2CRW", "I2CWW", "I2CRK", "I2CWK",
    "I2CRI", "I2CWI", "I2CPC", "I2CPK", "SPIO", "SPIC", "SPIR", "SPIW", "SPIX", "SERO", "SERC",
    "SERRB", "SERWB", "SERR", "SERW", "SERDA", "GDC", "GPW", "HC", "HP", "CF1", "CF2", "BI2CC",
    "BI2CO", "BI2CZ", "I2CZ", "WVCHA", "SLRI", "CGI", "CSI", "FG", "FN", "NOIB", "WVTXM",
    "WVTAT", "PADS", "PADG", "FO", "FC", "FR", "FW", "FS", "FL", "SHELL", "BSPIC", "BSPIO",
    "BSPIX", "BSCX", "EVM", "EVT", "PROCU", "WVCAP",
];

/// Human readable name of a command code, if the code is known
pub fn command_name(command: u32) -> Option<&'static str> {
    COMMAND_NAMES.get(command as usize).copied()
}

/// Commands whose result word is always an unsigned value
pub fn can_never_fail(command: u32) -> bool {
    matches!(command, BR1 | BR2 | TICK | HWVER | PIGPV)
}

/// Commands whose request carries `p3` extension bytes after the header
pub fn has_extended_request(command: u32) -> bool {
    matches!(
        command,
        WVAG | WVAS
            | TRIG
            | PROC
            | PROCR
            | SLRO
            | I2CO
            | I2CWD
            | I2CWB
            | I2CWW
            | I2CWK
            | I2CRI
            | I2CWI
            | I2CPC
            | I2CPK
            | SPIO
            | SPIW
            | SPIX
            | SERO
            | SERW
            | HP
            | CF2
            | BI2CO
            | BI2CZ
            | I2CZ
            | WVCHA
            | FO
            | FW
            | FS
            | FL
            | SHELL
            | BSPIO
            | BSPIX
            | BSCX
            | PROCU
    )
}

/// Commands whose positive result is the length of a trailing payload
pub fn has_extended_response(command: u32) -> bool {
    matches!(
        command,
        I2CRD
            | I2CRK
            | I2CRI
            | I2CPK
            | SLR
            | PROCP
            | SPIR
            | SPIX
            | SERR
            | CF2
            | BI2CZ
            | I2CZ
            | FR
            | FL
            | BSPIX
            | BSCX
    )
}
