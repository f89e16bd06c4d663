//! Fixed PAR v1.0 volume header
//!
//! 96 bytes, little-endian throughout:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 8    | magic `"PAR\0\0\0\0\0"` |
//! | 0x08   | 4    | version |
//! | 0x0C   | 4    | client id |
//! | 0x10   | 16   | control hash (MD5 of bytes 0x20..EOF) |
//! | 0x20   | 16   | set hash |
//! | 0x30   | 8    | volume number (0 = index) |
//! | 0x38   | 8    | number of files |
//! | 0x40   | 8    | file list offset |
//! | 0x48   | 8    | file list size |
//! | 0x50   | 8    | data offset |
//! | 0x58   | 8    | data size |

use binrw::{BinRead, BinWrite};

/// The 8-byte v1.0 magic
pub const PAR_MAGIC: &[u8; 8] = b"PAR\0\0\0\0\0";

/// Size of the fixed header
pub const FIXED_HEADER_SIZE: u64 = 0x60;

/// Version written into new archives
pub const VERSION_1_0: u32 = 0x0001_0000;

/// Highest version this implementation reads (any 1.x)
pub const VERSION_MAX: u32 = 0x0001_FFFF;

/// Client id stamped into emitted archives (informational)
pub const CLIENT_ID: u32 = 0x0200_0900;

/// Where the control hash lives in the header
pub const CONTROL_HASH_OFFSET: u64 = 0x10;

/// First byte covered by the control hash
pub const CONTROL_REGION_START: u64 = 0x20;

#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(little, magic = b"PAR\0\0\0\0\0")]
pub struct VolumeHeader {
    pub version: u32,
    pub client: u32,
    pub control_hash: [u8; 16],
    pub set_hash: [u8; 16],
    pub vol_number: u64,
    pub num_files: u64,
    pub file_list: u64,
    pub file_list_size: u64,
    pub data: u64,
    pub data_size: u64,
}
