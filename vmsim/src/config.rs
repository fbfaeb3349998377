//! Compile-time parameters of the original design (spec section 3.2),
//! expressed as a validated runtime value so one binary can be built
//! against more than one parameter set.

use thiserror::Error;

/// One word of physical memory. The original assignment types this as a
/// small signed integer (`word_t`); widened to `i64` here since nothing in
/// this crate relies on it wrapping at 32 bits.
pub type Word = i64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OFFSET_WIDTH must be nonzero")]
    ZeroOffsetWidth,
    #[error("TABLES_DEPTH must be nonzero")]
    ZeroTablesDepth,
    #[error("NUM_FRAMES ({num_frames}) must be at least TABLES_DEPTH + 1 ({min})")]
    TooFewFrames { num_frames: usize, min: usize },
}

/// The parameter set a [`crate::translator::Translator`] is built against.
///
/// `NUM_FRAMES >= TABLES_DEPTH + 1` is required (spec section 8, P-B5): a
/// full root-to-leaf walk needs at most one freshly allocated frame per
/// level, and the allocator is documented as "always succeeds" only under
/// this bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub offset_width: u32,
    pub tables_depth: u32,
    pub num_frames: usize,
    pub virtual_memory_size: u64,
    pub weight_even: i32,
    pub weight_odd: i32,
}

impl VmConfig {
    pub fn new(
        offset_width: u32,
        tables_depth: u32,
        num_frames: usize,
        weight_even: i32,
        weight_odd: i32,
    ) -> Result<Self, ConfigError> {
        if offset_width == 0 {
            return Err(ConfigError::ZeroOffsetWidth);
        }
        if tables_depth == 0 {
            return Err(ConfigError::ZeroTablesDepth);
        }
        let min = tables_depth as usize + 1;
        if num_frames < min {
            return Err(ConfigError::TooFewFrames { num_frames, min });
        }
        let virtual_memory_size = 1u64 << (offset_width * (tables_depth + 1));
        Ok(VmConfig {
            offset_width,
            tables_depth,
            num_frames,
            virtual_memory_size,
            weight_even,
            weight_odd,
        })
    }

    pub fn page_size(&self) -> usize {
        1usize << self.offset_width
    }
}
