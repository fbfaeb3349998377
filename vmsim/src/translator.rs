//! Translator (spec section 4.B.3): walks the page-table tree level by
//! level, calling the [`crate::frame`] selector on every zero entry it
//! finds, and reads/writes the final leaf word.
//!
//! Grounded on `original_source/Virtual Memory/VirtualMemory.cpp`'s
//! `VMFindAddress`/`VMread`/`VMwrite`/`VMinitialize`.

use crate::address::{page_index, split};
use crate::config::{VmConfig, Word};
use crate::error::Error;
use crate::frame;
use crate::physical_memory::PhysicalMemory;

/// Owns a [`VmConfig`] and drives translation over a caller-supplied
/// [`PhysicalMemory`]. A driver constructs one `Translator` per
/// configuration and calls [`Translator::read`]/[`Translator::write`] for
/// every virtual-memory access; the translator itself holds no state
/// between calls (spec section 5: "synchronous... assumes exclusive
/// access... for the duration of a call").
pub struct Translator {
    config: VmConfig,
}

impl Translator {
    pub fn new(config: VmConfig) -> Self {
        Translator { config }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Clear frame 0, establishing the (initially empty) root page table.
    pub fn initialize(&self, pm: &mut dyn PhysicalMemory) {
        clear_table(pm, &self.config, 0);
    }

    fn find_address(&self, pm: &mut dyn PhysicalMemory, va: u64) -> (usize, usize) {
        let split_addr = split(&self.config, va);
        let depth = self.config.tables_depth as usize;
        let mut addr = vec![0usize; depth + 1];

        for i in 1..=depth {
            let parent = addr[i - 1];
            let parent_offset = split_addr.indices[i - 1];
            let entry = pm.read(parent * self.config.page_size() + parent_offset);

            addr[i] = if entry != 0 {
                entry as usize
            } else {
                let frame = frame::select(pm, &self.config, parent);
                clear_table(pm, &self.config, frame);
                if i == depth {
                    pm.restore(frame, page_index(&self.config, va));
                }
                pm.write(parent * self.config.page_size() + parent_offset, frame as Word);
                frame
            };
        }

        (addr[depth], split_addr.offset)
    }

    /// Read the word at `va`. Returns `Err` without touching physical
    /// memory if `va >= VIRTUAL_MEMORY_SIZE`.
    pub fn read(&self, pm: &mut dyn PhysicalMemory, va: u64) -> Result<Word, Error> {
        if va >= self.config.virtual_memory_size {
            return Err(Error::AddressOutOfRange(va));
        }
        let (frame, offset) = self.find_address(pm, va);
        Ok(pm.read(frame * self.config.page_size() + offset))
    }

    /// Write `value` to `va`. Returns `Err` without touching physical
    /// memory if `va >= VIRTUAL_MEMORY_SIZE`.
    pub fn write(&self, pm: &mut dyn PhysicalMemory, va: u64, value: Word) -> Result<(), Error> {
        if va >= self.config.virtual_memory_size {
            return Err(Error::AddressOutOfRange(va));
        }
        let (frame, offset) = self.find_address(pm, va);
        pm.write(frame * self.config.page_size() + offset, value);
        Ok(())
    }
}

fn clear_table(pm: &mut dyn PhysicalMemory, config: &VmConfig, frame: usize) {
    for offset in 0..config.page_size() {
        pm.write(frame * config.page_size() + offset, 0);
    }
}
