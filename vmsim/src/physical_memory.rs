//! The `PhysicalMemory` primitive (spec section 6's out-of-scope external
//! collaborator, `PMread`/`PMwrite`/`PMevict`/`PMrestore`), expressed as a
//! trait so [`crate::translator::Translator`] is a library over an
//! abstract backing device, plus a deterministic in-process test double.
//!
//! Grounded on `.../kernel/src/memory/physmap.rs`'s abstraction of "however
//! physical memory is reached right now" behind a narrow interface.

use crate::config::{VmConfig, Word};

/// Raw frame-addressed physical RAM plus the backing store that holds
/// evicted pages. A real driver would implement this over a process's
/// actual memory array and a file-backed swap area; this crate only ships
/// [`SimMemory`], an in-process double for its own test suite.
pub trait PhysicalMemory {
    /// Read the word at physical address `addr` (`frame * page_size +
    /// offset`).
    fn read(&self, addr: usize) -> Word;

    /// Write `value` to physical address `addr`.
    fn write(&mut self, addr: usize, value: Word);

    /// Evict the contents of `frame` to the backing store under
    /// `page_index`.
    fn evict(&mut self, frame: usize, page_index: u64);

    /// Restore the page identified by `page_index` into `frame`.
    fn restore(&mut self, frame: usize, page_index: u64);
}

/// An in-process `PhysicalMemory`: a flat `Vec<Word>` of `num_frames *
/// page_size` words plus a `HashMap` standing in for the backing store.
/// Pages never written to the backing store restore as all-zero, matching
/// a fresh disk-backed swap area.
pub struct SimMemory {
    page_size: usize,
    ram: Vec<Word>,
    backing_store: std::collections::HashMap<u64, Vec<Word>>,
}

impl SimMemory {
    pub fn new(config: &VmConfig) -> Self {
        SimMemory {
            page_size: config.page_size(),
            ram: vec![0; config.num_frames * config.page_size()],
            backing_store: std::collections::HashMap::new(),
        }
    }
}

impl PhysicalMemory for SimMemory {
    fn read(&self, addr: usize) -> Word {
        self.ram[addr]
    }

    fn write(&mut self, addr: usize, value: Word) {
        self.ram[addr] = value;
    }

    fn evict(&mut self, frame: usize, page_index: u64) {
        let start = frame * self.page_size;
        let page = self.ram[start..start + self.page_size].to_vec();
        log::trace!("evicting frame {frame} to page {page_index}");
        self.backing_store.insert(page_index, page);
    }

    fn restore(&mut self, frame: usize, page_index: u64) {
        let start = frame * self.page_size;
        log::trace!("restoring page {page_index} into frame {frame}");
        match self.backing_store.get(&page_index) {
            Some(page) => self.ram[start..start + self.page_size].copy_from_slice(page),
            None => self.ram[start..start + self.page_size].fill(0),
        }
    }
}
