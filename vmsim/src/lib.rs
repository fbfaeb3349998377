//! A simulated hierarchical virtual-memory translator.
//!
//! Walks a multi-level page table over an emulated physical RAM with a
//! fixed number of frames, allocating frames on demand (reclaiming an
//! empty table, bumping a high-water mark, or evicting a page by a
//! deterministic weight) and swapping pages through a backing store.
//!
//! ```
//! use vmsim::{Translator, VmConfig, SimMemory};
//!
//! let config = VmConfig::new(1, 3, 4, 1, 2).unwrap();
//! let mut memory = SimMemory::new(&config);
//! let translator = Translator::new(config);
//! translator.initialize(&mut memory);
//!
//! translator.write(&mut memory, 5, 42).unwrap();
//! assert_eq!(translator.read(&mut memory, 5).unwrap(), 42);
//! ```

mod address;
mod config;
mod error;
mod frame;
mod physical_memory;
mod translator;

pub use config::{ConfigError, VmConfig, Word};
pub use error::Error;
pub use physical_memory::{PhysicalMemory, SimMemory};
pub use translator::Translator;
