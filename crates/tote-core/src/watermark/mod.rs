//! Change-capture watermark.
//!
//! The watermark is read once at the start of an extraction run and written
//! once after every snapshot of the run has been staged.

mod state;
mod store;

pub use state::{INITIAL_SENTINEL, Watermark};
pub use store::{
    MemoryWatermarkStore, StorageWatermarkStore, WatermarkStore, advance_watermark,
    load_watermark,
};
