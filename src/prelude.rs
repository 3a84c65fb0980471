//! A "prelude" for users of the `harvester-core` crate.
//!
//! Re-exports the most commonly used traits and structs so that they can
//! be easily imported.
//!
//! # Example
//!
//! ```
//! use harvester_core::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Harvester,
    HarvesterBuilder,
    // Traits implemented by callers
    OutputSink,
    PageSource,
    // Errors crossing the crate boundary
    FetchError,
    HarvestError,
    // Essential re-export for trait implementation
    async_trait,
};
