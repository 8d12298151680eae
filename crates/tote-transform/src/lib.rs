//! tote-transform: staged snapshots to star-schema dimensions and facts.
//!
//! - `primitives` - drop, rename, project, inner join, change-time split, currency names
//! - `rules` - one rule per source table, dispatched on [`tote_core::SourceTable`]
//! - `reference` - reference aggregates with duplicate handling and caching
//! - `handler` - one staged file in, one processed file out

pub mod error;
pub mod handler;
pub mod metrics;
pub mod primitives;
pub mod reference;
pub mod rules;

pub use error::TransformError;
pub use handler::{TransformHandler, TransformOutcome};
pub use reference::{ReferenceCache, ReferenceFetcher, StagedReferences, StaticReferences};
pub use rules::transform;
