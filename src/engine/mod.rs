pub mod enrich;
pub mod index;
pub mod router;

pub use enrich::{EnrichReport, Enricher, FieldPath};
pub use index::{build_index, IndexStats, Record, RecordIndex};
pub use router::{Collection, IndexSet, Router};
