//! Work-list discovery: taxonomy filtering, file lookup, and target building

pub mod lineage;
pub mod locate;
pub mod targets;

pub use lineage::genome_ids_with_lineage;
pub use locate::{find_files_with_suffix, list_subdirs};
pub use targets::Targets;
