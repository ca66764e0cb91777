//! Core data types and I/O operations.

pub mod loaders;
pub mod timestamps;
pub mod writers;

pub use loaders::{inner_join, load_table, LoaderError, ParticleTable};
pub use timestamps::{extract_timestamp, extract_timestamps, format_label, parse_label, TimestampError};
pub use writers::{write_assignment_report, write_labels, write_table, WriteError};
