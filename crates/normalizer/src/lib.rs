//! Maps each tool's native output into the uniform finding schema and the
//! SARIF-reference on-disk layout, via a registry of per-tool parsers rather
//! than a central dispatch match.

pub mod metadata;
pub mod raw_output;
pub mod registry;
pub mod sarif;
pub mod tools;

pub use metadata::filter_tool_entries;
pub use raw_output::RawToolOutput;
pub use registry::{NormalizeError, ToolOutcome, ToolParser, ToolParserRegistry};
pub use sarif::{consolidated_relative_path, consolidate, findings_to_sarif, sarif_relative_path, SarifReference};
