//! SmartVoz corpus crate - turns knowledge-base rows into a directory of
//! self-contained documents and reads them back for indexing.

pub mod exporter;
pub mod markdown;
pub mod reader;

pub use exporter::{CorpusExporter, EntityKind, ExportFailure, ExportReport};
pub use markdown::{parse_protocol, render_protocol};
pub use reader::{read_corpus, CorpusDocument};
