pub mod aggregate;
pub mod columns;
pub mod config;
pub mod fuzzy;
pub mod header;
pub mod items;
pub mod numeric;
pub mod page;
pub mod pipeline;
pub mod recognizer;
pub mod rows;
pub mod spelling;
pub mod types;
pub mod validate;

pub use aggregate::PageAggregator;
pub use columns::{assign_row, AssignedRow, Cell};
pub use config::{ConfigError, ExtractionConfig};
pub use header::{detect_header, HeaderDetection};
pub use items::{build_items, clean_item_name};
pub use numeric::parse_number;
pub use page::{LineItemExtractor, PageError, PageRun, PageState};
pub use pipeline::{DocumentPipeline, PageImage, PageInput};
pub use recognizer::{parse_tesseract_tsv, MockRecognizer, OcrBackend, OcrError};
pub use rows::{cluster_rows, Row};
pub use spelling::SpellCorrector;
pub use types::{ColumnBoundary, ColumnRole, PageBounds};
pub use validate::validate_item;
