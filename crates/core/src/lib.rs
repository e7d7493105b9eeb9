pub mod fragment;
pub mod item;
pub mod money;
pub mod page;

pub use fragment::{BoundingBox, TextFragment};
pub use item::{BillItem, FieldConfidence, ItemFlag};
pub use money::{round_money, Amount};
pub use page::{ExtractionResponse, ExtractionResult, PageFailure, PageFlag, PageResult, PageType};
