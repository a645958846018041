pub mod api;
pub mod cache;
pub mod chunks;
pub mod error;
pub mod paginate;
pub mod replay;

pub use api::{ControllerApi, CursorField, Page, PageQuery, TargetValidation, PAGE_SIZE};
pub use cache::{fetch_if_missing, FetchOutcome, RecordCount};
pub use chunks::process_in_chunks;
pub use error::{FetchError, Result};
pub use paginate::fetch_all_pages;
pub use replay::ReplayController;
