pub mod parser;

pub use parser::{load_job, parse_job, JobFile};
