pub mod machine;
pub mod persist;

pub use machine::Pipeline;
pub use persist::Checkpoint;
