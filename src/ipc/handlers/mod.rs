pub mod core;
pub mod marks;
pub mod records;
pub mod snapshot;
