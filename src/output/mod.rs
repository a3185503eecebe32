mod summary;

pub use summary::{print_summary, write_summary};
