pub mod energy_reading_queries;

pub use energy_reading_queries::{latest_before, readings_page, READINGS_PAGE_SIZE};
