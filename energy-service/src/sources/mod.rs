pub mod energy_reading_csv_file;
pub mod http_readings;

pub use energy_reading_csv_file::EnergyReadingCsvFileSource;
pub use http_readings::HttpReadingsSource;
