pub mod energy_readings;

pub use energy_readings::EnergyReadingSink;
