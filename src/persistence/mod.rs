//! Persistence of alert state between process restarts

pub mod state_file;

pub use state_file::AlertStateFile;
