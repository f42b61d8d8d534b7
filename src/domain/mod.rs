pub mod alert;
pub mod identity;
pub mod probe_result;
pub mod report;

pub use alert::*;
pub use identity::*;
pub use probe_result::*;
pub use report::*;
