pub mod batch;
pub mod probe;
pub mod telemetry;

pub use batch::BatchOrchestrator;
pub use probe::{EnvironmentProbe, ProbeStep};
pub use telemetry::{LogSink, TelemetryDispatcher, TelemetryEvent, TelemetrySink};
