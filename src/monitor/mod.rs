pub mod checker;
pub mod probe;
pub mod shutdown;
pub mod sink;
pub mod supervisor;
pub mod target;

pub use checker::{CheckerLoop, CheckerOptions};
pub use probe::{FetchError, FetchedPage, Fetcher, HttpFetcher, ProbeResult};
pub use shutdown::{Shutdown, ShutdownTrigger, wait_for_os_signal};
pub use sink::{MetricsSink, PgMetricsSink, SinkError};
pub use supervisor::{Supervisor, SupervisorError, SupervisorState};
pub use target::{Target, TargetError, TargetSpec};
