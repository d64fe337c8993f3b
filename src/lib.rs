pub mod batch;
pub mod config;
pub mod link;
pub mod logging;
pub mod monitor;
pub mod persist;
pub mod plot;
pub mod receiver;
pub mod session;

pub use batch::{classify, BatchError, MeasurementBatch, Series, Shape};
pub use config::{ConfigError, MonitorConfig, ReceiverConfig};
pub use link::{Link, LinkError, LinkPort, Poll};
pub use link::protocol::{Command, DeviceMessage, DeviceStatus};
pub use session::{SessionEntry, SessionStore};
pub use persist::PersistError;
pub use plot::{PlotError, PlotSettings, Plotter};
pub use receiver::{CommandLoop, LineOperator, LoopExit, LoopTiming, Operator};
pub use monitor::{Monitor, StatusScreen, TextDisplay};
