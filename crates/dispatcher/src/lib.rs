//! # Dispatcher
//!
//! 目标分发与结果输出模块。
//!
//! 负责：
//! - 有界输入队列 + 固定数量 worker 的目标处理池
//! - 每个目标先过黑名单，再交给 `Renderer`
//! - 结果 Fan-out 到多个 sinks，隔离慢 sink 与失败 sink

pub mod error;
pub mod fanout;
pub mod handle;
pub mod metrics;
pub mod pool;
pub mod sinks;

pub use contracts::{ResultSink, ScanResult};
pub use error::DispatcherError;
pub use fanout::{create_sinks, SinkFanout};
pub use handle::SinkHandle;
pub use metrics::{DispatchStats, MetricsSnapshot, SinkMetrics};
pub use pool::{TargetDispatcher, TargetSubmitter};
pub use sinks::{ConsoleSink, CsvSink, JsonlSink, MemorySink, MemorySinkReader};
