//! # Admission
//!
//! 服务边界的并发准入控制。
//!
//! 每个请求的状态：`WAITING → {ADMITTED, REJECTED_FULL, REJECTED_TIMEOUT}`
//!
//! - 有空闲槽位：立即准入
//! - 等待队列已满：立即拒绝 (429)
//! - 超时或取消：拒绝 (503)
//!
//! 实例由调用方持有并注入 (无全局状态)。

mod controller;
mod error;

pub use controller::{Admission, AdmissionController, AdmissionPermit, AdmissionStats};
pub use error::AdmissionError;
