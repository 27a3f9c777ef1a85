//! # Probe
//!
//! `Renderer` 实现：
//! - `HttpProbeRenderer`: 基于 reqwest 的轻量 HTTP 探测 (不跟随重定向)
//! - `MockRenderer`: 不访问网络的脚本化渲染器，用于测试与演练

mod error;
mod http;
mod mock;

pub use error::ProbeError;
pub use http::{extract_title, HttpProbeRenderer};
pub use mock::MockRenderer;
