// src/drivers/mod.rs
// 采样链路: 原始码 -> 换算 -> 过零检测 -> 批次累加/结算 -> 结果存储 -> 应答
pub mod buffer;
pub mod convert;
pub mod cycle;
pub mod error;
pub mod pacing;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod wire;
// 公开导出常用类型
pub use convert::{Calibration, LinearCalibration};
pub use error::SenseError;
pub use pacing::{Pacer, PacingOutcome};
pub use pipeline::BatchProcessor;
pub use source::{RawSample, SampleSource, SimulatedSource};
pub use store::ResultStore;
pub use wire::WireResponder;
