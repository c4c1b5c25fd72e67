//! Agenda - 会议日程智能体的响应恢复与分批链式调度
//!
//! 模块划分：
//! - **agent**: 智能体客户端抽象与脚本化 Mock
//! - **batch**: 会话存储、环节队列、分批链式协调器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态机与错误类型
//! - **observability**: 日志初始化
//! - **polling**: 调用方轮询与进度估算
//! - **recovery**: 信封解包、结构扫描、片段合并、残缺记录恢复
//! - **schedule**: 场次与日程提案的数据模型及字段归一化

pub mod agent;
pub mod batch;
pub mod config;
pub mod core;
pub mod observability;
pub mod polling;
pub mod recovery;
pub mod schedule;

pub use batch::{BatchCoordinator, StartChainRequest};
pub use polling::{PollEvent, PollingClient};
pub use recovery::ResponseRecovery;
pub use schedule::ScheduleProposal;
