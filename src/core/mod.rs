//! 核心层：会话状态与错误类型

pub mod error;
pub mod state;

pub use error::{classify_agent_failure, ScheduleError};
pub use state::{AsyncSession, SessionStatus, StatusReport};
