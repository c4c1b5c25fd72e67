//! 智能体调用层：请求 / 响应契约与脚本化 Mock

pub mod mock;
pub mod traits;

pub use mock::ScriptedAgent;
pub use traits::{AgentContent, AgentReply, AgentRequest, ScheduleAgent};
