//! 日程模型与字段归一化

pub mod normalize;
pub mod types;

pub use normalize::{parse_time, schedule_items, slot_from_value, slots_from_items};
pub use types::{preview, ScheduleProposal, SessionSlot, TimeRange, SPEAKER_PLACEHOLDER};
