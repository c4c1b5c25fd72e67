//! 分批链式处理：会话存储、环节队列与协调器

pub mod collaborators;
pub mod coordinator;
pub mod queue;
pub mod store;

pub use collaborators::{DraftSlot, InMemoryCatalog, SessionCounter, SlotRepository};
pub use coordinator::{BatchCoordinator, Collaborators, LinkOutcome, StartChainRequest, StartChainResponse};
pub use queue::{ChannelScheduler, LinkContext, LinkRunner, LinkScheduler};
pub use store::{InMemorySessionStore, SessionNotification, SessionStore};
