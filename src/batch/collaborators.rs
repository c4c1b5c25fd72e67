//! 外部协作方接口：剩余场次计数与草稿场次持久化
//!
//! 协调器每个环节开始前都从 SessionCounter 现读剩余数，从不跨环节缓存。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::schedule::SessionSlot;

/// 还有多少场次尚未排布
#[async_trait]
pub trait SessionCounter: Send + Sync {
    async fn remaining_sessions(&self) -> Result<usize, String>;
}

/// 把新排布的场次保存为草稿，返回实际保存的数量
#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn save_drafts(&self, session_id: &str, slots: &[SessionSlot]) -> Result<usize, String>;
}

/// 已保存的草稿
#[derive(Debug, Clone, PartialEq)]
pub struct DraftSlot {
    pub session_id: String,
    pub slot: SessionSlot,
}

/// 内存版会议目录：同时充当计数器与草稿仓库
///
/// 待排布的场次按名称登记；保存草稿时按名称销项，未登记的名称也会保存但不影响剩余数。
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    pending: RwLock<Vec<String>>,
    drafts: RwLock<Vec<DraftSlot>>,
    fail_saves: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new(pending: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: RwLock::new(pending.into_iter().collect()),
            ..Default::default()
        }
    }

    /// 生成 "Session 1" .. "Session n"
    pub fn with_count(n: usize) -> Self {
        Self::new((1..=n).map(|i| format!("Session {i}")))
    }

    /// 之后的保存全部失败（模拟持久化故障）
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn drafts(&self) -> Vec<DraftSlot> {
        self.drafts.read().await.clone()
    }

    pub async fn pending(&self) -> Vec<String> {
        self.pending.read().await.clone()
    }
}

#[async_trait]
impl SessionCounter for InMemoryCatalog {
    async fn remaining_sessions(&self) -> Result<usize, String> {
        Ok(self.pending.read().await.len())
    }
}

#[async_trait]
impl SlotRepository for InMemoryCatalog {
    async fn save_drafts(&self, session_id: &str, slots: &[SessionSlot]) -> Result<usize, String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("draft slot insert failed: storage unavailable".to_string());
        }
        let mut pending = self.pending.write().await;
        let mut drafts = self.drafts.write().await;
        for slot in slots {
            pending.retain(|name| name != &slot.session_name);
            drafts.push(DraftSlot {
                session_id: session_id.to_string(),
                slot: slot.clone(),
            });
        }
        Ok(slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_saving_drafts_reduces_remaining() {
        let catalog = InMemoryCatalog::with_count(3);
        assert_eq!(catalog.remaining_sessions().await.unwrap(), 3);

        let saved = catalog
            .save_drafts(
                "s1",
                &[SessionSlot::new("Session 2", "Hall"), SessionSlot::new("Unlisted", "Hall")],
            )
            .await
            .unwrap();
        assert_eq!(saved, 2);
        assert_eq!(catalog.remaining_sessions().await.unwrap(), 2);
        assert_eq!(catalog.pending().await, vec!["Session 1", "Session 3"]);
        assert_eq!(catalog.drafts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_saves() {
        let catalog = InMemoryCatalog::with_count(1);
        catalog.set_fail_saves(true);
        assert!(catalog
            .save_drafts("s1", &[SessionSlot::new("Session 1", "Hall")])
            .await
            .is_err());
        assert_eq!(catalog.remaining_sessions().await.unwrap(), 1);
    }
}
