//! 分批链式协调器
//!
//! 状态机：Pending → Processing → {Completed | Failed}，外部请求可把 Pending/Processing 置为 Cancelled。
//! 每个环节依次：
//! 1. 检查取消 / 终态；
//! 2. 从计数方现读剩余场次（不信任上一环节的估计），为 0 则直接 Completed；
//! 3. 请求智能体排布一批，带上已捕获的会话 ID，首次响应时捕获；
//! 4. 恢复并保存本批场次为草稿，累加已处理数与链深度；
//! 5. 链深度达到上限且仍有剩余时 Failed（"chain limit reached"），否则入队下一环节并保持 Processing。
//!
//! 第 3、4 步的任何错误都直接 Failed，已在先前环节提交的工作不回滚。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::collaborators::{SessionCounter, SlotRepository};
use super::queue::{LinkContext, LinkScheduler};
use super::store::SessionStore;
use crate::agent::{AgentContent, AgentRequest, ScheduleAgent};
use crate::config::{CoordinatorSection, DEFAULT_BATCH_SIZE};
use crate::core::{classify_agent_failure, AsyncSession, ScheduleError, SessionStatus, StatusReport};
use crate::recovery::ResponseRecovery;
use crate::schedule::preview;

/// 发起一条链
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChainRequest {
    pub user_message: String,
    pub prior_conversation_id: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChainResponse {
    pub session_id: String,
    pub initial_status: SessionStatus,
}

/// 单个环节的结果
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// 剩余为 0，链结束
    Completed,
    /// 已入队下一环节
    Continued,
    Failed(String),
    Cancelled,
    /// 会话不存在或已终结，本环节不做任何事
    Skipped,
}

/// 协调器依赖的外部协作方
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub agent: Arc<dyn ScheduleAgent>,
    pub counter: Arc<dyn SessionCounter>,
    pub slots: Arc<dyn SlotRepository>,
    pub scheduler: Arc<dyn LinkScheduler>,
}

pub struct BatchCoordinator {
    deps: Collaborators,
    recovery: ResponseRecovery,
    default_batch_size: usize,
    max_chain_depth: u32,
}

impl BatchCoordinator {
    pub fn new(deps: Collaborators, cfg: &CoordinatorSection, recovery: ResponseRecovery) -> Self {
        Self {
            deps,
            recovery,
            default_batch_size: if cfg.batch_size == 0 { DEFAULT_BATCH_SIZE } else { cfg.batch_size },
            max_chain_depth: cfg.max_chain_depth.max(1),
        }
    }

    pub fn max_chain_depth(&self) -> u32 {
        self.max_chain_depth
    }

    /// 创建 Pending 会话并入队第一个环节
    pub async fn start_chain(&self, request: StartChainRequest) -> Result<StartChainResponse, ScheduleError> {
        let batch_size = request
            .batch_size
            .filter(|n| *n > 0)
            .unwrap_or(self.default_batch_size);
        let session = AsyncSession::new(
            request.user_message.clone(),
            request.prior_conversation_id.clone(),
            batch_size,
        );
        let session_id = self.deps.store.create(session).await;
        tracing::info!("chain started: session={} batch_size={}", session_id, batch_size);

        let link = LinkContext::first(
            session_id.clone(),
            request.user_message,
            request.prior_conversation_id,
            batch_size,
        );
        if let Err(e) = self.deps.scheduler.enqueue(link) {
            let _ = self.deps.store.fail(&session_id, e.user_message()).await;
            return Err(e);
        }

        Ok(StartChainResponse {
            session_id,
            initial_status: SessionStatus::Pending,
        })
    }

    pub async fn poll_status(&self, session_id: &str) -> Result<StatusReport, ScheduleError> {
        self.deps
            .store
            .get(session_id)
            .await
            .map(|s| s.report())
            .ok_or_else(|| ScheduleError::SessionNotFound(session_id.to_string()))
    }

    /// 取消是建议性的：不中断正在运行的环节，只阻止后续环节执行
    pub async fn cancel(&self, session_id: &str) -> Result<bool, ScheduleError> {
        let cancelled = self.deps.store.cancel(session_id).await?;
        if cancelled {
            tracing::info!("session {} cancelled", session_id);
        }
        Ok(cancelled)
    }

    /// 执行一个链环节
    pub async fn run_link(&self, link: LinkContext) -> LinkOutcome {
        let id = link.session_id.as_str();
        let Some(session) = self.deps.store.get(id).await else {
            tracing::warn!("link for unknown session {} skipped", id);
            return LinkOutcome::Skipped;
        };
        match session.status {
            SessionStatus::Cancelled => {
                tracing::info!("session {} was cancelled, not running link {}", id, link.chain_depth + 1);
                return LinkOutcome::Cancelled;
            }
            status if status.is_terminal() => return LinkOutcome::Skipped,
            _ => {}
        }
        if link.chain_depth >= self.max_chain_depth {
            return self
                .fail_link(
                    &link,
                    ScheduleError::ChainLimit {
                        depth: link.chain_depth,
                        processed: link.total_processed,
                    },
                )
                .await;
        }
        if let Err(e) = self.deps.store.transition(id, SessionStatus::Processing).await {
            return self.interrupted(&link, e).await;
        }

        let remaining = match self.read_remaining(&link).await {
            Ok(n) => n,
            Err(e) => return self.interrupted(&link, e).await,
        };
        if remaining == 0 {
            return self.complete(&link, link.total_processed).await;
        }

        // 智能体调用
        let request = AgentRequest {
            message: batch_message(&link, remaining),
            conversation_id: link.conversation_id.clone(),
            batch_size: link.batch_size,
        };
        let reply = match self.deps.agent.invoke(request).await {
            Ok(reply) => reply,
            Err(raw) => {
                tracing::error!("agent call failed for session {}: {}", id, raw);
                return self.fail_link(&link, classify_agent_failure(&raw)).await;
            }
        };

        let conversation_id = match (&link.conversation_id, reply.conversation_id) {
            (Some(known), _) => Some(known.clone()),
            (None, Some(captured)) => {
                if let Err(e) = self.deps.store.set_conversation_id(id, &captured).await {
                    return self.interrupted(&link, e).await;
                }
                tracing::debug!("captured conversation id {} for session {}", captured, id);
                Some(captured)
            }
            (None, None) => None,
        };

        let proposal = match &reply.content {
            AgentContent::Structured(value) => self.recovery.recover_value(value),
            AgentContent::Raw(text) => self.recovery.recover(text),
        };
        if !proposal.success {
            let err = ScheduleError::Agent(format!(
                "response contained no recoverable sessions: {}",
                preview(&reply.content.preview_source(), self.recovery.preview_chars())
            ));
            return self.fail_link(&link, err).await;
        }
        if proposal.partial {
            tracing::warn!(
                "session {}: batch response was truncated, keeping {} recovered sessions",
                id,
                proposal.total_sessions
            );
        }

        // 持久化
        let saved = match self.deps.slots.save_drafts(id, &proposal.schedule).await {
            Ok(n) => n,
            Err(e) => return self.fail_link(&link, ScheduleError::Persistence(e)).await,
        };
        let session = match self.deps.store.record_batch(id, saved, proposal).await {
            Ok(s) => s,
            Err(e) => return self.interrupted(&link, e).await,
        };
        let depth = link.chain_depth + 1;
        tracing::info!(
            "session {}: link {}/{} saved {} sessions ({} total)",
            id,
            depth,
            self.max_chain_depth,
            saved,
            session.total_processed
        );

        if depth >= self.max_chain_depth {
            // 上限处再读一次：刚好排完则正常结束
            return match self.read_remaining(&link).await {
                Ok(0) => self.complete(&link, session.total_processed).await,
                Ok(_) => {
                    self.fail_link(
                        &link,
                        ScheduleError::ChainLimit {
                            depth,
                            processed: session.total_processed,
                        },
                    )
                    .await
                }
                Err(e) => self.interrupted(&link, e).await,
            };
        }

        let next = link.next(conversation_id, session.total_processed);
        match self.deps.scheduler.enqueue(next) {
            Ok(()) => LinkOutcome::Continued,
            Err(e) => self.fail_link(&link, e).await,
        }
    }

    /// 把会话置为 Failed，记录错误与已达到的处理数
    pub async fn fail_link(&self, link: &LinkContext, err: ScheduleError) -> LinkOutcome {
        let processed = self
            .deps
            .store
            .get(&link.session_id)
            .await
            .map(|s| s.total_processed)
            .unwrap_or(link.total_processed);
        let message = match &err {
            ScheduleError::ChainLimit { .. } => err.user_message(),
            _ => format!("{} ({} sessions processed before failure)", err.user_message(), processed),
        };
        tracing::error!("session {} failed: {}", link.session_id, message);
        match self.deps.store.fail(&link.session_id, message.clone()).await {
            Ok(_) => LinkOutcome::Failed(message),
            Err(e) => self.interrupted(link, e).await,
        }
    }

    async fn complete(&self, link: &LinkContext, total: usize) -> LinkOutcome {
        let message = format!("Scheduling complete: {} sessions scheduled as drafts", total);
        match self.deps.store.complete(&link.session_id, message).await {
            Ok(_) => {
                tracing::info!("session {} completed ({} sessions)", link.session_id, total);
                LinkOutcome::Completed
            }
            Err(e) => self.interrupted(link, e).await,
        }
    }

    async fn read_remaining(&self, link: &LinkContext) -> Result<usize, ScheduleError> {
        let remaining = self
            .deps
            .counter
            .remaining_sessions()
            .await
            .map_err(ScheduleError::Persistence)?;
        self.deps.store.set_remaining(&link.session_id, remaining).await?;
        Ok(remaining)
    }

    /// 存储拒绝写入：多数是环节执行期间会话被取消
    async fn interrupted(&self, link: &LinkContext, err: ScheduleError) -> LinkOutcome {
        if err == ScheduleError::Cancelled {
            tracing::info!("session {} was cancelled during link {}", link.session_id, link.chain_depth + 1);
            return LinkOutcome::Cancelled;
        }
        match self.deps.store.get(&link.session_id).await.map(|s| s.status) {
            Some(SessionStatus::Cancelled) => LinkOutcome::Cancelled,
            Some(status) if status.is_terminal() => LinkOutcome::Skipped,
            None => LinkOutcome::Skipped,
            Some(_) => {
                let message = err.user_message();
                match self.deps.store.fail(&link.session_id, message.clone()).await {
                    Ok(_) => LinkOutcome::Failed(message),
                    Err(_) => LinkOutcome::Skipped,
                }
            }
        }
    }
}

/// 每批发给智能体的消息
fn batch_message(link: &LinkContext, remaining: usize) -> String {
    let count = link.batch_size.min(remaining);
    format!(
        "{}\n\nSchedule the next {} unscheduled sessions ({} remain, {} already scheduled). \
         Respond with a JSON array of objects with the fields sessionName, speakers, location, \
         startTime, endTime, format, focus and sessionAbstract.",
        link.user_message.trim(),
        count,
        remaining,
        link.total_processed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentReply, ScheduleAgent, ScriptedAgent};
    use crate::batch::collaborators::InMemoryCatalog;
    use crate::batch::queue::ChannelScheduler;
    use crate::batch::store::InMemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// 先等待一段时间再交给脚本化智能体作答
    struct DelayedAgent {
        inner: Arc<ScriptedAgent>,
        delay: Duration,
    }

    #[async_trait]
    impl ScheduleAgent for DelayedAgent {
        async fn invoke(&self, request: AgentRequest) -> Result<AgentReply, String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.invoke(request).await
        }
    }

    struct Harness {
        coordinator: BatchCoordinator,
        agent: Arc<ScriptedAgent>,
        catalog: Arc<InMemoryCatalog>,
        scheduler: Arc<ChannelScheduler>,
        links: mpsc::UnboundedReceiver<LinkContext>,
    }

    fn harness(total: usize, replies: Vec<Result<AgentReply, String>>) -> Harness {
        delayed_harness(total, replies, Duration::ZERO)
    }

    fn delayed_harness(total: usize, replies: Vec<Result<AgentReply, String>>, delay: Duration) -> Harness {
        let (store, _notes) = InMemorySessionStore::new();
        let (scheduler, links) = ChannelScheduler::new();
        let agent = Arc::new(ScriptedAgent::new(replies));
        let catalog = Arc::new(InMemoryCatalog::with_count(total));
        let scheduler = Arc::new(scheduler);
        let coordinator = BatchCoordinator::new(
            Collaborators {
                store: Arc::new(store),
                agent: Arc::new(DelayedAgent {
                    inner: agent.clone(),
                    delay,
                }),
                counter: catalog.clone(),
                slots: catalog.clone(),
                scheduler: scheduler.clone(),
            },
            &CoordinatorSection::default(),
            ResponseRecovery::default(),
        );
        Harness {
            coordinator,
            agent,
            catalog,
            scheduler,
            links,
        }
    }

    /// 第 `from`..=`to` 场的响应
    fn batch_reply(from: usize, to: usize) -> Result<AgentReply, String> {
        let items: Vec<String> = (from..=to)
            .map(|i| format!(r#"{{"sessionName":"Session {i}","location":"Room {}"}}"#, i % 3))
            .collect();
        Ok(AgentReply::raw(format!("[{}]", items.join(","))))
    }

    fn start_request() -> StartChainRequest {
        StartChainRequest {
            user_message: "Plan the conference".into(),
            prior_conversation_id: None,
            batch_size: Some(2),
        }
    }

    async fn run_all(h: &mut Harness) -> Vec<LinkOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(link) = h.links.try_recv() {
            outcomes.push(h.coordinator.run_link(link).await);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_zero_remaining_completes_without_agent_call() {
        let mut h = harness(0, vec![]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        assert_eq!(started.initial_status, SessionStatus::Pending);

        let outcomes = run_all(&mut h).await;
        assert_eq!(outcomes, vec![LinkOutcome::Completed]);
        assert_eq!(h.agent.call_count(), 0);

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.remaining_count, Some(0));
        assert!(report.payload.is_some());
    }

    #[tokio::test]
    async fn test_chain_runs_until_work_is_done() {
        let mut h = harness(5, vec![batch_reply(1, 2), batch_reply(3, 4), batch_reply(5, 5)]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert_eq!(
            outcomes,
            vec![
                LinkOutcome::Continued,
                LinkOutcome::Continued,
                LinkOutcome::Continued,
                LinkOutcome::Completed
            ]
        );
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.total_processed, 5);
        match report.payload {
            Some(p) => {
                assert_eq!(p.total_sessions, 5);
                assert!(p.message.contains("5 sessions"));
            }
            other => panic!("Expected a payload, got {other:?}"),
        }
        assert!(h.catalog.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_chain_limit_fails_after_five_links() {
        let replies = (0..10).map(|i| batch_reply(i * 2 + 1, i * 2 + 2)).collect();
        let mut h = harness(20, replies);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert_eq!(outcomes.len(), 5);
        assert_eq!(h.scheduler.enqueued_count(), 5);
        assert!(matches!(outcomes.last(), Some(LinkOutcome::Failed(msg)) if msg.contains("chain limit")));

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.total_processed, 10);
        assert_eq!(report.chain_depth, 5);
        let detail = report.error_detail.unwrap();
        assert!(detail.contains("chain limit"));
        assert!(detail.contains("10"));
    }

    #[tokio::test]
    async fn test_chain_limit_reached_with_no_work_left_completes() {
        let replies = (0..5).map(|i| batch_reply(i * 2 + 1, i * 2 + 2)).collect();
        let mut h = harness(10, replies);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert_eq!(outcomes.last(), Some(&LinkOutcome::Completed));
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.total_processed, 10);
    }

    #[tokio::test]
    async fn test_conversation_id_captured_and_forwarded() {
        let first = batch_reply(1, 2).map(|r| r.with_conversation("conv-42"));
        let second = batch_reply(3, 4).map(|r| r.with_conversation("conv-other"));
        let mut h = harness(4, vec![first, second]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        run_all(&mut h).await;

        let requests = h.agent.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].conversation_id, None);
        assert_eq!(requests[1].conversation_id.as_deref(), Some("conv-42"));
        assert!(requests[0].message.contains("next 2 unscheduled sessions"));

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_prior_conversation_id_used_from_first_link() {
        let mut h = harness(1, vec![batch_reply(1, 1)]);
        let mut request = start_request();
        request.prior_conversation_id = Some("conv-prior".into());
        h.coordinator.start_chain(request).await.unwrap();
        run_all(&mut h).await;
        assert_eq!(h.agent.requests()[0].conversation_id.as_deref(), Some("conv-prior"));
    }

    #[tokio::test]
    async fn test_agent_failure_keeps_committed_work() {
        let mut h = harness(6, vec![batch_reply(1, 2), Err("upstream 500".to_string())]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert_eq!(outcomes.len(), 2);
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.total_processed, 2);
        let detail = report.error_detail.unwrap();
        assert!(detail.contains("upstream 500"));
        assert!(detail.contains("2 sessions processed"));
        assert_eq!(h.catalog.drafts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resource_limit_is_rewritten() {
        let mut h = harness(6, vec![Err("System.LimitException: Apex heap size too large".to_string())]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        run_all(&mut h).await;

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert!(report.error_detail.unwrap().contains("smaller batch"));
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_session() {
        let mut h = harness(4, vec![batch_reply(1, 2)]);
        h.catalog.set_fail_saves(true);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert!(matches!(&outcomes[0], LinkOutcome::Failed(msg) if msg.contains("storage unavailable")));
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.total_processed, 0);
    }

    #[tokio::test]
    async fn test_unrecoverable_reply_fails_with_preview() {
        let mut h = harness(4, vec![Ok(AgentReply::raw("Sorry, I can't help with that."))]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        run_all(&mut h).await;

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Failed);
        assert!(report.error_detail.unwrap().contains("Sorry, I can't help"));
    }

    #[tokio::test]
    async fn test_truncated_reply_is_kept_as_partial() {
        let truncated = r#"[{"sessionName":"Session 1","location":"A"},{"sessionName":"Session 2","loc"#;
        let mut h = harness(2, vec![Ok(AgentReply::raw(truncated)), batch_reply(2, 2)]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        run_all(&mut h).await;

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.total_processed, 2);
        match report.payload {
            Some(p) => assert!(p.partial),
            other => panic!("Expected a payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_next_link() {
        let mut h = harness(6, vec![batch_reply(1, 2), batch_reply(3, 4)]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let first = h.links.try_recv().unwrap();
        assert_eq!(h.coordinator.run_link(first).await, LinkOutcome::Continued);
        assert!(h.coordinator.cancel(&started.session_id).await.unwrap());

        let second = h.links.try_recv().unwrap();
        assert_eq!(h.coordinator.run_link(second).await, LinkOutcome::Cancelled);
        assert_eq!(h.agent.call_count(), 1);

        // 已终结的会话不能再取消
        assert!(!h.coordinator.cancel(&started.session_id).await.unwrap());
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_agent_call_stops_the_chain() {
        let mut h = delayed_harness(6, vec![batch_reply(1, 2), batch_reply(3, 4)], Duration::from_secs(10));
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        let link = h.links.try_recv().unwrap();

        let (outcome, cancelled) = tokio::join!(h.coordinator.run_link(link), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.coordinator.cancel(&started.session_id).await
        });
        assert!(cancelled.unwrap());
        assert_eq!(outcome, LinkOutcome::Cancelled);
        // 正在运行的调用不被打断，但结果不再计入会话，也不会排下一个环节
        assert_eq!(h.agent.call_count(), 1);
        assert!(h.links.try_recv().is_err());
        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.status, SessionStatus::Cancelled);
        assert_eq!(report.total_processed, 0);
    }

    #[tokio::test]
    async fn test_structured_reply_is_recovered_without_text_parsing() {
        let structured = json!({
            "schedule": [
                {"sessionName": "Session 1", "location": "Hall A", "speakers": [{"fullName": "Ada"}]},
                {"sessionName": "Session 2", "location": "Hall B"}
            ]
        });
        let mut h = harness(3, vec![Ok(AgentReply::structured(structured))]);
        h.agent.push(batch_reply(3, 3));
        let started = h.coordinator.start_chain(start_request()).await.unwrap();

        let outcomes = run_all(&mut h).await;
        assert_eq!(outcomes.last(), Some(&LinkOutcome::Completed));
        assert_eq!(h.agent.call_count(), 2);

        let report = h.coordinator.poll_status(&started.session_id).await.unwrap();
        assert_eq!(report.total_processed, 3);
        match report.payload {
            Some(p) => {
                assert_eq!(p.schedule[0].speakers, vec!["Ada".to_string()]);
                assert!(p.locations.contains("Hall B"));
                assert!(!p.partial);
            }
            other => panic!("Expected a payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_link_on_finished_session_is_skipped() {
        let mut h = harness(0, vec![]);
        let started = h.coordinator.start_chain(start_request()).await.unwrap();
        let link = h.links.try_recv().unwrap();
        assert_eq!(h.coordinator.run_link(link.clone()).await, LinkOutcome::Completed);
        assert_eq!(h.coordinator.run_link(link).await, LinkOutcome::Skipped);
        assert!(h.coordinator.poll_status(&started.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_session_poll() {
        let h = harness(0, vec![]);
        assert!(matches!(
            h.coordinator.poll_status("nope").await,
            Err(ScheduleError::SessionNotFound(_))
        ));
    }
}
