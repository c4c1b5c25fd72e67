//! 客户端轮询
//!
//! 每次 watch 产生一个独立的后台任务与唯一的 PollHandle：
//! - 固定间隔读取会话状态，快照整体替换，从不逐字段修改；
//! - 进度单调不减，终态事件恰好发出一次；
//! - 显式终态、多段响应稳定、绝对超时、调用方取消，任一发生即退出循环并释放计时器。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressInput, ProgressTracker};
use crate::batch::BatchCoordinator;
use crate::config::PollingSection;
use crate::core::{ScheduleError, SessionStatus, StatusReport};
use crate::recovery::{expects_more_parts, looks_complete};

/// 可被轮询的状态来源
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll(&self, session_id: &str) -> Result<StatusReport, ScheduleError>;
}

#[async_trait]
impl StatusSource for BatchCoordinator {
    async fn poll(&self, session_id: &str) -> Result<StatusReport, ScheduleError> {
        self.poll_status(session_id).await
    }
}

/// 轮询事件；Completed / Failed / Cancelled / TimedOut 为终态事件
#[derive(Debug, Clone)]
pub enum PollEvent {
    Progress {
        percent: u8,
        snapshot: Arc<StatusReport>,
    },
    Completed(Arc<StatusReport>),
    Failed {
        error: String,
        snapshot: Option<Arc<StatusReport>>,
    },
    Cancelled,
    TimedOut {
        last: Option<Arc<StatusReport>>,
    },
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollEvent::Progress { .. })
    }
}

/// 多段响应等待状态
struct Settle {
    deadline: Instant,
    last_len: usize,
    stable: u32,
}

pub struct PollingClient {
    source: Arc<dyn StatusSource>,
    cfg: PollingSection,
}

impl PollingClient {
    pub fn new(source: Arc<dyn StatusSource>, cfg: PollingSection) -> Self {
        Self { source, cfg }
    }

    /// 开始轮询一个会话
    pub fn watch(&self, session_id: impl Into<String>) -> (PollHandle, mpsc::UnboundedReceiver<PollEvent>) {
        let session_id = session_id.into();
        let token = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        let poller = Poller {
            source: self.source.clone(),
            cfg: self.cfg.clone(),
            session_id,
            token: token.clone(),
            event_tx,
            snapshot_tx,
        };
        let task = tokio::spawn(poller.run());

        (
            PollHandle {
                token,
                snapshot: snapshot_rx,
                task,
            },
            event_rx,
        )
    }
}

/// 轮询任务的唯一句柄
pub struct PollHandle {
    token: CancellationToken,
    snapshot: watch::Receiver<Option<Arc<StatusReport>>>,
    task: JoinHandle<PollEvent>,
}

impl PollHandle {
    /// 停止轮询；任务以 Cancelled 结束（若尚未到达其他终态）
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 最近一次读到的快照
    pub fn snapshot(&self) -> Option<Arc<StatusReport>> {
        self.snapshot.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待轮询结束，返回终态事件
    pub async fn wait(self) -> PollEvent {
        match self.task.await {
            Ok(event) => event,
            Err(e) => PollEvent::Failed {
                error: format!("polling task aborted: {e}"),
                snapshot: None,
            },
        }
    }
}

struct Poller {
    source: Arc<dyn StatusSource>,
    cfg: PollingSection,
    session_id: String,
    token: CancellationToken,
    event_tx: mpsc::UnboundedSender<PollEvent>,
    snapshot_tx: watch::Sender<Option<Arc<StatusReport>>>,
}

impl Poller {
    async fn run(self) -> PollEvent {
        let started = Instant::now();
        let deadline = started + self.cfg.timeout();
        let mut ticker = tokio::time::interval(self.cfg.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = ProgressTracker::new();
        let mut settle: Option<Settle> = None;

        let terminal = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break PollEvent::Cancelled,
                _ = tokio::time::sleep_until(deadline) => break self.timed_out(),
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                _ = self.token.cancelled() => break PollEvent::Cancelled,
                r = tokio::time::timeout_at(deadline, self.source.poll(&self.session_id)) => r,
            };
            let report = match polled {
                Err(_) => break self.timed_out(),
                Ok(Ok(report)) => Arc::new(report),
                Ok(Err(ScheduleError::SessionNotFound(id))) => {
                    break PollEvent::Failed {
                        error: format!("session {id} not found"),
                        snapshot: None,
                    }
                }
                Ok(Err(e)) => {
                    // 读到中间态或暂时不可读，下次再试
                    tracing::warn!("poll of session {} failed: {}", self.session_id, e);
                    continue;
                }
            };
            self.snapshot_tx.send_replace(Some(report.clone()));

            let percent = tracker.observe(ProgressInput {
                status: report.status,
                elapsed: started.elapsed(),
                total_processed: report.total_processed,
                estimated_total: report.estimated_total(),
            });

            match report.status {
                SessionStatus::Pending | SessionStatus::Processing => {
                    let _ = self.event_tx.send(PollEvent::Progress {
                        percent,
                        snapshot: report,
                    });
                }
                SessionStatus::Failed => {
                    break PollEvent::Failed {
                        error: report
                            .error_detail
                            .clone()
                            .unwrap_or_else(|| "session failed without error detail".to_string()),
                        snapshot: Some(report),
                    }
                }
                SessionStatus::Cancelled => break PollEvent::Cancelled,
                SessionStatus::Completed => {
                    if self.is_settled(&report, &mut settle) {
                        break PollEvent::Completed(report);
                    }
                    let _ = self.event_tx.send(PollEvent::Progress {
                        percent: percent.min(super::progress::PROCESSING_CEILING),
                        snapshot: report,
                    });
                }
            }
        };

        tracing::debug!("polling of session {} finished: {:?}", self.session_id, terminal_name(&terminal));
        let _ = self.event_tx.send(terminal.clone());
        terminal
    }

    /// Completed 之后负载是否已经稳定
    ///
    /// 首次观察到 Completed 时记录负载长度并进入等待窗口；之后长度增长则重新计数。
    /// 长度连续 `stable_polls` 次不变（文本仍声明有后续分段时不算）、文本声明已完整、或窗口到期，即视为最终结果。
    fn is_settled(&self, report: &StatusReport, settle: &mut Option<Settle>) -> bool {
        let text = report.payload_text();
        let len = text.len();
        if looks_complete(&text) || self.cfg.stable_polls == 0 {
            return true;
        }

        let Some(state) = settle.as_mut() else {
            tracing::debug!(
                "session {} completed, watching the payload for up to {}s",
                self.session_id,
                self.cfg.multipart_wait_secs
            );
            *settle = Some(Settle {
                deadline: Instant::now() + self.cfg.multipart_wait(),
                last_len: len,
                stable: 0,
            });
            return false;
        };

        if len > state.last_len {
            tracing::info!(
                "session {} payload still growing ({} -> {} bytes)",
                self.session_id,
                state.last_len,
                len
            );
            state.last_len = len;
            state.stable = 0;
        } else {
            state.stable += 1;
        }
        let stable = state.stable >= self.cfg.stable_polls && !expects_more_parts(&text);
        stable || Instant::now() >= state.deadline
    }

    fn timed_out(&self) -> PollEvent {
        tracing::warn!(
            "polling of session {} timed out after {}s",
            self.session_id,
            self.cfg.timeout_secs
        );
        PollEvent::TimedOut {
            last: self.snapshot_tx.borrow().clone(),
        }
    }
}

fn terminal_name(event: &PollEvent) -> &'static str {
    match event {
        PollEvent::Progress { .. } => "progress",
        PollEvent::Completed(_) => "completed",
        PollEvent::Failed { .. } => "failed",
        PollEvent::Cancelled => "cancelled",
        PollEvent::TimedOut { .. } => "timed out",
    }
}
