//! Agenda 命令行入口
//!
//! - `agenda recover <file>`：对一份原始智能体响应运行恢复管线，输出 ScheduleProposal JSON
//! - `agenda demo [sessions]`：用脚本化智能体跑一条完整的分批链，打印轮询事件

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use agenda::agent::{AgentReply, ScriptedAgent};
use agenda::batch::{
    BatchCoordinator, ChannelScheduler, Collaborators, InMemoryCatalog, InMemorySessionStore, LinkRunner,
    StartChainRequest,
};
use agenda::config::{load_config, AppConfig};
use agenda::polling::{PollEvent, PollingClient};
use agenda::recovery::ResponseRecovery;
use serde_json::{json, Value};

const USAGE: &str = "usage: agenda recover <file> | agenda demo [sessions]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("AGENDA_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    agenda::observability::init(&cfg.app.log_level);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("recover") => {
            let path = args.get(1).context(USAGE)?;
            recover_file(&cfg, path)
        }
        Some("demo") => {
            let sessions = match args.get(1) {
                Some(n) => n.parse().with_context(|| format!("invalid session count: {n}"))?,
                None => 23,
            };
            run_demo(cfg, sessions).await
        }
        _ => bail!(USAGE),
    }
}

fn recover_file(cfg: &AppConfig, path: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    let proposal = ResponseRecovery::new(&cfg.recovery).recover(&raw);
    println!("{}", serde_json::to_string_pretty(&proposal)?);
    if !proposal.success {
        bail!("no session records could be recovered from {path}");
    }
    Ok(())
}

fn demo_item(i: usize) -> Value {
    json!({
        "sessionName": format!("Session {i}"),
        "speakers": [format!("Speaker {i}")],
        "location": format!("Room {}", i % 4 + 1),
        "startTime": format!("2026-03-1{}T{:02}:00:00Z", i % 3 + 1, 9 + i % 8),
    })
}

/// 每批一个回复：第二批故意截断，第三批以结构化 JSON 返回，其余为带代码块的文本
///
/// 返回截断时丢失的那一场，由调用方在链尾补一个回复
fn demo_replies(total: usize, batch_size: usize) -> (Vec<Result<AgentReply, String>>, Option<usize>) {
    let mut replies = Vec::new();
    let mut lost = None;
    let mut next = 1;
    while next <= total {
        let end = (next + batch_size - 1).min(total);
        let items: Vec<Value> = (next..=end).map(demo_item).collect();
        let reply = match replies.len() {
            2 => AgentReply::structured(json!({ "schedule": items })),
            n => {
                let mut body = Value::Array(items).to_string();
                if n == 1 && end > next {
                    body.truncate(body.len() - 25);
                    lost = Some(end);
                }
                AgentReply::raw(format!("Here is the proposed schedule:\n```json\n{body}\n```"))
            }
        };
        replies.push(Ok(if replies.is_empty() { reply.with_conversation("demo-conversation") } else { reply }));
        next = end + 1;
    }
    (replies, lost)
}

async fn run_demo(cfg: AppConfig, sessions: usize) -> anyhow::Result<()> {
    let (store, mut notifications) = InMemorySessionStore::new();
    let (scheduler, links) = ChannelScheduler::new();
    let catalog = Arc::new(InMemoryCatalog::with_count(sessions));
    let (replies, lost) = demo_replies(sessions, cfg.coordinator.batch_size);
    let agent = Arc::new(ScriptedAgent::new(replies));
    if let Some(i) = lost {
        agent.push(Ok(AgentReply::raw(json!([demo_item(i)]).to_string())));
    }

    let coordinator = Arc::new(BatchCoordinator::new(
        Collaborators {
            store: Arc::new(store),
            agent,
            counter: catalog.clone(),
            slots: catalog.clone(),
            scheduler: Arc::new(scheduler),
        },
        &cfg.coordinator,
        ResponseRecovery::new(&cfg.recovery),
    ));

    let runner = LinkRunner::new(coordinator.clone(), cfg.coordinator.link_timeout());
    tokio::spawn(runner.start(links));

    let started = coordinator
        .start_chain(StartChainRequest {
            user_message: "Propose a schedule for the unscheduled conference sessions".to_string(),
            prior_conversation_id: None,
            batch_size: None,
        })
        .await
        .context("Failed to start chain")?;
    println!("session {} started", started.session_id);

    let mut polling = cfg.polling.clone();
    polling.interval_ms = polling.interval_ms.min(200);
    let client = PollingClient::new(coordinator.clone(), polling);
    let (handle, mut events) = client.watch(started.session_id.clone());

    while let Some(event) = events.recv().await {
        match event {
            PollEvent::Progress { percent, snapshot } => println!(
                "[{percent:>3}%] {:?}: {} processed, {} remaining",
                snapshot.status,
                snapshot.total_processed,
                snapshot
                    .remaining_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string())
            ),
            PollEvent::Completed(snapshot) => {
                println!("[100%] completed: {} sessions scheduled", snapshot.total_processed)
            }
            PollEvent::Failed { error, .. } => println!("[100%] failed: {error}"),
            PollEvent::Cancelled => println!("cancelled"),
            PollEvent::TimedOut { .. } => println!("timed out waiting for the chain"),
        }
    }
    handle.wait().await;

    if let Ok(note) = notifications.try_recv() {
        tracing::info!("notification: session {} is {:?}", note.session_id, note.status);
    }
    println!("{} draft slots saved", catalog.drafts().await.len());
    Ok(())
}
