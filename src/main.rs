//! Hive - 多智能体对话编排
//!
//! 入口：初始化日志、加载配置、创建对话服务，然后在标准输入上运行交互循环。

use std::path::PathBuf;

use anyhow::Context;
use hive::config::{load_config, AppConfig};
use hive::{ChatService, DEFAULT_GROUP_ID};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
命令：
  /agent <id>          切换当前智能体
  /remove <id>         注销智能体并移出群组
  /task <name>         切换任务模板（默认 chat）
  /group <消息>         在默认群组中以当前智能体发起群聊
  /summary [n]         查看最近 n 条群聊
  /discuss <任务>       智能体 1 与 2 讨论任务
  /model <name>        切换模型
  /temp <x>            调整温度
  /learn <文本>         加入知识库（需启用检索）
  /export              导出当前智能体记忆
  /stats               工作者统计
  /quit                退出
其他输入直接交给当前智能体处理。";

struct Session {
    agent_id: String,
    task: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let service = ChatService::from_config(cfg)
        .context("Failed to create chat service")?
        .with_defaults()
        .context("Failed to register default agents")?;

    println!("{HELP}");
    let mut session = Session {
        agent_id: "1".to_string(),
        task: "chat".to_string(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_line(&service, &mut session, line).await {
                    break;
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

/// 处理一行输入；返回 false 表示退出
async fn handle_line(service: &ChatService, session: &mut Session, line: &str) -> bool {
    let (command, arg) = match line.strip_prefix('/') {
        Some(rest) => {
            let mut parts = rest.splitn(2, ' ');
            let command = parts.next().unwrap_or_default();
            (Some(command), parts.next().unwrap_or_default().trim())
        }
        None => (None, line),
    };

    match command {
        None => match service.process_task(&session.agent_id, &session.task, arg).await {
            Ok(reply) => println!("[{}] {}", session.agent_id, reply),
            Err(e) => {
                tracing::debug!(error = %e, "Task failed");
                println!("[{}] {}", session.agent_id, e.user_message());
            }
        },
        Some("quit") | Some("exit") => return false,
        Some("help") => println!("{HELP}"),
        Some("agent") => {
            if service.agent_ids().iter().any(|id| id == arg) {
                session.agent_id = arg.to_string();
                println!("当前智能体: {arg}");
            } else {
                println!("智能体不存在，可选: {}", service.agent_ids().join(", "));
            }
        }
        Some("remove") if !arg.is_empty() => match service.remove_agent(arg) {
            Ok(()) => {
                println!("已注销智能体: {arg}");
                if session.agent_id == arg {
                    if let Some(next) = service.agent_ids().into_iter().next() {
                        println!("当前智能体: {next}");
                        session.agent_id = next;
                    }
                }
            }
            Err(e) => println!("{}", e.user_message()),
        },
        Some("task") if !arg.is_empty() => {
            session.task = arg.to_string();
            println!("当前任务: {arg}");
        }
        Some("group") if !arg.is_empty() => {
            match service
                .group_chat(DEFAULT_GROUP_ID, &session.agent_id, arg, &session.task)
                .await
            {
                Ok(replies) => {
                    for reply in replies {
                        println!("[{}] {}", reply.agent_id, reply.display_text());
                    }
                }
                Err(e) => println!("{}", e.user_message()),
            }
        }
        Some("summary") => {
            let last_n = arg.parse().unwrap_or(10);
            match service.summarize_chat(DEFAULT_GROUP_ID, last_n) {
                Ok(summary) => println!("{summary}"),
                Err(e) => println!("{}", e.user_message()),
            }
        }
        Some("discuss") if !arg.is_empty() => match service.discuss("1", "2", arg, 1).await {
            Ok(discussion) => {
                println!("{}", discussion.transcript());
                println!("最终方案：{}", discussion.final_solution);
            }
            Err(e) => println!("{}", e.user_message()),
        },
        Some("model") if !arg.is_empty() => service.set_model(arg).await,
        Some("temp") => match arg.parse::<f32>() {
            Ok(t) => service.set_temperature(t).await,
            Err(_) => println!("温度需为数字"),
        },
        Some("learn") if !arg.is_empty() => match service.knowledge_base() {
            Some(kb) => println!("已加入 {} 个片段", kb.add_documents([arg])),
            None => println!("未启用知识检索（[retrieval] enabled = true）"),
        },
        Some("export") => match service.export_memory(&session.agent_id, None).await {
            Ok(path) => println!("已导出到 {}", path.display()),
            Err(e) => println!("{}", e.user_message()),
        },
        Some("stats") => {
            if let Some(stats) = service.worker_stats() {
                println!(
                    "processed={} succeeded={} failed={} backend_attempts={}",
                    stats.processed, stats.succeeded, stats.failed, stats.backend_attempts
                );
            }
        }
        Some(_) => println!("{HELP}"),
    }
    true
}
