//! 分发流水线集成测试

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use hive::config::AppConfig;
    use hive::dispatch::{Dispatcher, Outcome, PollConfig, PollingClient, ResponseStore, WorkerPool};
    use hive::llm::mock::{
        ConcurrencyProbe, FailingBackend, PanickingBackend, RecordingBackend, StallingBackend,
    };
    use hive::llm::{CompletionBackend, ModelParameters, RetryPolicy};
    use hive::{ChatError, ChatService};
    use tokio::time::Instant;

    fn config(workers: usize) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.dispatch.workers = workers;
        cfg.dispatch.max_attempts = 3;
        cfg.dispatch.retry_delay_ms = 0;
        cfg.dispatch.poll_max_attempts = 500;
        cfg.dispatch.poll_interval_ms = 10;
        cfg
    }

    fn service(cfg: AppConfig, backend: Arc<dyn CompletionBackend>) -> ChatService {
        ChatService::builder(cfg)
            .with_backend(backend)
            .build()
            .with_defaults()
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_memory_reaches_next_prompt() {
        let backend = Arc::new(RecordingBackend::new("晴天"));
        let svc = service(config(2), backend.clone());

        let reply = svc.process_task("1", "chat", "北京天气怎么样").await.unwrap();
        assert_eq!(reply, "晴天");

        let first = backend.last_user_message().unwrap();
        assert!(!first.contains("历史对话记录"));
        assert!(first.ends_with("当前用户的输入为：北京天气怎么样"));

        svc.process_task("1", "chat", "明天呢").await.unwrap();
        let second = backend.last_user_message().unwrap();
        assert!(second.contains("历史对话记录：\n历史记录 1:\n输入: 北京天气怎么样\n输出: 晴天"));
        assert!(second.ends_with("当前用户的输入为：明天呢"));

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn test_hundred_requests_ten_callers_four_workers() {
        let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(5)));
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::with_backend(
            4,
            rx,
            Arc::clone(&store),
            probe.clone(),
            RetryPolicy::new(1, Duration::from_secs(5)),
        );
        let poller = PollingClient::new(Arc::clone(&store), PollConfig::new(2000, Duration::from_millis(5)));

        let callers: Vec<_> = (0..10)
            .map(|caller| {
                let dispatcher = dispatcher.clone();
                let poller = poller.clone();
                tokio::spawn(async move {
                    let mut delivered = Vec::new();
                    for i in 0..10 {
                        let input = format!("caller{caller}-req{i}");
                        let id = dispatcher
                            .submit(&format!("caller{caller}"), "", input.clone(), ModelParameters::default())
                            .unwrap();
                        let result = poller.wait(&id).await;
                        assert_eq!(result.correlation_id, id);
                        // 结果必须属于发起它的请求
                        assert_eq!(result.outcome, Outcome::Success(input));
                        delivered.push(id);
                    }
                    delivered
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for caller in callers {
            for id in caller.await.unwrap() {
                assert!(ids.insert(id), "duplicate correlation id delivered");
            }
        }

        assert_eq!(ids.len(), 100);
        assert_eq!(probe.calls(), 100);
        assert!(probe.peak() <= 4, "peak concurrency {} exceeds pool size", probe.peak());
        assert!(store.is_empty());
        assert_eq!(pool.stats().succeeded, 100);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_always_failing_backend_tries_exactly_r_times() {
        let backend = Arc::new(FailingBackend::new());
        let svc = service(config(1), backend.clone());

        let err = svc.process_task("1", "chat", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::BackendFailure(_)));
        assert_eq!(backend.calls(), 3);

        let stats = svc.worker_stats().unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.backend_attempts, 3);
        assert!(svc.memory_snapshot("1").await.unwrap().is_empty());
        svc.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalling_backend_times_out_after_poll_budget() {
        let mut cfg = config(1);
        cfg.dispatch.poll_max_attempts = 5;
        cfg.dispatch.poll_interval_ms = 100;
        let backend = Arc::new(StallingBackend::new());
        let svc = service(cfg, backend.clone());

        let start = Instant::now();
        let err = svc.process_task("1", "chat", "hi").await.unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(matches!(err, ChatError::Timeout { waited_ms: 500, .. }));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_agent_tasks_are_serialized() {
        let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(20)));
        let svc = service(config(4), probe.clone());

        let (a, b) = tokio::join!(
            svc.process_task("1", "chat", "第一个"),
            svc.process_task("1", "chat", "第二个"),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(probe.peak(), 1);
        assert_eq!(svc.memory_snapshot("1").await.unwrap().len(), 2);

        let (a, b) = tokio::join!(
            svc.process_task("2", "chat", "x"),
            svc.process_task("3", "chat", "y"),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(probe.peak(), 2);
        svc.shutdown().await;
    }

    #[tokio::test]
    async fn test_panic_in_backend_is_isolated() {
        let svc = service(config(1), Arc::new(PanickingBackend::new("炸")));

        let err = svc.process_task("1", "chat", "炸").await.unwrap_err();
        assert!(matches!(err, ChatError::BackendFailure(_)));
        let reply = svc.process_task("1", "chat", "正常问题").await.unwrap();
        assert!(reply.starts_with("ok: "));
        svc.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_results_are_swept() {
        let mut cfg = config(1);
        cfg.dispatch.result_ttl_secs = Some(1);
        cfg.dispatch.sweep_interval_secs = 1;
        let svc = service(cfg, Arc::new(RecordingBackend::new("ok")));

        let store = Arc::clone(svc.dispatcher().store());
        let id = svc.dispatcher().submit_canned("1", "没人来取");
        assert!(store.contains(&id));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!store.contains(&id));
        svc.shutdown().await;
    }
}
