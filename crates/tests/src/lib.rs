//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（MockRenderer，无需网络）
//! - 准入控制与工作池的组合场景

#[cfg(test)]
mod contract_tests {
    use contracts::{ScanResult, Scheme, Target};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_scan_result_json_shape() {
        let result = ScanResult::failed("https://example.com", "blacklisted: test");
        let value = serde_json::to_value(&result).unwrap();
        for field in [
            "url",
            "final_url",
            "title",
            "response_code",
            "protocol",
            "content_length",
            "filename",
            "failed",
            "failed_reason",
            "probed_at",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["failed"], true);
    }

    #[test]
    fn test_target_normalization() {
        assert_eq!(
            Target::normalize("example.com", Scheme::Https)
                .unwrap()
                .as_str(),
            "https://example.com"
        );
        assert_eq!(
            Target::normalize("http://example.com/x", Scheme::Https)
                .unwrap()
                .as_str(),
            "http://example.com/x"
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use blacklist::{Blacklist, BlockReason, HostResolver};
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::{create_sinks, DispatcherError, TargetDispatcher};
    use observability::ScanMetricsAggregator;
    use probe::MockRenderer;

    fn resolver() -> HostResolver {
        let public = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
        HostResolver::fixed([
            ("app.example", vec![public]),
            ("other.example", vec![public]),
            ("down.example", vec![public]),
            ("mysql-host", vec![public]),
            ("wiki.corp.example", vec![public]),
        ])
    }

    /// End-to-end test: config -> blacklist -> dispatcher -> sinks
    ///
    /// 验证完整的数据流：
    /// 1. ConfigLoader 解析 TOML 配置
    /// 2. Blacklist 在 worker 中拦截内网/黑名单目标
    /// 3. MockRenderer 渲染允许的目标
    /// 4. SinkFanout 将结果写入 JSONL 与内存 sink
    #[tokio::test]
    async fn test_e2e_config_to_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl_path = dir.path().join("results.jsonl");

        let config = format!(
            r#"
[scan]
concurrency = 3
input_queue_capacity = 4

[blacklist]
use_defaults = false
patterns = ["10.0.0.0/8", "evil.com", ".*:3306"]

[[sinks]]
name = "mem"
sink_type = "memory"

[[sinks]]
name = "jsonl"
sink_type = "jsonl"
params = {{ path = "{}" }}
"#,
            jsonl_path.display()
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();

        let blacklist =
            Arc::new(Blacklist::with_resolver(&blueprint.blacklist, resolver()).unwrap());
        let renderer = Arc::new(MockRenderer::new().fail_host("down.example"));
        let fanout = create_sinks(&blueprint.sinks).unwrap();
        let memory = fanout.memory_reader("mem").unwrap();

        let mut dispatcher = TargetDispatcher::new(
            blueprint.scan.clone(),
            blacklist,
            Arc::clone(&renderer),
            fanout,
        )
        .unwrap();
        let submitter = dispatcher.submitter();

        let producer = tokio::spawn(async move {
            for raw in [
                "app.example",
                "https://other.example/login",
                "https://down.example/",
                "http://10.1.2.3/",
                "https://sub.evil.com/",
                "mysql-host:3306",
            ] {
                submitter.submit(raw).await.unwrap();
            }
            submitter.submit("   ").await
        });

        dispatcher.start();
        let empty = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer timed out")
            .unwrap();
        assert!(matches!(empty, Err(DispatcherError::Target(_))));

        dispatcher.close_input();
        let stats = tokio::time::timeout(Duration::from_secs(5), dispatcher.run())
            .await
            .expect("dispatcher timed out");
        dispatcher.close().await.unwrap();

        assert_eq!(stats.received, 6);
        assert_eq!(stats.rendered, 2);
        assert_eq!(stats.blocked, 3);
        assert_eq!(stats.render_failed, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(renderer.calls(), 3);
        assert!(renderer.is_closed());

        let results = memory.snapshot();
        assert_eq!(results.len(), 6);
        let blocked: Vec<_> = results
            .iter()
            .filter(|r| r.failed_reason.starts_with("blacklisted:"))
            .collect();
        assert_eq!(blocked.len(), 3);
        assert!(blocked
            .iter()
            .any(|r| r.url == "https://mysql-host:3306" && r.failed_reason.contains(".*:3306")));

        let mut aggregator = ScanMetricsAggregator::new();
        results.iter().for_each(|r| aggregator.update(r));
        let summary = aggregator.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.blacklisted, 3);

        let lines = std::fs::read_to_string(&jsonl_path).unwrap();
        assert_eq!(lines.lines().count(), 6);
        for line in lines.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["url"].is_string());
        }
    }

    /// Rules from a blacklist file apply on top of inline patterns
    #[tokio::test]
    async fn test_blacklist_file_rules() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("blacklist.txt");
        std::fs::write(&rules, "# internal\n*.corp.example\n\n203.0.113.0/24\n").unwrap();

        let config = format!(
            r#"
[blacklist]
use_defaults = false
file = "{}"
"#,
            rules.display()
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();
        let blacklist = Blacklist::with_resolver(&blueprint.blacklist, resolver()).unwrap();

        assert_eq!(blacklist.rule_count(), 2);
        let verdict = blacklist.evaluate("https://wiki.corp.example/").await;
        assert!(matches!(
            verdict.reason(),
            Some(BlockReason::Rule { rule, .. }) if rule == "*.corp.example"
        ));
        assert!(blacklist.evaluate("http://203.0.113.9/").await.is_blocked());
        assert!(!blacklist.evaluate("https://app.example/").await.is_blocked());
    }

    /// CSV and JSONL sinks fed from the same dispatch
    #[tokio::test]
    async fn test_csv_and_jsonl_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out/results.csv");
        let jsonl_path = dir.path().join("out/results.jsonl");

        let sinks = vec![
            contracts::SinkConfig::new("csv", contracts::SinkType::Csv)
                .with_param("path", csv_path.to_string_lossy().to_string()),
            contracts::SinkConfig::new("jsonl", contracts::SinkType::Jsonl)
                .with_param("path", jsonl_path.to_string_lossy().to_string()),
        ];
        let fanout = create_sinks(&sinks).unwrap();
        let blacklist = Arc::new(
            Blacklist::with_resolver(&contracts::BlacklistConfig::default(), resolver()).unwrap(),
        );

        let mut dispatcher = TargetDispatcher::new(
            contracts::DispatcherConfig::default(),
            blacklist,
            Arc::new(MockRenderer::new()),
            fanout,
        )
        .unwrap();
        dispatcher.submit("https://app.example/").await.unwrap();
        dispatcher.submit("http://127.0.0.1/").await.unwrap();
        dispatcher.close_input();
        dispatcher.run().await;
        dispatcher.close().await.unwrap();

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "URL,Title,ResponseCode,Filename,ProbedAt,FinalURL,Status"
        );
        assert_eq!(lines.count(), 2);
        assert!(csv.contains("failed: blacklisted:"));

        let jsonl = std::fs::read_to_string(&jsonl_path).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
    }

    /// Every submitted target yields a result when the renderer is slow
    #[tokio::test]
    async fn test_slow_renderer_bounded_pool() {
        let mut fanout = dispatcher::SinkFanout::new();
        let memory = fanout.add_memory(dispatcher::MemorySink::new("mem"), 4);
        let renderer = Arc::new(MockRenderer::new().with_delay(Duration::from_millis(10)));
        let blacklist = Arc::new(Blacklist::from_config(&contracts::BlacklistConfig::disabled()).unwrap());

        let config = contracts::DispatcherConfig {
            concurrency: 4,
            input_queue_capacity: 2,
            result_queue_capacity: 2,
            ..Default::default()
        };
        let mut dispatcher =
            TargetDispatcher::new(config, blacklist, Arc::clone(&renderer), fanout).unwrap();
        dispatcher.start();

        for i in 0..40 {
            dispatcher
                .submit(&format!("https://host{i}.example/"))
                .await
                .unwrap();
        }
        dispatcher.close_input();
        let stats = tokio::time::timeout(Duration::from_secs(10), dispatcher.run())
            .await
            .expect("dispatcher timed out");
        dispatcher.close().await.unwrap();

        assert_eq!(stats.rendered, 40);
        assert_eq!(memory.len(), 40);
        assert!(renderer.max_in_flight() <= 4);
    }
}

#[cfg(test)]
mod admission_tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use admission::{Admission, AdmissionController};
    use blacklist::{Blacklist, HostResolver};
    use contracts::{AdmissionConfig, BlacklistConfig, Renderer, Target};
    use probe::MockRenderer;
    use tokio::time::{sleep, timeout, Instant};

    /// max_concurrent=2, max_queue=1, four callers
    #[tokio::test]
    async fn test_admission_two_admitted_one_queued_one_rejected() {
        let controller = AdmissionController::new(AdmissionConfig {
            max_concurrent: 2,
            max_queue: 1,
            acquire_timeout_ms: 5000,
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);

        let first = controller.acquire(deadline).await.into_permit().unwrap();
        let second = controller.acquire(deadline).await.into_permit().unwrap();

        let waiter = controller.clone();
        let third = tokio::spawn(async move { waiter.acquire(deadline).await });

        timeout(Duration::from_secs(2), async {
            while controller.stats().waiting < 1 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("third caller never queued");

        let fourth = controller.acquire(deadline).await;
        assert!(matches!(fourth, Admission::RejectedFull));
        assert_eq!(fourth.status_code(), Some(429));

        first.release();
        let third = third.await.unwrap();
        assert!(third.is_admitted());

        drop(third);
        second.release();
        let stats = controller.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
    }

    /// Admission caps concurrent renders across independent requests
    #[tokio::test]
    async fn test_admission_gates_renderer() {
        let controller = AdmissionController::new(AdmissionConfig {
            max_concurrent: 2,
            max_queue: 16,
            acquire_timeout_ms: 5000,
        })
        .unwrap();
        let renderer = Arc::new(MockRenderer::new().with_delay(Duration::from_millis(20)));
        let blacklist = Arc::new(
            Blacklist::with_resolver(
                &BlacklistConfig::default(),
                HostResolver::fixed([(
                    "app.example",
                    vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))],
                )]),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..10 {
            let controller = controller.clone();
            let renderer = Arc::clone(&renderer);
            let blacklist = Arc::clone(&blacklist);
            handles.push(tokio::spawn(async move {
                let Some(permit) = controller
                    .acquire(controller.default_deadline())
                    .await
                    .into_permit()
                else {
                    return false;
                };
                let url = format!("https://app.example/{i}");
                if blacklist.evaluate(&url).await.is_blocked() {
                    return false;
                }
                let ok = renderer.render(&Target::from_url(url)).await.is_ok();
                permit.release();
                ok
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(renderer.calls(), 10);
        assert!(renderer.max_in_flight() <= 2);
        assert_eq!(controller.stats().active, 0);
    }
}
