//! 投递客户端 - 有界重试与最终失败持久化
//!
//! 每次逻辑发送的状态机：
//!
//! ```text
//! Attempting(0) ──失败──▶ 等待 10s ──▶ Attempting(1) ──失败──▶ 等待 10s ──▶ Attempting(2)
//!      │                                   │                                   │
//!    成功                                 成功                          成功 / 失败
//!      ▼                                   ▼                                   ▼
//!  Delivered                           Delivered                 Delivered / Abandoned
//! ```
//!
//! Abandoned 时把内容写入唯一的待重发槽位（覆盖旧值）。
//! 调用方拿到的是 `JoinHandle`，不等待也不影响投递。

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::store::{PersistentStore, PENDING_MESSAGE_KEY};
use super::webhook::{DeliveryError, WebhookTransport};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（首发 + 重试）
    pub max_attempts: u32,
    /// 两次尝试之间的固定间隔
    pub retry_delay: Duration,
    /// 单次尝试的超时
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// 一次逻辑发送中的当前尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub content: String,
    /// 从 0 开始
    pub attempt: u32,
}

/// 逻辑发送的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 已送达
    Delivered { attempts: u32 },
    /// 重试耗尽，内容已写入待重发槽位
    Abandoned { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

pub type DeliveryHandle = JoinHandle<DeliveryOutcome>;

/// 投递客户端
#[derive(Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn WebhookTransport>,
    store: Arc<dyn PersistentStore>,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn WebhookTransport>, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            transport,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 异步发送（spawn 后立即返回）
    ///
    /// 必须在 tokio runtime 内调用
    pub fn send(&self, content: impl Into<String>) -> DeliveryHandle {
        let client = self.clone();
        let content = content.into();
        tokio::spawn(async move { client.deliver(content).await })
    }

    /// 在同一个任务中依次发送多条消息，保证先后顺序
    pub fn send_sequence(&self, contents: Vec<String>) -> JoinHandle<Vec<DeliveryOutcome>> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(contents.len());
            for content in contents {
                outcomes.push(client.deliver(content).await);
            }
            outcomes
        })
    }

    /// 执行一次完整的逻辑发送（含重试）
    pub async fn deliver(&self, content: String) -> DeliveryOutcome {
        let mut record = DeliveryRecord { content, attempt: 0 };

        loop {
            match self.attempt(&record.content).await {
                Ok(()) => {
                    info!(attempt = record.attempt, "Message delivered");
                    return DeliveryOutcome::Delivered {
                        attempts: record.attempt + 1,
                    };
                }
                Err(e) if record.attempt + 1 < self.policy.max_attempts => {
                    warn!(
                        attempt = record.attempt,
                        error = %e,
                        retry_in_secs = self.policy.retry_delay.as_secs(),
                        "Delivery failed, will retry"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                    record.attempt += 1;
                }
                Err(e) => {
                    error!(attempt = record.attempt, error = %e, "Delivery abandoned, saving as pending");
                    self.persist_pending(&record.content).await;
                    return DeliveryOutcome::Abandoned {
                        attempts: record.attempt + 1,
                    };
                }
            }
        }
    }

    async fn attempt(&self, content: &str) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.policy.attempt_timeout, self.transport.post(content)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    /// 文件存储会持锁做阻塞 I/O，放到 blocking 线程池执行
    async fn persist_pending(&self, content: &str) {
        let store = self.store.clone();
        let content = content.to_string();
        let result =
            tokio::task::spawn_blocking(move || store.put_string(PENDING_MESSAGE_KEY, &content)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to persist pending message"),
            Err(e) => error!(error = %e, "Pending message write task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::store::MemoryStore;
    use crate::relay::webhook::TransportFuture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 前 N 次失败、之后成功的 mock 传输
    struct FlakyTransport {
        failures_remaining: AtomicU32,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FlakyTransport {
        fn new(fail_count: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(fail_count),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl WebhookTransport for FlakyTransport {
        fn post<'a>(&'a self, _content: &'a str) -> TransportFuture<'a> {
            Box::pin(async move {
                self.attempts.lock().unwrap().push(Instant::now());
                let remaining = self.failures_remaining.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                    Err(DeliveryError::Status(503))
                } else {
                    Ok(())
                }
            })
        }
    }

    /// 永不返回的传输
    struct HangingTransport;

    impl WebhookTransport for HangingTransport {
        fn post<'a>(&'a self, _content: &'a str) -> TransportFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn client(transport: Arc<dyn WebhookTransport>, store: Arc<MemoryStore>) -> DeliveryClient {
        DeliveryClient::new(transport, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let transport = Arc::new(FlakyTransport::new(0));
        let store = Arc::new(MemoryStore::new());

        let outcome = client(transport.clone(), store.clone()).send("hi").await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(transport.attempt_times().len(), 1);
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let transport = Arc::new(FlakyTransport::new(2));
        let store = Arc::new(MemoryStore::new());

        let outcome = client(transport.clone(), store.clone()).send("hi").await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_three_attempts_then_pending() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX));
        let store = Arc::new(MemoryStore::new());

        let outcome = client(transport.clone(), store.clone()).send("lost message").await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Abandoned { attempts: 3 });
        let times = transport.attempt_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(10));
        }
        assert_eq!(
            store.get_string(PENDING_MESSAGE_KEY).unwrap(),
            Some("lost message".to_string())
        );
    }

    /// 记录写入发生在哪个线程的存储
    #[derive(Default)]
    struct ThreadRecordingStore {
        inner: MemoryStore,
        writer_threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl PersistentStore for ThreadRecordingStore {
        fn get_string(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get_string(key)
        }
        fn put_string(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.writer_threads.lock().unwrap().push(std::thread::current().id());
            self.inner.put_string(key, value)
        }
        fn get_i64(&self, key: &str) -> anyhow::Result<Option<i64>> {
            self.inner.get_i64(key)
        }
        fn put_i64(&self, key: &str, value: i64) -> anyhow::Result<()> {
            self.inner.put_i64(key, value)
        }
        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_write_runs_off_the_runtime_thread() {
        let store = Arc::new(ThreadRecordingStore::default());
        let client = DeliveryClient::new(Arc::new(FlakyTransport::new(u32::MAX)), store.clone());

        let outcome = client.send("offline").await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Abandoned { attempts: 3 });
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("offline".to_string()));
        // current_thread runtime 的任务跑在测试线程上，写入必须在别的线程
        let writers = store.writer_threads.lock().unwrap().clone();
        assert_eq!(writers.len(), 1);
        assert_ne!(writers[0], std::thread::current().id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_failure_overwrites_pending() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX));
        let store = Arc::new(MemoryStore::new());
        let client = client(transport, store.clone());

        client.send("A").await.unwrap();
        client.send("B").await.unwrap();

        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("B".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_does_not_clear_other_pending() {
        let store = Arc::new(MemoryStore::new());
        store.put_string(PENDING_MESSAGE_KEY, "older").unwrap();

        client(Arc::new(FlakyTransport::new(0)), store.clone()).send("new").await.unwrap();

        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("older".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out() {
        let store = Arc::new(MemoryStore::new());
        let outcome = client(Arc::new(HangingTransport), store.clone()).send("stuck").await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Abandoned { attempts: 3 });
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("stuck".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_sequence_preserves_order() {
        struct Recording(Mutex<Vec<String>>);
        impl WebhookTransport for Recording {
            fn post<'a>(&'a self, content: &'a str) -> TransportFuture<'a> {
                Box::pin(async move {
                    self.0.lock().unwrap().push(content.to_string());
                    Ok(())
                })
            }
        }

        let transport = Arc::new(Recording(Mutex::new(Vec::new())));
        let client = client(transport.clone(), Arc::new(MemoryStore::new()));

        let outcomes = client
            .send_sequence(vec!["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert!(outcomes.iter().all(DeliveryOutcome::is_delivered));
        assert_eq!(*transport.0.lock().unwrap(), vec!["first", "second"]);
    }
}
