use async_trait::async_trait;
use kubehandler::workqueue::{EventType, WorkQueueConfig};
use kubehandler::{
    DispatchContext, EventHandler, EventLoop, EventLoopError, InMemoryInformer, Informer,
    ObjectRef,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(name: &str) -> WorkQueueConfig {
    let mut config = WorkQueueConfig::named(name);
    config.sync_poll_interval_ms = 5;
    config.shutdown_grace_ms = 2_000;
    config.rate_limiter.base_delay_ms = 20;
    config
}

type Call = (EventType, String, String, u32);

/// 记录所有回调；前 `failures` 次调用返回错误
struct RecordingHandler {
    kind: String,
    informer: Arc<InMemoryInformer<ObjectRef>>,
    calls: mpsc::UnboundedSender<Call>,
    failures: AtomicUsize,
}

impl RecordingHandler {
    fn new(
        kind: &str,
        informer: Arc<InMemoryInformer<ObjectRef>>,
        failures: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            kind: kind.to_string(),
            informer,
            calls: tx,
            failures: AtomicUsize::new(failures),
        });
        (handler, rx)
    }

    fn record(&self, ctx: &DispatchContext, namespace: &str, name: &str) -> anyhow::Result<()> {
        let _ = self.calls.send((
            ctx.event_type,
            namespace.to_string(),
            name.to_string(),
            ctx.retries,
        ));
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("transient failure for {namespace}/{name}");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.kind
    }

    fn informer(&self) -> Arc<dyn Informer> {
        self.informer.clone()
    }

    async fn on_add(&self, ctx: &DispatchContext, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.record(ctx, namespace, name)
    }

    async fn on_update(
        &self,
        ctx: &DispatchContext,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        self.record(ctx, namespace, name)
    }

    async fn on_delete(
        &self,
        ctx: &DispatchContext,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        self.record(ctx, namespace, name)
    }
}

fn spawn_loop(
    event_loop: Arc<EventLoop>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<Result<(), EventLoopError>> {
    tokio::spawn(async move { event_loop.run(2, token).await })
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback should fire")
        .expect("channel open")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Call>) {
    let extra = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(extra.is_err(), "unexpected callback: {extra:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pod_add_is_handled_exactly_once() {
    init_test_logging();
    let informer = Arc::new(InMemoryInformer::<ObjectRef>::new());
    let (handler, mut rx) = RecordingHandler::new("Pod", informer.clone(), 0);

    let event_loop = Arc::new(EventLoop::with_config(config("pods")).unwrap());
    event_loop.register(handler).unwrap();
    informer.mark_synced();

    let token = CancellationToken::new();
    let run = spawn_loop(event_loop.clone(), token.clone());

    informer.add(ObjectRef::new("ns1", "pod-a").with_resource_version("1")).unwrap();
    assert_eq!(
        next(&mut rx).await,
        (EventType::Add, "ns1".to_string(), "pod-a".to_string(), 0)
    );
    assert_quiet(&mut rx).await;

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resync_of_unchanged_objects_is_not_enqueued() {
    init_test_logging();
    let informer = Arc::new(InMemoryInformer::<ObjectRef>::new());
    informer.add(ObjectRef::new("ns1", "pod-a").with_resource_version("7")).unwrap();
    let (handler, mut rx) = RecordingHandler::new("Pod", informer.clone(), 0);

    let event_loop = Arc::new(EventLoop::with_config(config("resync")).unwrap());
    event_loop.register(handler).unwrap();
    informer.mark_synced();

    let token = CancellationToken::new();
    let run = spawn_loop(event_loop.clone(), token.clone());

    // 订阅时回放的现有对象
    assert_eq!(next(&mut rx).await.0, EventType::Add);

    informer.resync();
    assert_eq!(event_loop.work_queue().len(), 0);
    assert_quiet(&mut rx).await;

    informer.update(ObjectRef::new("ns1", "pod-a").with_resource_version("8")).unwrap();
    assert_eq!(next(&mut rx).await.0, EventType::Update);

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_handler_is_retried_then_succeeds() {
    init_test_logging();
    let informer = Arc::new(InMemoryInformer::<ObjectRef>::new());
    let (handler, mut rx) = RecordingHandler::new("Pod", informer.clone(), 1);

    let event_loop = Arc::new(EventLoop::with_config(config("retry")).unwrap());
    event_loop.register(handler).unwrap();
    informer.mark_synced();

    let token = CancellationToken::new();
    let run = spawn_loop(event_loop.clone(), token.clone());

    informer.add(ObjectRef::new("ns1", "pod-a")).unwrap();

    let first = next(&mut rx).await;
    let second = next(&mut rx).await;
    assert_eq!((first.0, first.3), (EventType::Add, 0));
    assert_eq!((second.0, second.3), (EventType::Add, 1));
    assert_quiet(&mut rx).await;
    assert_eq!(event_loop.work_queue().queue().num_requeues("add:Pod:ns1/pod-a"), 0);

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_for_other_kinds_do_not_reach_the_handler() {
    init_test_logging();
    let pods = Arc::new(InMemoryInformer::<ObjectRef>::new());
    let (handler, mut rx) = RecordingHandler::new("Pod", pods.clone(), 0);

    let event_loop = Arc::new(EventLoop::with_config(config("kinds")).unwrap());
    event_loop.register(handler).unwrap();
    pods.mark_synced();

    let token = CancellationToken::new();
    let run = spawn_loop(event_loop.clone(), token.clone());

    event_loop
        .work_queue()
        .enqueue_add("Service", &ObjectRef::new("ns1", "svc"));
    pods.add(ObjectRef::new("ns1", "pod-b")).unwrap();

    let call = next(&mut rx).await;
    assert_eq!((call.0, call.2.as_str()), (EventType::Add, "pod-b"));
    assert_quiet(&mut rx).await;

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancellation_before_sync_reports_timeout() {
    let informer = Arc::new(InMemoryInformer::<ObjectRef>::new());
    let (handler, _rx) = RecordingHandler::new("Pod", informer.clone(), 0);

    let event_loop = EventLoop::with_config(config("unsynced")).unwrap();
    event_loop.register(handler).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = event_loop.run(1, token).await.unwrap_err();
    assert!(err.to_string().contains("failed to wait for caches to sync"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_returns_promptly_when_idle() {
    init_test_logging();
    let informer = Arc::new(InMemoryInformer::<ObjectRef>::new());
    let (handler, _rx) = RecordingHandler::new("Pod", informer.clone(), 0);

    let event_loop = Arc::new(EventLoop::with_config(config("idle")).unwrap());
    event_loop.register(handler).unwrap();
    informer.mark_synced();

    let token = CancellationToken::new();
    let run = spawn_loop(event_loop.clone(), token.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("run should return after cancellation")
        .unwrap()
        .unwrap();
    assert!(event_loop.work_queue().queue().shutting_down());
}
