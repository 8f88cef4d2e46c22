use async_trait::async_trait;
use kubehandler::{
    DispatchContext, EventHandler, EventLoop, EventLoopConfig, InMemoryInformer, Informer,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "kubehandler.toml";

/// 只记录日志的 Pod 处理器；回调从通知源缓存中读取对象当前状态
struct PodLogger {
    informer: Arc<InMemoryInformer<Value>>,
}

impl PodLogger {
    fn phase(&self, namespace: &str, name: &str) -> Option<String> {
        let pod = self.informer.get(&format!("{namespace}/{name}"))?;
        pod.pointer("/status/phase")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl EventHandler for PodLogger {
    fn name(&self) -> &str {
        "Pod"
    }

    fn informer(&self) -> Arc<dyn Informer> {
        self.informer.clone()
    }

    async fn on_add(&self, ctx: &DispatchContext, namespace: &str, name: &str) -> anyhow::Result<()> {
        info!(namespace, name, retries = ctx.retries, phase = ?self.phase(namespace, name), "pod added");
        Ok(())
    }

    async fn on_update(
        &self,
        ctx: &DispatchContext,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        let phase = self.phase(namespace, name);
        if phase.as_deref() == Some("Unknown") && ctx.retries < 2 {
            anyhow::bail!("pod {namespace}/{name} not ready yet");
        }
        info!(namespace, name, retries = ctx.retries, ?phase, "pod updated");
        Ok(())
    }

    async fn on_delete(
        &self,
        _ctx: &DispatchContext,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        info!(namespace, name, "pod deleted");
        Ok(())
    }
}

fn pod(namespace: &str, name: &str, version: u64, phase: &str) -> Value {
    json!({
        "metadata": {
            "namespace": namespace,
            "name": name,
            "resourceVersion": version.to_string(),
        },
        "status": { "phase": phase },
    })
}

/// 模拟集群通知：初始列表、若干变更与周期性 resync
async fn feed(informer: Arc<InMemoryInformer<Value>>, token: CancellationToken) {
    for name in ["web-0", "web-1"] {
        if let Err(err) = informer.add(pod("default", name, 1, "Pending")) {
            warn!(error = %err, name, "failed to add pod");
        }
    }
    informer.mark_synced();

    let mut version = 1;
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        version += 1;
        let phase = if version % 3 == 0 { "Unknown" } else { "Running" };
        if let Err(err) = informer.update(pod("default", "web-0", version, phase)) {
            warn!(error = %err, "failed to update pod");
        }
        informer.resync();

        if version == 5 {
            informer.delete("default/web-1");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::var("KUBEHANDLER_CONFIG").ok().or_else(|| {
        Path::new(DEFAULT_CONFIG)
            .exists()
            .then(|| DEFAULT_CONFIG.to_string())
    });
    let config = EventLoopConfig::load(path.as_deref())?;
    info!(?config, "configuration loaded");

    let informer = Arc::new(InMemoryInformer::<Value>::new());
    let event_loop = EventLoop::with_config(config.queue.clone())?;
    event_loop.register(Arc::new(PodLogger {
        informer: informer.clone(),
    }))?;

    let token = CancellationToken::new();
    tokio::spawn(feed(informer, token.clone()));
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received ctrl-c, shutting down");
            }
            token.cancel();
        });
    }

    event_loop.run(config.threadiness, token).await?;
    info!("event loop stopped");
    Ok(())
}
