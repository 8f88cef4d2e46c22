//! 限速去重队列（RateLimitingQueue）
//!
//! - 待处理集合去重：同一条目在被取走之前至多存在一份；
//! - 处理中集合互斥：条目被某个 worker 取走后，在 `done` 之前不会再次被取出，
//!   期间再次入队只会标记为 dirty，待 `done` 时重新排队；
//! - 延迟调度：`add_after`/`add_rate_limited` 按限速器给出的时长延迟入队，
//!   同一条目多次延迟时保留更早的就绪时间；已排队且未在处理中的条目不再安排定时器；
//! - 重试计数：只有 `requeue`（处理失败后的重新入队）计数，重复通知不计；
//! - 关闭后不再接受新条目，阻塞中的 `get` 立即返回。
//!
//! 队列状态只在内部锁内修改，调用方无需额外同步。
//!
use crate::config::WorkQueueConfig;
use crate::rate_limiter::{RateLimiter, default_controller_rate_limiter};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    waiting: HashMap<String, Instant>,
    requeues: HashMap<String, u32>,
    shutting_down: bool,
}

struct Inner {
    name: String,
    state: Mutex<State>,
    // 有新条目或进入关闭状态
    ready: Notify,
    // 关闭后处理中集合清空
    drained: Notify,
    rate_limiter: Box<dyn RateLimiter>,
    timers: CancellationToken,
}

/// 限速去重队列；克隆得到的是同一队列的句柄
#[derive(Clone)]
pub struct RateLimitingQueue {
    inner: Arc<Inner>,
}

impl RateLimitingQueue {
    pub fn new(name: impl Into<String>, rate_limiter: impl RateLimiter + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::default()),
                ready: Notify::new(),
                drained: Notify::new(),
                rate_limiter: Box::new(rate_limiter),
                timers: CancellationToken::new(),
            }),
        }
    }

    /// 使用控制器默认限速器创建队列
    pub fn with_config(config: &WorkQueueConfig) -> Self {
        Self::new(
            config.name.clone(),
            default_controller_rate_limiter(&config.rate_limiter),
        )
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // 已排队且不在处理中：再次入队只是重复通知
    fn is_pending(st: &State, item: &str) -> bool {
        st.dirty.contains(item) && !st.processing.contains(item)
    }

    /// 立即入队
    pub fn add(&self, item: impl Into<String>) {
        let item = item.into();
        {
            let mut st = self.inner.state.lock();
            if st.shutting_down {
                trace!(queue = %self.inner.name, %item, "queue is shutting down, item dropped");
                return;
            }
            if st.dirty.contains(&item) {
                trace!(queue = %self.inner.name, %item, "item already pending");
                return;
            }
            st.dirty.insert(item.clone());
            if st.processing.contains(&item) {
                // 等待 done 时重新排队
                return;
            }
            st.queue.push_back(item);
        }
        self.inner.ready.notify_one();
    }

    /// 延迟 `delay` 后入队
    pub fn add_after(&self, item: impl Into<String>, delay: Duration) {
        let item = item.into();
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let now = Instant::now();
        let ready_at = now.checked_add(delay).unwrap_or_else(|| far_future(now));
        {
            let mut st = self.inner.state.lock();
            if st.shutting_down || Self::is_pending(&st, &item) {
                return;
            }
            if let Some(existing) = st.waiting.get(&item) {
                if *existing <= ready_at {
                    return;
                }
            }
            st.waiting.insert(item.clone(), ready_at);
        }

        debug!(queue = %self.inner.name, %item, ?delay, "item scheduled");
        let queue = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let timers = self.inner.timers.clone();
                handle.spawn(async move {
                    tokio::select! {
                        _ = timers.cancelled() => {}
                        _ = tokio::time::sleep_until(ready_at) => queue.fire(&item, ready_at),
                    }
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(ready_at.saturating_duration_since(Instant::now()));
                    queue.fire(&item, ready_at);
                });
            }
        }
    }

    // 只有仍持有该就绪时间的定时器才真正入队，被更早定时器取代的直接放弃
    fn fire(&self, item: &str, ready_at: Instant) {
        {
            let mut st = self.inner.state.lock();
            if st.waiting.get(item) != Some(&ready_at) {
                return;
            }
            st.waiting.remove(item);
        }
        self.add(item);
    }

    /// 按限速器给出的时长延迟入队；条目已排队时直接忽略，不消耗退避额度
    pub fn add_rate_limited(&self, item: impl Into<String>) {
        let item = item.into();
        {
            let st = self.inner.state.lock();
            if st.shutting_down || Self::is_pending(&st, &item) {
                trace!(queue = %self.inner.name, %item, "item already pending");
                return;
            }
        }
        let delay = self.inner.rate_limiter.when(&item);
        self.add_after(item, delay);
    }

    /// 取出下一个条目；队列关闭且已清空时返回 `None`
    ///
    /// 取消安全：未完成的 future 被丢弃时不会丢失条目。
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.inner.state.lock();
                if let Some(item) = st.queue.pop_front() {
                    st.dirty.remove(&item);
                    st.processing.insert(item.clone());
                    return Some(item);
                }
                if st.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// 标记条目处理完毕；处理期间再次入队的条目此时重新排队
    pub fn done(&self, item: &str) {
        let (requeued, drained) = {
            let mut st = self.inner.state.lock();
            st.processing.remove(item);
            let requeued = st.dirty.contains(item);
            if requeued {
                st.queue.push_back(item.to_string());
            }
            (requeued, st.shutting_down && st.processing.is_empty())
        };

        if requeued {
            self.inner.ready.notify_one();
        }
        if drained {
            self.inner.drained.notify_waiters();
        }
    }

    /// 处理失败后重新入队：重试计数加一，并按退避延迟
    pub fn requeue(&self, item: &str) {
        {
            let mut st = self.inner.state.lock();
            if st.shutting_down {
                return;
            }
            *st.requeues.entry(item.to_string()).or_insert(0) += 1;
        }
        self.add_rate_limited(item);
    }

    /// 清空条目的重试计数与退避历史
    pub fn forget(&self, item: &str) {
        self.inner.state.lock().requeues.remove(item);
        self.inner.rate_limiter.forget(item);
    }

    /// 条目因处理失败被重新入队的次数
    pub fn num_requeues(&self, item: &str) -> u32 {
        self.inner.state.lock().requeues.get(item).copied().unwrap_or(0)
    }

    /// 当前待处理条目数（不含延迟中与处理中的条目）
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 处理中条目数
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().processing.len()
    }

    /// 关闭队列：拒绝新条目，取消延迟定时器，唤醒所有阻塞的 `get`
    pub fn shut_down(&self) {
        {
            let mut st = self.inner.state.lock();
            if st.shutting_down {
                return;
            }
            st.shutting_down = true;
            st.waiting.clear();
        }
        debug!(queue = %self.inner.name, "shutting down queue");
        self.inner.timers.cancel();
        self.inner.ready.notify_waiters();
    }

    /// 关闭队列并等待所有处理中的条目 `done`
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().processing.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}

// 与 tokio 的 Interval 一致：约 30 年后
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::ItemExponentialFailureRateLimiter;

    fn queue(base_ms: u64) -> RateLimitingQueue {
        RateLimitingQueue::new(
            "test",
            ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(base_ms),
                Duration::from_secs(1),
            ),
        )
    }

    #[tokio::test]
    async fn deduplicates_pending_items() {
        let q = queue(5);
        q.add("add:Foo:ns/a");
        q.add("add:Foo:ns/a");
        q.add("add:Foo:ns/b");
        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await.as_deref(), Some("add:Foo:ns/a"));
        assert_eq!(q.get().await.as_deref(), Some("add:Foo:ns/b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn item_in_flight_is_not_handed_out_twice() {
        let q = queue(5);
        q.add("k");
        let item = q.get().await.unwrap();

        q.add("k");
        assert_eq!(q.len(), 0, "in-flight item must not be re-queued before done");

        q.done(&item);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.as_deref(), Some("k"));
        q.done("k");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_duplicates_collapse() {
        let q = queue(5);
        q.add_rate_limited("k");
        q.add_rate_limited("k");
        assert_eq!(q.len(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn add_after_delays_delivery() {
        let q = queue(5);
        q.add_after("k", Duration::from_millis(50));
        assert_eq!(q.len(), 0);

        let got = tokio::time::timeout(Duration::from_secs(1), q.get())
            .await
            .expect("delayed item should arrive");
        assert_eq!(got.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn earlier_ready_time_wins() {
        let q = queue(5);
        q.add_after("k", Duration::from_secs(10));
        q.add_after("k", Duration::from_millis(10));

        let got = tokio::time::timeout(Duration::from_secs(1), q.get())
            .await
            .expect("earlier timer should fire");
        assert_eq!(got.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_getters() {
        let q = queue(5);
        let getter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.shut_down();

        let got = tokio::time::timeout(Duration::from_secs(1), getter)
            .await
            .expect("getter should wake up")
            .unwrap();
        assert_eq!(got, None);
        assert!(q.shutting_down());
    }

    #[tokio::test]
    async fn rejects_items_after_shutdown() {
        let q = queue(5);
        q.add("before");
        q.shut_down();
        q.add("after");
        q.add_after("later", Duration::from_millis(1));
        assert_eq!(q.len(), 1);

        // 关闭前已排队的条目仍可取出，之后返回 None
        assert_eq!(q.get().await.as_deref(), Some("before"));
        q.done("before");
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_items() {
        let q = queue(5);
        q.add("k");
        let item = q.get().await.unwrap();
        assert_eq!(q.in_flight(), 1);

        let drain = {
            let q = q.clone();
            tokio::spawn(async move { q.shut_down_with_drain().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());

        q.done(&item);
        tokio::time::timeout(Duration::from_secs(1), drain)
            .await
            .expect("drain should complete")
            .unwrap();
        assert_eq!(q.in_flight(), 0);
    }

    #[tokio::test]
    async fn forget_resets_requeue_count() {
        let q = queue(1);
        q.add("k");
        let item = q.get().await.unwrap();
        q.requeue(&item);
        q.done(&item);
        assert_eq!(q.num_requeues("k"), 1);
        q.forget("k");
        assert_eq!(q.num_requeues("k"), 0);
    }

    #[tokio::test]
    async fn duplicate_notifications_do_not_count_as_retries() {
        let q = queue(1);
        q.add_rate_limited("k");
        q.add_rate_limited("k");
        q.add_rate_limited("k");
        assert_eq!(q.len(), 1);
        assert_eq!(q.num_requeues("k"), 0);
    }

    #[tokio::test]
    async fn pending_item_is_not_redelivered_by_a_late_timer() {
        let q = queue(10);
        q.add_rate_limited("k");
        // 第二次通知若安排了定时器，会在条目被取走后再次入队
        q.add_rate_limited("k");
        let item = q.get().await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        q.done(&item);
        assert!(q.is_empty());
        assert_eq!(q.in_flight(), 0);
    }

    #[tokio::test]
    async fn huge_delays_do_not_overflow() {
        let q = queue(1);
        q.add_after("k", Duration::MAX);
        assert!(q.is_empty());
        q.shut_down();
    }
}
