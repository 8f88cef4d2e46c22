use crate::codec::EventType;
use tokio_util::sync::CancellationToken;

/// 分发上下文（Dispatch Context）
///
/// 随每次回调一起传入，承载与具体对象无关的横切信息：
/// - `kind`/`event_type`：本次分发命中的处理器与事件类型；
/// - `retries`：该条目此前被退避重投的次数，首次投递为 0；
/// - `cancellation`：事件循环的取消信号，长耗时回调应在其触发时尽快返回。
#[derive(Clone, Debug)]
pub struct DispatchContext {
    pub kind: String,
    pub event_type: EventType,
    pub retries: u32,
    pub cancellation: CancellationToken,
}

impl DispatchContext {
    pub fn new(kind: impl Into<String>, event_type: EventType) -> Self {
        Self {
            kind: kind.into(),
            event_type,
            retries: 0,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
