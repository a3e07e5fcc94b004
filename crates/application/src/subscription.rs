//! 实时订阅的推送内容与取消句柄

use domain::Message;
use serde::Serialize;
use tokio::task::JoinHandle;

/// 一次推送。读取失败时推送 `Unavailable`，与“房间确实没有消息”区分开。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum MessageFeed {
    /// 最新消息，按时间升序
    Snapshot(Vec<Message>),
    /// 暂时无法读取
    Unavailable(String),
}

impl MessageFeed {
    pub fn messages(&self) -> Option<&[Message]> {
        match self {
            MessageFeed::Snapshot(messages) => Some(messages),
            MessageFeed::Unavailable(_) => None,
        }
    }
}

impl Default for MessageFeed {
    fn default() -> Self {
        MessageFeed::Snapshot(Vec::new())
    }
}

/// 订阅句柄。`cancel` 消耗句柄，因此只能调用一次；
/// 句柄被丢弃时同样会停止后台监听，不会泄漏。
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
