//! Mock message bus
//!
//! 用于测试，无需真实 broker

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_channel::{bounded, Sender};
use bytes::Bytes;
use contracts::{ContractError, MessageBus, RawMessage, Subscription};
use tracing::{debug, info, instrument};

use crate::error::BusError;

/// Bus 调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

/// Mock 配置
#[derive(Debug, Clone)]
pub struct MockBusConfig {
    /// 模拟连接失败
    pub fail_connect: bool,
    /// 模拟订阅失败
    pub fail_subscribe: bool,
    /// 投递队列容量
    pub delivery_capacity: usize,
}

impl Default for MockBusConfig {
    fn default() -> Self {
        Self {
            fail_connect: false,
            fail_subscribe: false,
            delivery_capacity: 64,
        }
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    calls: Vec<BusCall>,
    /// topic → (delivery sender, still subscribed)
    subscribers: HashMap<String, (Sender<RawMessage>, bool)>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock 消息总线
///
/// 记录所有调用，消息通过 `MockBusHandle::publish` 注入
pub struct MockBus {
    config: MockBusConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// 创建新的 Mock bus
    pub fn new(config: MockBusConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// 获取控制句柄（bus 被 controller 接管后仍可使用）
    pub fn handle(&self) -> MockBusHandle {
        MockBusHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new(MockBusConfig::default())
    }
}

impl MessageBus for MockBus {
    fn name(&self) -> &str {
        "mock"
    }

    #[instrument(name = "mock_bus_connect", skip(self))]
    async fn connect(&mut self) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::Connect);

        if self.config.fail_connect {
            return Err(BusError::connection_failed("mock://broker", "simulated connection failure").into());
        }

        state.connected = true;
        info!("mock bus connected");
        Ok(())
    }

    #[instrument(name = "mock_bus_subscribe", skip(self))]
    async fn subscribe(&mut self, topic: &str) -> Result<Subscription, ContractError> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::Subscribe(topic.to_string()));

        if !state.connected {
            return Err(BusError::NotConnected.into());
        }
        if self.config.fail_subscribe {
            return Err(ContractError::bus_connection(format!(
                "simulated subscribe failure for '{topic}'"
            )));
        }

        let (tx, rx) = bounded(self.config.delivery_capacity.max(1));
        state.subscribers.insert(topic.to_string(), (tx, true));
        debug!("mock subscription opened");
        Ok(Subscription::new(topic, rx))
    }

    #[instrument(name = "mock_bus_unsubscribe", skip(self))]
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::Unsubscribe(topic.to_string()));

        if let Some((_, active)) = state.subscribers.get_mut(topic) {
            *active = false;
        }
        Ok(())
    }

    #[instrument(name = "mock_bus_disconnect", skip(self))]
    async fn disconnect(&mut self, _timeout: Duration) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::Disconnect);
        state.connected = false;
        state.subscribers.clear();
        info!("mock bus disconnected");
        Ok(())
    }
}

/// Mock bus 控制句柄
#[derive(Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBusHandle {
    /// 向订阅者投递原始 payload，返回是否被投递
    ///
    /// 未订阅或已取消订阅的 topic 上的消息会被丢弃（与 broker 行为一致）
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let sender = {
            let state = lock(&self.state);
            match state.subscribers.get(topic) {
                Some((tx, true)) => tx.clone(),
                _ => return false,
            }
        };
        sender.send(RawMessage::new(topic, payload)).await.is_ok()
    }

    /// 关闭所有订阅（模拟 broker 断开）
    pub fn close_subscriptions(&self) {
        let mut state = lock(&self.state);
        for (tx, _) in state.subscribers.values() {
            tx.close();
        }
        state.subscribers.clear();
    }

    /// 获取调用记录
    pub fn calls(&self) -> Vec<BusCall> {
        lock(&self.state).calls.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}
