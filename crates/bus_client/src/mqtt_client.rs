//! rumqttc-backed message bus

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use contracts::{BusConfig, ContractError, MessageBus, RawMessage, Subscription};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::parse_broker_url;
use crate::error::{BusError, Result};

/// Map numeric QoS level to rumqttc QoS
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

type AckResult = std::result::Result<(), String>;

/// 订阅状态，由事件循环任务与 `MqttBus` 共享
#[derive(Default)]
struct SubscriptionState {
    /// Topic to re-issue after every reconnect
    active: Option<(String, QoS)>,
    /// Waiter for the next SUBACK
    pending_ack: Option<oneshot::Sender<AckResult>>,
}

type SharedSubscription = Arc<Mutex<SubscriptionState>>;

fn lock(state: &SharedSubscription) -> MutexGuard<'_, SubscriptionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Interpret SUBACK return codes
fn suback_result(return_codes: &[SubscribeReasonCode]) -> AckResult {
    if return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        Err(format!("broker returned {return_codes:?}"))
    } else {
        Ok(())
    }
}

/// Live session state, present between connect and disconnect
struct Session {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
    shutdown: CancellationToken,
    subscription: SharedSubscription,
    deliveries: Option<Receiver<RawMessage>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// MQTT message bus
///
/// The event loop runs on its own task and only enqueues incoming publishes
/// into a bounded delivery queue. The queue is handed out as the
/// `Subscription`; the pipeline drains it.
///
/// The task survives connection drops: it keeps polling after
/// `reconnect_delay` and re-subscribes on every new CONNACK.
pub struct MqttBus {
    config: BusConfig,
    delivery_capacity: usize,
    session: Option<Session>,
}

impl MqttBus {
    pub fn new(config: BusConfig, delivery_capacity: usize) -> Self {
        Self {
            config,
            delivery_capacity: delivery_capacity.max(1),
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn options(&self) -> Result<MqttOptions> {
        let (host, port) = parse_broker_url(&self.config.broker)?;
        let mut options = MqttOptions::new(&self.config.client_id, host, port);
        options.set_keep_alive(self.config.keep_alive());
        options.set_clean_session(true);
        Ok(options)
    }

    async fn open_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let options = self.options()?;
        let (client, mut event_loop) = AsyncClient::new(options, self.config.request_capacity);

        let timeout = self.config.connect_timeout();
        let broker = self.config.broker.clone();
        match tokio::time::timeout(timeout, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(BusError::connection_failed(broker, message)),
            Err(_) => return Err(BusError::ConnectTimeout { broker, timeout }),
        }

        let (tx, rx) = bounded(self.delivery_capacity);
        let shutdown = CancellationToken::new();
        let subscription = SharedSubscription::default();
        let task = tokio::spawn(drive_event_loop(
            event_loop,
            EventLoopContext {
                client: client.clone(),
                deliveries: tx,
                subscription: subscription.clone(),
                shutdown: shutdown.clone(),
                reconnect_delay: self.config.reconnect_delay(),
            },
        ));

        self.session = Some(Session {
            client,
            event_loop: task,
            shutdown,
            subscription,
            deliveries: Some(rx),
        });
        Ok(())
    }
}

/// Queue SUBSCRIBE and wait for the broker's answer
async fn request_subscription(
    session: &Session,
    topic: &str,
    qos: QoS,
    timeout: Duration,
) -> Result<()> {
    let (ack_tx, ack_rx) = oneshot::channel();
    {
        let mut state = lock(&session.subscription);
        state.active = Some((topic.to_string(), qos));
        state.pending_ack = Some(ack_tx);
    }

    session.client.subscribe(topic, qos).await?;

    match tokio::time::timeout(timeout, ack_rx).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(reason))) => Err(BusError::SubscribeRejected {
            topic: topic.to_string(),
            reason,
        }),
        // Event loop ended before the broker answered
        Ok(Err(_)) => Err(BusError::NotConnected),
        Err(_) => Err(BusError::SubscribeTimeout {
            topic: topic.to_string(),
            timeout,
        }),
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> std::result::Result<(), String> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("connection refused: {:?}", ack.code))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

struct EventLoopContext {
    client: AsyncClient,
    deliveries: Sender<RawMessage>,
    subscription: SharedSubscription,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
}

impl EventLoopContext {
    /// Re-issue the active subscription on a fresh clean session
    fn resubscribe(&self) {
        let active = lock(&self.subscription).active.clone();
        let Some((topic, qos)) = active else {
            return;
        };
        match self.client.try_subscribe(topic.as_str(), qos) {
            Ok(()) => info!(%topic, "re-subscribing after reconnect"),
            Err(e) => error!(%topic, error = %e, "failed to queue re-subscribe"),
        }
    }

    fn settle_suback(&self, return_codes: &[SubscribeReasonCode]) {
        let result = suback_result(return_codes);
        let waiter = lock(&self.subscription).pending_ack.take();
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => match result {
                Ok(()) => debug!("subscription acknowledged"),
                Err(reason) => error!(%reason, "broker rejected re-subscribe"),
            },
        }
    }
}

/// Poll the event loop until shutdown or disconnect
///
/// Connection errors are retried: rumqttc reconnects on the next poll. The
/// delivery queue is closed only when the task ends.
async fn drive_event_loop(mut event_loop: EventLoop, ctx: EventLoopContext) {
    loop {
        let event = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = RawMessage::new(publish.topic, publish.payload);
                tokio::select! {
                    biased;
                    _ = ctx.shutdown.cancelled() => break,
                    sent = ctx.deliveries.send(message) => {
                        if sent.is_err() {
                            debug!("delivery queue closed, dropping publish");
                        }
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // The first CONNACK is consumed by connect; this is a reconnect
                info!("reconnected to MQTT broker");
                ctx.resubscribe();
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => ctx.settle_suback(&ack.return_codes),
            Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
                debug!(pkid = ack.pkid, "unsubscribe acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if ctx.shutdown.is_cancelled() {
                    break;
                }
                warn!(error = %e, delay = ?ctx.reconnect_delay, "MQTT connection lost, retrying");
                tokio::select! {
                    biased;
                    _ = ctx.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ctx.reconnect_delay) => {}
                }
            }
        }
    }

    if let Some(waiter) = lock(&ctx.subscription).pending_ack.take() {
        let _ = waiter.send(Err("event loop stopped".to_string()));
    }
    ctx.deliveries.close();
}

impl MessageBus for MqttBus {
    fn name(&self) -> &str {
        "mqtt"
    }

    #[instrument(name = "mqtt_connect", skip(self), fields(broker = %self.config.broker, client_id = %self.config.client_id))]
    async fn connect(&mut self) -> std::result::Result<(), ContractError> {
        self.open_session().await?;
        info!("connected to MQTT broker");
        Ok(())
    }

    #[instrument(name = "mqtt_subscribe", skip(self))]
    async fn subscribe(&mut self, topic: &str) -> std::result::Result<Subscription, ContractError> {
        let qos = qos_from_level(self.config.qos);
        let timeout = self.config.connect_timeout();
        let session = self.session.as_mut().ok_or(BusError::NotConnected)?;
        let deliveries = session
            .deliveries
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed {
                topic: topic.to_string(),
            })?;

        if let Err(e) = request_subscription(session, topic, qos, timeout).await {
            *lock(&session.subscription) = SubscriptionState::default();
            session.deliveries = Some(deliveries);
            return Err(e.into());
        }

        info!(?qos, "subscribed");
        Ok(Subscription::new(topic, deliveries))
    }

    #[instrument(name = "mqtt_unsubscribe", skip(self))]
    async fn unsubscribe(&mut self, topic: &str) -> std::result::Result<(), ContractError> {
        let session = self.session.as_ref().ok_or(BusError::NotConnected)?;
        lock(&session.subscription).active = None;
        session.client.unsubscribe(topic).await.map_err(BusError::from)?;
        debug!("unsubscribe requested");
        Ok(())
    }

    #[instrument(name = "mqtt_disconnect", skip(self))]
    async fn disconnect(&mut self, timeout: Duration) -> std::result::Result<(), ContractError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = session.client.disconnect().await {
            warn!(error = %e, "failed to queue disconnect");
            session.shutdown.cancel();
        }

        match tokio::time::timeout(timeout, &mut session.event_loop).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "event loop task failed"),
            Err(_) => {
                warn!(?timeout, "disconnect timed out, aborting event loop");
                session.shutdown.cancel();
                session.event_loop.abort();
            }
        }

        info!("disconnected from MQTT broker");
        Ok(())
    }
}
