//! Push notification delivery for crossed price targets.
//!
//! The notifier is an ordinary broadcaster subscriber. Items tracked with a
//! push subscription are bound to it; when an alert for a bound item arrives,
//! a `{title, body, icon, url}` payload is handed to a [`PushDelivery`].
//! A permanent failure means the subscription is gone: every other item bound
//! to the same endpoint is released and reported through
//! [`SubscriptionExpired`] so the owner can stop tracking them.

use crate::broadcaster::AlertBroadcaster;
use async_trait::async_trait;
use dashmap::DashMap;
use pricewatch_core::PriceAlert;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessage, WebPushMessageBuilder,
};

/// Capacity of the expired-subscription signal channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Browser push subscription as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<PushKeys>,
}

/// Client encryption keys of a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Notification body handed to the delivery transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Page opened when the notification is clicked.
    pub url: String,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Subscription no longer exists; never retry it.
    PermanentFailure,
    TransientFailure,
}

/// Transport that delivers a payload to a subscription endpoint.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome;
}

/// Emitted when a subscription turned out to be permanently invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionExpired {
    pub endpoint: String,
    /// Other items that were waiting on this subscription.
    pub item_ids: Vec<String>,
}

/// Delivers payloads as encrypted Web Push messages signed with a VAPID key.
pub struct WebPushDelivery {
    client: IsahcWebPushClient,
    /// VAPID private key, PEM encoded.
    vapid_pem: Vec<u8>,
    /// `sub` claim, a `mailto:` or `https:` contact.
    subject: String,
    ttl: Duration,
    timeout: Duration,
}

impl WebPushDelivery {
    /// Create a delivery client. The key is validated here so a bad key
    /// fails at startup rather than on the first alert.
    pub fn new(
        vapid_pem: Vec<u8>,
        subject: impl Into<String>,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self, WebPushError> {
        VapidSignatureBuilder::from_pem_no_sub(&vapid_pem[..])?;
        Ok(Self {
            client: IsahcWebPushClient::new()?,
            vapid_pem,
            subject: subject.into(),
            ttl,
            timeout,
        })
    }

    /// Map a push error to an outcome. Only errors that say the
    /// subscription itself is unusable are permanent.
    pub fn classify_error(error: &WebPushError) -> DeliveryOutcome {
        match error {
            WebPushError::EndpointNotValid { .. }
            | WebPushError::EndpointNotFound { .. }
            | WebPushError::InvalidCryptoKeys { .. }
            | WebPushError::MissingCryptoKeys { .. } => DeliveryOutcome::PermanentFailure,
            _ => DeliveryOutcome::TransientFailure,
        }
    }

    fn build_message(
        &self,
        info: &SubscriptionInfo,
        body: &[u8],
    ) -> Result<WebPushMessage, WebPushError> {
        let mut signature = VapidSignatureBuilder::from_pem(&self.vapid_pem[..], info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut builder = WebPushMessageBuilder::new(info);
        builder.set_payload(ContentEncoding::Aes128Gcm, body);
        builder.set_ttl(u32::try_from(self.ttl.as_secs()).unwrap_or(u32::MAX));
        builder.set_vapid_signature(signature.build()?);
        builder.build()
    }
}

#[async_trait]
impl PushDelivery for WebPushDelivery {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        let Some(keys) = &subscription.keys else {
            warn!(endpoint = %subscription.endpoint, "Push subscription has no keys");
            return DeliveryOutcome::PermanentFailure;
        };
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to encode push payload");
                return DeliveryOutcome::TransientFailure;
            }
        };

        let info = SubscriptionInfo::new(&subscription.endpoint, &keys.p256dh, &keys.auth);
        let message = match self.build_message(&info, &body) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to build push message");
                return Self::classify_error(&e);
            }
        };

        match tokio::time::timeout(self.timeout, self.client.send(message)).await {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(e)) => {
                warn!(error = %e, "Push service rejected notification");
                Self::classify_error(&e)
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Push request timed out");
                DeliveryOutcome::TransientFailure
            }
        }
    }
}

/// Used when no VAPID key is configured. Every attempt fails transiently,
/// so bindings are consumed without expiring any tracker.
pub struct DisabledPushDelivery;

#[async_trait]
impl PushDelivery for DisabledPushDelivery {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        _payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        debug!(endpoint = %subscription.endpoint, "Push delivery disabled, dropping notification");
        DeliveryOutcome::TransientFailure
    }
}

/// Configuration for the push notifier.
#[derive(Debug, Clone)]
pub struct PushNotifierConfig {
    /// Icon path shown with the notification.
    pub icon: String,
    /// URLs longer than this are shortened in the notification body.
    pub max_url_len: usize,
}

impl Default for PushNotifierConfig {
    fn default() -> Self {
        Self {
            icon: "/vite.svg".to_string(),
            max_url_len: 40,
        }
    }
}

/// Shorten a URL for display, keeping the result within `max_len` characters.
pub fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() <= max_len {
        return url.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut short: String = url.chars().take(keep).collect();
    short.push_str("...");
    short
}

/// Routes alerts for bound items to their push subscriptions.
pub struct PushNotifier {
    delivery: Arc<dyn PushDelivery>,
    /// item id -> subscription
    bindings: DashMap<String, PushSubscription>,
    config: PushNotifierConfig,
    signals: mpsc::Sender<SubscriptionExpired>,
    shutdown: watch::Sender<bool>,
}

impl PushNotifier {
    /// Create a notifier and the receiver for expired-subscription signals.
    pub fn new(
        delivery: Arc<dyn PushDelivery>,
        config: PushNotifierConfig,
    ) -> (Self, mpsc::Receiver<SubscriptionExpired>) {
        let (signals, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let notifier = Self {
            delivery,
            bindings: DashMap::new(),
            config,
            signals,
            shutdown,
        };
        (notifier, rx)
    }

    /// Send a notification to `subscription` when `item_id` crosses its target.
    pub fn bind(&self, item_id: &str, subscription: PushSubscription) {
        self.bindings.insert(item_id.to_string(), subscription);
    }

    /// Forget the subscription of an untracked item.
    pub fn unbind(&self, item_id: &str) {
        self.bindings.remove(item_id);
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Build the notification shown for `alert`.
    pub fn build_payload(&self, alert: &PriceAlert) -> NotificationPayload {
        NotificationPayload {
            title: format!("Price Drop! Now {}", alert.current_price),
            body: format!(
                "Item at {} is now {}!",
                truncate_url(&alert.url, self.config.max_url_len),
                alert.current_price
            ),
            icon: self.config.icon.clone(),
            url: alert.url.clone(),
        }
    }

    /// Deliver the notification for one alert. `None` if the item had no binding.
    pub async fn handle(&self, alert: &PriceAlert) -> Option<DeliveryOutcome> {
        // Items are one-shot, so the binding is consumed here.
        let (_, subscription) = self.bindings.remove(&alert.item_id)?;
        let payload = self.build_payload(alert);
        let outcome = self.delivery.deliver(&subscription, &payload).await;

        match outcome {
            DeliveryOutcome::Delivered => {
                info!(item = %alert.item_id, "Push notification sent");
            }
            DeliveryOutcome::TransientFailure => {
                warn!(item = %alert.item_id, "Push notification failed, not retried");
            }
            DeliveryOutcome::PermanentFailure => {
                self.expire(&subscription.endpoint).await;
            }
        }

        Some(outcome)
    }

    /// Release every item bound to `endpoint` and report them.
    async fn expire(&self, endpoint: &str) {
        let item_ids: Vec<String> = self
            .bindings
            .iter()
            .filter(|entry| entry.value().endpoint == endpoint)
            .map(|entry| entry.key().clone())
            .collect();
        for id in &item_ids {
            self.bindings.remove(id);
        }

        warn!(
            endpoint = endpoint,
            released = item_ids.len(),
            "Push subscription is gone"
        );

        let signal = SubscriptionExpired {
            endpoint: endpoint.to_string(),
            item_ids,
        };
        if let Err(e) = self.signals.send(signal).await {
            error!(error = %e, "Failed to report expired subscription");
        }
    }

    /// Follow `broadcaster` until [`stop`](Self::stop) is called.
    ///
    /// Each alert is handled on its own task so a slow push service never
    /// backs up the queue. If the broadcaster still drops the notifier as a
    /// slow subscriber, it subscribes again.
    pub async fn run(self: Arc<Self>, broadcaster: Arc<AlertBroadcaster>) {
        let mut shutdown = self.shutdown.subscribe();

        while !*shutdown.borrow() {
            let mut subscriber = broadcaster.subscribe();
            let subscriber_id = subscriber.id();
            info!(subscriber = subscriber_id, "Push notifier subscribed");

            loop {
                tokio::select! {
                    alert = subscriber.recv() => match alert {
                        Some(alert) => self.dispatch(alert),
                        None => {
                            error!(
                                subscriber = subscriber_id,
                                "Push notifier was dropped by the broadcaster, resubscribing"
                            );
                            break;
                        }
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            broadcaster.unsubscribe(subscriber_id);
                            info!("Push notifier stopped");
                            return;
                        }
                    }
                }
            }
        }

        info!("Push notifier stopped");
    }

    /// Stop [`run`](Self::run) and leave the broadcaster.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    fn dispatch(self: &Arc<Self>, alert: PriceAlert) {
        if !self.bindings.contains_key(&alert.item_id) {
            debug!(item = %alert.item_id, "No push subscription for alert");
            return;
        }
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            notifier.handle(&alert).await;
        });
    }
}
