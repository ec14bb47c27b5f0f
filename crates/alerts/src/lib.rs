//! Alert distribution for crossed price targets.
//!
//! This crate provides:
//! - Fan-out of alerts to live subscribers with bounded queues
//! - Encrypted Web Push delivery with expired-subscription signalling

pub mod broadcaster;
pub mod push;

pub use broadcaster::{AlertBroadcaster, Subscriber, SubscriberId, DEFAULT_QUEUE_CAPACITY};
pub use push::{
    truncate_url, DeliveryOutcome, DisabledPushDelivery, NotificationPayload, PushDelivery,
    PushKeys, PushNotifier, PushNotifierConfig, PushSubscription, SubscriptionExpired,
    WebPushDelivery,
};
