//! This module contains the data models for the Herald notification engine.

pub mod destination;
pub mod notification;
pub mod resource;
pub mod settings;
pub mod trigger;

pub use destination::{Destination, Destinations};
pub use notification::{
    EmailNotification, Notification, SlackNotification, TemplateSpec, WebhookNotification,
};
pub use resource::{Resource, annotations_patch};
pub use settings::{NotificationsSettings, SubscriptionSpec};
pub use trigger::{Condition, ConditionResult};
