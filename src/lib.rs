#![warn(missing_docs)]
//! Herald watches a collection of resources, evaluates configurable trigger
//! conditions against each of them and delivers templated notifications to
//! subscribed destinations, remembering what was sent so every condition
//! notifies at most once per occurrence.

pub mod config;
pub mod controller;
pub mod engine;
pub mod http_client;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod settings;
pub mod store;
pub mod subscriptions;
pub mod supervisor;
pub mod test_helpers;
