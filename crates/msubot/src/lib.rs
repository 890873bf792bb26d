//! Course section seat tracking.
//!
//! Scrapes the registration portal's section listing, keeps seat
//! subscriptions in a document store, archives subscriptions once their
//! users have been notified, and texts users through an SMS gateway.

pub mod archive;
pub mod atlas;
pub mod config;
pub mod notify;
pub mod section;
pub mod store;
pub mod users;
