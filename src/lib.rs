//! # Report Tracker
//!
//! A chat bot that turns messages and reactions into tracked bug reports
//! and feature requests, and keeps them in sync with an external issue
//! tracker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Chat relay  │──▶│   Tracker   │──▶│  SQLite  │
//! │ cmds/reacts │   │ rules+locks │   │ reports  │
//! └─────────────┘   └──────┬──────┘   └──────────┘
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!        ▼                 ▼                  ▲
//!  ┌──────────┐      ┌──────────┐       ┌──────────┐
//!  │ Discord  │      │  GitHub  │──────▶│  Bridge  │
//!  │ messages │      │  issues  │ hooks │ (webhook)│
//!  └──────────┘      └──────────┘       └──────────┘
//! ```
//!
//! The report entity, the vote rules, and the store trait live in
//! `report-tracker-core`. This crate adds persistence, the platform
//! clients, and every inbound surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the report store |
//! | [`chat`] | Chat platform trait and Discord client |
//! | [`github`] | Issue tracker trait and GitHub client |
//! | [`cache`] | Recently-used tracker message cache |
//! | [`embed`] | Message and issue rendering |
//! | [`lifecycle`] | Side effects on the chat platform and issue tracker |
//! | [`locks`] | Per-report mutual exclusion |
//! | [`service`] | Every report operation, end to end |
//! | [`search`] | Title search |
//! | [`invocation`] | Who triggered an operation and how to reply |
//! | [`commands`] | Chat command registry |
//! | [`intake`] | New reports and inline references from chat messages |
//! | [`reactions`] | Vote reactions on tracker messages |
//! | [`webhook`] | Webhook payloads and signature checks |
//! | [`bridge`] | Issue tracker → report reconciliation |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod bridge;
pub mod cache;
pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod embed;
pub mod github;
pub mod intake;
pub mod invocation;
pub mod lifecycle;
pub mod locks;
pub mod logging;
pub mod migrate;
pub mod reactions;
pub mod search;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod webhook;
