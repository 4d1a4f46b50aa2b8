//! # ascent-host: embedding Ascent in a game loop
//!
//! This crate connects the game-agnostic `ascent-core` engine to a host
//! game's frame loop and gameplay systems.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Host game                    │
//! │  combat · crafting · trade · quests · net     │
//! │        │ hooks            │ wire JSON         │
//! │        ▼                  ▼                   │
//! │  ┌────────────────────────────────────────┐  │
//! │  │            ascent-host                 │  │
//! │  │  EventSender ──▶ EventQueue            │  │
//! │  │                     │ drain per step   │  │
//! │  │                     ▼                  │  │
//! │  │  ProgressionHost::step ──▶ SaveStore   │  │
//! │  │         │                              │  │
//! │  │         ▼                              │  │
//! │  │  ┌──────────────────────────────────┐  │  │
//! │  │  │           ascent-core            │  │  │
//! │  │  │  stats · skills · reputation     │  │  │
//! │  │  └──────────────────────────────────┘  │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: engine config plus the `[host]` table
//! - `hooks`: event builders for the host's gameplay systems
//! - `queue`: many-producer inbound event queue
//! - `systems`: the per-step system (drain, route, tick, autosave)
//! - `telemetry`: tracing subscriber setup

pub mod config;
pub mod hooks;
pub mod queue;
pub mod systems;
pub mod telemetry;

pub use config::{HostConfig, HostSettings};
pub use queue::{EventQueue, EventSender, Inbound, QueueStats};
pub use systems::{ProgressionHost, StepReport};
pub use telemetry::init_tracing;
