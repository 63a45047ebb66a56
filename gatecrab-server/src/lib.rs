//! # GateCrab Server
//!
//! A standalone HTTP service exposing gatecrab's fixed-window quotas and
//! single-use anti-replay tokens.
//!
//! ## Purpose
//!
//! Instead of embedding abuse protection in every service, applications can:
//!
//! - **Throttle sensitive actions** (login, registration, export, search)
//!   through named quota policies
//! - **Mint single-use codes** for badges, check-ins or appointments and
//!   accept each code exactly once
//! - **Share one policy table** across services
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! gatecrab --help
//!
//! # Start on port 8080 with the default presets
//! gatecrab --http-port 8080
//!
//! # Tighter export quota and shorter-lived tokens
//! gatecrab --quota export=1/3600 --token-ttl 120
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! export GATECRAB_HTTP_PORT=9090
//! export GATECRAB_SWEEP_INTERVAL=30
//! gatecrab
//!
//! # List all available environment variables
//! gatecrab --list-env-vars
//! ```
//!
//! ## Client Examples
//!
//! ```bash
//! # Consume one export for user:123 (429 once the budget is spent)
//! curl -X POST http://localhost:8080/quota/check \
//!   -H "Content-Type: application/json" \
//!   -d '{"policy": "export", "key": "user:123"}'
//!
//! # Mint a badge token
//! curl -X POST http://localhost:8080/tokens \
//!   -H "Content-Type: application/json" \
//!   -d '{"subject": "user-42", "purpose": "badge"}'
//!
//! # Validate it (200 the first time, 409 afterwards)
//! curl -X POST http://localhost:8080/tokens/validate \
//!   -H "Content-Type: application/json" \
//!   -d '{"token": "<token>", "subject": "user-42", "purpose": "badge", "issued_at": 1700000000000}'
//! ```
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─────────────┐
//!                 │    HTTP     │
//!                 │  Transport  │
//!                 └──────┬──────┘
//!                        │
//!                  ┌─────▼─────┐
//!                  │ AppState  │
//!                  └─────┬─────┘
//!            ┌───────────┴───────────┐
//!      ┌─────▼─────┐           ┌─────▼─────┐
//!      │  Quota    │           │  Token    │
//!      │ policies  │           │  service  │
//!      └─────┬─────┘           └─────┬─────┘
//!            │ one store each        │
//!      ┌─────▼─────┐           ┌─────▼─────┐
//!      │EntryStore │ ◄─sweep─► │EntryStore │
//!      └───────────┘           └───────────┘
//! ```

pub mod config;
pub mod metrics;
pub mod state;
pub mod transport;
pub mod types;
