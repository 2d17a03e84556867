//! # Concourse
//!
//! An LLM-backed airport assistant. A user asks natural-language questions
//! about flights, amenities, and airports; a tool-calling agent answers by
//! querying a REST search service and renders the conversation in a small
//! chat web app.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Browser │──▶│ axum routes  │──▶│ Session store │
//! └─────────┘   │ / /chat ...  │   │ id → Agent    │
//!               └──────────────┘   └──────┬────────┘
//!                                         ▼
//!                                  ┌────────────┐   ┌─────────────┐
//!                                  │   Agent    │──▶│  LLM (tool  │
//!                                  │ tool loop  │   │  calling)   │
//!                                  └─────┬──────┘   └─────────────┘
//!                                        ▼
//!                                  ┌────────────┐
//!                                  │  Airport   │
//!                                  │ search API │
//!                                  └────────────┘
//! ```
//!
//! A separate CLI surface manages the product datastore (Postgres +
//! pgvector): bulk load, export, and cosine nearest-neighbor search.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Chat turns, products, embedding records |
//! | [`backend`] | Airport search REST client |
//! | [`llm`] | Chat-completions client with tool calling |
//! | [`tools`] | Tool trait, registry, and the airport tool catalog |
//! | [`agent`] | Per-session agent: prompt + tool-use loop + memory |
//! | [`session`] | Session store and signed cookie codec |
//! | [`server`] | Chat web server |
//! | [`embedding`] | Query embedding (OpenAI or disabled) |
//! | [`datastore`] | Postgres/pgvector product store |

pub mod agent;
pub mod backend;
pub mod config;
pub mod datastore;
pub mod embedding;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod tools;
