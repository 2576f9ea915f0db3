//! # Keyword Harness
//!
//! Keyword term sources for programmatic page generation.
//!
//! A keyword is a named placeholder (`{city}`) whose terms come from one of
//! several sources: typed-in text, a CSV file or URL, a database table, an
//! RSS/Atom feed, an XLSX spreadsheet, or a one-shot AI completion. Every
//! source produces the same `(delimiter, columns, data)` triple, stored on
//! the keyword and refreshed from live data right before generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌──────────┐
//! │  SourceRegistry  │──▶│   service    │──▶│  SQLite  │
//! │ local/csv/db/rss │   │ save/refresh │   │ keywords │
//! │ spreadsheet/ai   │   │ resolve      │   │ media    │
//! └──────────────────┘   └──────┬───────┘   └──────────┘
//!                               │
//!                   ┌───────────┴──────┐
//!                   ▼                  ▼
//!              ┌──────────┐      ┌──────────┐
//!              │   CLI    │      │   HTTP   │
//!              │   (kw)   │      │  (JSON)  │
//!              └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kw init
//! kw keyword save city --source local --option data=$'Springfield\nShelbyville'
//! kw media add towns.csv
//! kw keyword save town --source csv_file --option attachment_id=1 --option columns_first_row=true
//! kw keyword terms town --refresh
//! kw serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Keyword, term set and source kind types |
//! | [`terms`] | Term escaping and splitting |
//! | [`error`] | Typed source errors |
//! | [`traits`] | `KeywordSource` trait and registry |
//! | [`source_local`] | Local terms |
//! | [`source_csv`] | CSV file and CSV URL sources |
//! | [`source_database`] | Database table source |
//! | [`source_rss`] | RSS / Atom feed source |
//! | [`source_spreadsheet`] | XLSX spreadsheet source |
//! | [`source_ai`] | AI-generated terms |
//! | [`service`] | Save, refresh and resolve operations |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod csv_reader;
pub mod db;
pub mod error;
pub mod feed;
pub mod keyword_cmd;
pub mod keywords;
pub mod media;
pub mod media_cmd;
pub mod migrate;
pub mod models;
pub mod server;
pub mod service;
pub mod source_ai;
pub mod source_csv;
pub mod source_database;
pub mod source_local;
pub mod source_rss;
pub mod source_spreadsheet;
pub mod sources;
pub mod spreadsheet;
pub mod terms;
pub mod thesaurus;
pub mod traits;
