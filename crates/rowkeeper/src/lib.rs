//! Row/offer reconciliation core for a chat-driven shopping assistant.
//!
//! The store holds rows and their offers; the reconciler feeds chat-stream and
//! refresh results into it; the mutation layer applies user interactions
//! optimistically; the archive controller handles delete-with-undo.

pub mod app;
pub mod archive;
pub mod backend;
pub mod chat;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod intent;
pub mod messaging;
pub mod mutations;
pub mod offer;
pub mod reconciler;
pub mod row;
pub mod session;
pub mod sse;
pub mod store;

pub use app::App;
pub use archive::ArchiveController;
pub use backend::ShoppingBackend;
pub use chat::{ChatDriver, ChatTurn};
pub use client::HttpBackend;
pub use config::RowkeeperConfig;
pub use error::{BackendError, BackendResult, ConfigError, SessionError};
pub use events::ChatEvent;
pub use mutations::{Notice, OptimisticMutations};
pub use offer::{derive_offer_key, Offer, ProviderStatus, ProviderStatusSnapshot};
pub use reconciler::{RefreshMode, RefreshOutcome, SearchPhase, SearchReconciler};
pub use row::{Row, RowId, RowStatus};
pub use session::Session;
pub use store::{RowResults, Store, StoreEvent};
