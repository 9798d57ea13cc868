//! evogate - Evolution API compatible gateway for a WhatsApp Web session

pub mod config;
pub mod error;
pub mod gateway;
pub mod messaging;
pub mod metrics;
pub mod session;
pub mod utils;
pub mod whatsapp;

pub use config::Config;
pub use error::{GateError, Result};
pub use messaging::{BatchItem, BatchReport, Dispatcher};
pub use session::{ConnectionState, Session, SessionSnapshot};
pub use whatsapp::{SentMessage, SessionEvent, WhatsAppClient};
