pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod session;

pub use config::Config;
pub use datasource::{DataSourceError, DefiLlamaSource, MockYieldSource, PoolAprCache, YieldSource};
pub use db::{init_db, Repository};
pub use domain::{Decimal, TimeMs, Timeframe, WalletAddress};
pub use error::AppError;
pub use session::SessionManager;
