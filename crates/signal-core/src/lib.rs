pub mod candle;
pub mod clock;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod indicators;
pub mod scorer;
pub mod store;
