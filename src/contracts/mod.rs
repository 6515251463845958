pub mod strategy;

pub use strategy::{IStrategy, StrategyContract};
