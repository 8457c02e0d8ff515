//! Domain types for Confluence

pub mod candle;
pub mod plan;
pub mod signal;
pub mod zone;

pub use candle::{Candle, CandleSeries, SeriesError};
pub use plan::{Direction, TradePlan};
pub use signal::Signal;
pub use zone::{Bias, FairValueGap, Level, LevelKind, OrderBlock, Zone, ZoneKind};
