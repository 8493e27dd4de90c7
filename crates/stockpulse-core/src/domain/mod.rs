//! Validated domain types shared by the fetcher, loader and detector.

mod bar;
pub mod date;
mod symbol;

pub use bar::{DailyBar, TickerProfile};
pub use date::{days_before, format_date, parse_date};
pub use symbol::Symbol;
