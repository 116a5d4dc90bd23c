//! Trading-calendar collaborator: weekday approximation of the mainland
//! exchange calendar, session 09:30-15:00 local time.

use chrono::{Datelike, Local, NaiveDate, NaiveTime, Weekday};
use serde::Serialize;

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_trading_session(time: NaiveTime) -> bool {
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
    time >= open && time <= close
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeStatus {
    pub trading: bool,
    pub time: String,
}

pub fn trade_status() -> TradeStatus {
    let now = Local::now().naive_local();
    TradeStatus {
        trading: is_trading_day(now.date()) && is_trading_session(now.time()),
        time: now.format("%H:%M:%S").to_string(),
    }
}
