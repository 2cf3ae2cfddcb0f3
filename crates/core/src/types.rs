//! Market data value types for the replay-trader system.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable trading pair (e.g. BTC/USDT on binance).
///
/// Value object: equality and hashing are by value. Base and quote are
/// normalized to uppercase, the venue to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradingPair {
    /// Base asset (e.g. "BTC").
    pub base: String,
    /// Quote asset (e.g. "USDT").
    pub quote: String,
    /// Venue the pair trades on.
    pub venue: String,
}

impl TradingPair {
    /// Default venue when none is given.
    pub const DEFAULT_VENUE: &'static str = "binance";

    /// Create a trading pair, normalizing case.
    pub fn new(base: &str, quote: &str, venue: &str) -> Result<Self> {
        if base.is_empty() || quote.is_empty() {
            return Err(Error::validation("base and quote must be non-empty"));
        }
        Ok(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            venue: venue.to_lowercase(),
        })
    }

    /// Create a trading pair on the default venue.
    pub fn spot(base: &str, quote: &str) -> Result<Self> {
        Self::new(base, quote, Self::DEFAULT_VENUE)
    }

    /// Parse a pair from `BTC/USDT` or concatenated `BTCUSDT` form.
    pub fn parse(symbol: &str, venue: &str) -> Result<Self> {
        if let Some((base, quote)) = symbol.split_once('/') {
            return Self::new(base, quote, venue);
        }
        let upper = symbol.to_uppercase();
        for quote in ["USDT", "USD", "BTC"] {
            if let Some(base) = upper.strip_suffix(quote) {
                if !base.is_empty() {
                    return Self::new(base, quote, venue);
                }
            }
        }
        Err(Error::validation(format!("cannot parse symbol: {symbol}")))
    }

    /// Concatenated exchange form: `BTCUSDT`.
    pub fn concat(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, Self::DEFAULT_VENUE)
    }
}

/// Supported bar intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Timeframe {
    /// String code as used by exchange APIs (e.g. "1h").
    pub fn code(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::ThreeMinutes => "3m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHours => "2h",
            Timeframe::FourHours => "4h",
            Timeframe::SixHours => "6h",
            Timeframe::EightHours => "8h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDays => "3d",
            Timeframe::OneWeek => "1w",
        }
    }

    /// Length of one bar at this timeframe.
    pub fn to_duration(self) -> Duration {
        match self {
            Timeframe::OneMinute => Duration::minutes(1),
            Timeframe::ThreeMinutes => Duration::minutes(3),
            Timeframe::FiveMinutes => Duration::minutes(5),
            Timeframe::FifteenMinutes => Duration::minutes(15),
            Timeframe::ThirtyMinutes => Duration::minutes(30),
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::TwoHours => Duration::hours(2),
            Timeframe::FourHours => Duration::hours(4),
            Timeframe::SixHours => Duration::hours(6),
            Timeframe::EightHours => Duration::hours(8),
            Timeframe::TwelveHours => Duration::hours(12),
            Timeframe::OneDay => Duration::days(1),
            Timeframe::ThreeDays => Duration::days(3),
            Timeframe::OneWeek => Duration::weeks(1),
        }
    }

    /// Bar length in seconds.
    pub fn to_seconds(self) -> i64 {
        self.to_duration().num_seconds()
    }

    /// Bar length in minutes.
    pub fn to_minutes(self) -> i64 {
        self.to_seconds() / 60
    }

    /// Whether the interval is shorter than one day.
    pub fn is_intraday(self) -> bool {
        self.to_seconds() < 86_400
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Timeframe::OneMinute),
            "3m" => Ok(Timeframe::ThreeMinutes),
            "5m" => Ok(Timeframe::FiveMinutes),
            "15m" => Ok(Timeframe::FifteenMinutes),
            "30m" => Ok(Timeframe::ThirtyMinutes),
            "1h" => Ok(Timeframe::OneHour),
            "2h" => Ok(Timeframe::TwoHours),
            "4h" => Ok(Timeframe::FourHours),
            "6h" => Ok(Timeframe::SixHours),
            "8h" => Ok(Timeframe::EightHours),
            "12h" => Ok(Timeframe::TwelveHours),
            "1d" => Ok(Timeframe::OneDay),
            "3d" => Ok(Timeframe::ThreeDays),
            "1w" => Ok(Timeframe::OneWeek),
            other => Err(Error::validation(format!("unsupported timeframe: {other}"))),
        }
    }
}

/// One OHLCV bar for a single instrument over a fixed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open timestamp (UTC).
    pub time: DateTime<Utc>,
    /// Instrument the bar belongs to.
    pub symbol: TradingPair,
    /// Bar interval.
    pub timeframe: Timeframe,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Base-asset volume.
    pub volume: Decimal,
    /// Quote-asset volume, when the feed provides it.
    pub quote_volume: Option<Decimal>,
    /// Number of trades aggregated into the bar, when available.
    pub trade_count: Option<u64>,
}

impl Candle {
    /// Create a candle, rejecting malformed OHLCV data.
    ///
    /// Invariant: `low <= open, close <= high`, all prices strictly
    /// positive, volume non-negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        time: DateTime<Utc>,
        symbol: TradingPair,
        timeframe: Timeframe,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self> {
        if open <= Decimal::ZERO
            || high <= Decimal::ZERO
            || low <= Decimal::ZERO
            || close <= Decimal::ZERO
        {
            return Err(Error::market_data("prices must be positive"));
        }
        if low > high {
            return Err(Error::market_data("low must not exceed high"));
        }
        if low > open.min(close) || high < open.max(close) {
            return Err(Error::market_data("open/close must lie within [low, high]"));
        }
        if volume < Decimal::ZERO {
            return Err(Error::market_data("volume must be non-negative"));
        }
        Ok(Self {
            time,
            symbol,
            timeframe,
            open,
            high,
            low,
            close,
            volume,
            quote_volume: None,
            trade_count: None,
        })
    }

    /// Whether the bar closed above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Full bar range, high minus low.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

/// Kind of action a strategy asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    /// Open a long position.
    Buy,
    /// Exit a long position (treated as a close, not a short entry).
    Sell,
    /// Close an open long position.
    CloseLong,
    /// Close an open short position.
    CloseShort,
}

/// A trading signal emitted by a strategy.
///
/// Consumed once by the backtest engine, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Instrument the signal applies to.
    pub symbol: TradingPair,
    /// Requested action.
    pub signal_type: SignalType,
    /// Reference price at signal time.
    pub price: Decimal,
    /// Profit target, if the strategy sets one.
    pub target_price: Option<Decimal>,
    /// Protective stop, if the strategy sets one.
    pub stop_loss: Option<Decimal>,
    /// Strategy confidence in [0, 1].
    pub confidence: f64,
    /// Name of the emitting strategy.
    pub strategy: String,
    /// Timeframe the signal was generated on.
    pub timeframe: Timeframe,
    /// Instant after which the signal must be ignored.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Whether the signal has expired relative to the replay clock.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now > expiry,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> TradingPair {
        TradingPair::spot("BTC", "USDT").unwrap()
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn make_candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Result<Candle> {
        Candle::new(
            ts(0),
            btc_usdt(),
            Timeframe::OneHour,
            open,
            high,
            low,
            close,
            dec!(100),
        )
    }

    #[test]
    fn test_pair_normalization() {
        let pair = TradingPair::new("btc", "usdt", "BINANCE").unwrap();
        assert_eq!(pair.base, "BTC");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.venue, "binance");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }

    #[test]
    fn test_pair_equality_by_value() {
        let a = TradingPair::spot("BTC", "USDT").unwrap();
        let b = TradingPair::new("btc", "USDT", "binance").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pair_rejects_empty() {
        assert!(TradingPair::spot("", "USDT").is_err());
        assert!(TradingPair::spot("BTC", "").is_err());
    }

    #[test]
    fn test_pair_parse_slash_form() {
        let pair: TradingPair = "ETH/USDT".parse().unwrap();
        assert_eq!(pair.base, "ETH");
        assert_eq!(pair.quote, "USDT");
    }

    #[test]
    fn test_pair_parse_concat_form() {
        let pair: TradingPair = "BTCUSDT".parse().unwrap();
        assert_eq!(pair.base, "BTC");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.concat(), "BTCUSDT");

        let pair: TradingPair = "ethbtc".parse().unwrap();
        assert_eq!(pair.base, "ETH");
        assert_eq!(pair.quote, "BTC");
    }

    #[test]
    fn test_pair_parse_unknown_form() {
        assert!("GARBAGE".parse::<TradingPair>().is_err());
    }

    #[test]
    fn test_timeframe_round_trip() {
        for code in ["1m", "5m", "15m", "1h", "4h", "1d", "1w"] {
            let tf: Timeframe = code.parse().unwrap();
            assert_eq!(tf.code(), code);
        }
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_durations() {
        assert_eq!(Timeframe::OneMinute.to_seconds(), 60);
        assert_eq!(Timeframe::OneHour.to_minutes(), 60);
        assert_eq!(Timeframe::OneDay.to_seconds(), 86_400);
        assert!(Timeframe::TwelveHours.is_intraday());
        assert!(!Timeframe::OneDay.is_intraday());
    }

    #[test]
    fn test_candle_valid() {
        let candle = make_candle(dec!(50000), dec!(51000), dec!(49000), dec!(50500)).unwrap();
        assert!(candle.is_bullish());
        assert_eq!(candle.range(), dec!(2000));
        assert_eq!(candle.quote_volume, None);
    }

    #[test]
    fn test_candle_rejects_inverted_range() {
        assert!(make_candle(dec!(50000), dec!(49000), dec!(51000), dec!(50500)).is_err());
    }

    #[test]
    fn test_candle_rejects_close_outside_range() {
        assert!(make_candle(dec!(50000), dec!(51000), dec!(49000), dec!(52000)).is_err());
        assert!(make_candle(dec!(48000), dec!(51000), dec!(49000), dec!(50000)).is_err());
    }

    #[test]
    fn test_candle_rejects_nonpositive_price() {
        assert!(make_candle(dec!(0), dec!(51000), dec!(49000), dec!(50500)).is_err());
    }

    #[test]
    fn test_candle_rejects_negative_volume() {
        let result = Candle::new(
            ts(0),
            btc_usdt(),
            Timeframe::OneHour,
            dec!(50000),
            dec!(51000),
            dec!(49000),
            dec!(50500),
            dec!(-1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_signal_expiry() {
        let signal = Signal {
            symbol: btc_usdt(),
            signal_type: SignalType::Buy,
            price: dec!(50000),
            target_price: None,
            stop_loss: None,
            confidence: 1.0,
            strategy: "test".to_string(),
            timeframe: Timeframe::OneHour,
            expires_at: Some(ts(1)),
        };

        assert!(!signal.is_expired(ts(0)));
        assert!(!signal.is_expired(ts(1)));
        assert!(signal.is_expired(ts(2)));

        let open_ended = Signal {
            expires_at: None,
            ..signal
        };
        assert!(!open_ended.is_expired(ts(23)));
    }
}
