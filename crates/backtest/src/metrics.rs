//! Performance metrics over a finished equity curve and trade list.
//!
//! Pure, stateless functions; nothing here mutates backtest state.
//! Monetary inputs stay in the exact decimal type, ratios are computed
//! in `f64` after an explicit conversion. Ratios whose denominator can
//! degenerate (Sortino, profit factor, Calmar) return `Option<f64>`,
//! where `None` is the tagged "undefined / no downside" value.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use replay_core::Trade;

use crate::portfolio::EquityPoint;

/// All performance metrics for one backtest run.
///
/// Degenerate inputs (empty equity curve or trade list) produce the
/// default all-zero report rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Total return as a fraction of starting capital.
    pub total_return: f64,
    /// Total return as a percentage.
    pub total_return_pct: f64,
    /// Annualized Sharpe ratio.
    pub sharpe_ratio: f64,
    /// Annualized Sortino ratio; `None` when there is no downside.
    pub sortino_ratio: Option<f64>,
    /// Worst peak-to-trough decline as a fraction of the peak.
    pub max_drawdown: f64,
    /// Worst peak-to-trough decline as a percentage.
    pub max_drawdown_pct: f64,
    /// Days from the peak to the sample where the maximum was recorded.
    pub max_drawdown_duration_days: i64,
    /// Winning share of all trades, as a fraction.
    pub win_rate: f64,
    /// Winning share of all trades, as a percentage.
    pub win_rate_pct: f64,
    /// Gross profit over gross loss; `None` when there are no losses.
    pub profit_factor: Option<f64>,
    /// Mean realized P&L of winning trades.
    pub average_win: Decimal,
    /// Mean realized P&L of losing trades.
    pub average_loss: Decimal,
    /// Total return over max drawdown; `None` when drawdown is zero.
    pub calmar_ratio: Option<f64>,
    /// Trades recorded over the run.
    pub total_trades: usize,
    /// Trades with positive realized P&L.
    pub winning_trades: usize,
    /// Trades with negative realized P&L.
    pub losing_trades: usize,
}

/// Calculate every metric from one finished backtest.
pub fn calculate_all(
    initial_capital: Decimal,
    final_equity: Decimal,
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    risk_free_rate: f64,
    periods_per_year: u32,
) -> PerformanceReport {
    if equity_curve.is_empty() || trades.is_empty() {
        return PerformanceReport::default();
    }

    let total_return = total_return(initial_capital, final_equity);
    let returns = period_returns(equity_curve);
    let (max_dd, max_dd_duration) = max_drawdown(equity_curve);
    let win_rate = win_rate(trades);
    let (average_win, average_loss) = average_win_loss(trades);

    PerformanceReport {
        total_return,
        total_return_pct: total_return * 100.0,
        sharpe_ratio: sharpe_ratio(&returns, risk_free_rate, periods_per_year),
        sortino_ratio: sortino_ratio(&returns, risk_free_rate, periods_per_year),
        max_drawdown: max_dd,
        max_drawdown_pct: max_dd * 100.0,
        max_drawdown_duration_days: max_dd_duration,
        win_rate,
        win_rate_pct: win_rate * 100.0,
        profit_factor: profit_factor(trades),
        average_win,
        average_loss,
        calmar_ratio: calmar_ratio(total_return, max_dd),
        total_trades: trades.len(),
        winning_trades: trades
            .iter()
            .filter(|t| t.realized_pnl.map_or(false, |p| p > Decimal::ZERO))
            .count(),
        losing_trades: trades
            .iter()
            .filter(|t| t.realized_pnl.map_or(false, |p| p < Decimal::ZERO))
            .count(),
    }
}

/// Total return as a fraction of starting capital.
pub fn total_return(initial_capital: Decimal, final_equity: Decimal) -> f64 {
    if initial_capital <= Decimal::ZERO {
        return 0.0;
    }
    ((final_equity - initial_capital) / initial_capital)
        .to_f64()
        .unwrap_or(0.0)
}

/// Period returns between consecutive equity samples.
///
/// Requires at least two samples; yields nothing otherwise. Samples at
/// or below zero equity are skipped as return bases.
pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter_map(|w| {
            if w[0].equity > Decimal::ZERO {
                ((w[1].equity - w[0].equity) / w[0].equity).to_f64()
            } else {
                None
            }
        })
        .collect()
}

/// Annualized Sharpe ratio over period returns.
///
/// Zero when fewer than two returns exist or the standard deviation
/// vanishes.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: u32) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 {
        return 0.0;
    }

    let annual_return = mean * periods_per_year as f64;
    let annual_std = std_dev * (periods_per_year as f64).sqrt();
    (annual_return - risk_free_rate) / annual_std
}

/// Annualized Sortino ratio over period returns.
///
/// The downside deviation divides by the full returns count, not just
/// the negative subset. `None` when there are no negative returns.
pub fn sortino_ratio(
    returns: &[f64],
    risk_free_rate: f64,
    periods_per_year: u32,
) -> Option<f64> {
    if returns.len() < 2 {
        return Some(0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;

    let downside_sq_sum: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    if downside_sq_sum == 0.0 {
        return None;
    }
    let downside_std = (downside_sq_sum / n).sqrt();

    let annual_return = mean * periods_per_year as f64;
    let annual_downside_std = downside_std * (periods_per_year as f64).sqrt();
    Some((annual_return - risk_free_rate) / annual_downside_std)
}

/// Maximum drawdown and its duration in whole days.
///
/// The duration runs from the peak that led to the current maximum to
/// the sample where that maximum was recorded, and only moves when a new
/// maximum is found.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let first = match equity_curve.first() {
        Some(p) => p,
        None => return (0.0, 0),
    };

    let mut max_dd = Decimal::ZERO;
    let mut peak = first.equity;
    let mut peak_time = first.time;
    let mut max_dd_duration = 0i64;
    let mut drawdown_start: Option<DateTime<Utc>> = None;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            peak_time = point.time;
            drawdown_start = None;
        } else if peak > Decimal::ZERO {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
                let start = *drawdown_start.get_or_insert(peak_time);
                let duration = (point.time - start).num_days();
                if duration > max_dd_duration {
                    max_dd_duration = duration;
                }
            }
        }
    }

    (max_dd.to_f64().unwrap_or(0.0), max_dd_duration)
}

/// Winning share of all trades.
///
/// Trades without realized P&L, or with exactly zero, count toward
/// neither winners nor losers but stay in the denominator.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades
        .iter()
        .filter(|t| t.realized_pnl.map_or(false, |p| p > Decimal::ZERO))
        .count();
    winners as f64 / trades.len() as f64
}

/// Gross profit over gross loss.
///
/// `None` when gross loss is zero and gross profit is positive;
/// `Some(0.0)` when both are zero.
pub fn profit_factor(trades: &[Trade]) -> Option<f64> {
    let gross_profit: Decimal = trades
        .iter()
        .filter_map(|t| t.realized_pnl)
        .filter(|p| *p > Decimal::ZERO)
        .sum();
    let gross_loss: Decimal = trades
        .iter()
        .filter_map(|t| t.realized_pnl)
        .filter(|p| *p < Decimal::ZERO)
        .map(|p| p.abs())
        .sum();

    if gross_loss == Decimal::ZERO {
        if gross_profit > Decimal::ZERO {
            None
        } else {
            Some(0.0)
        }
    } else {
        (gross_profit / gross_loss).to_f64()
    }
}

/// Mean realized P&L of winning and losing trades.
pub fn average_win_loss(trades: &[Trade]) -> (Decimal, Decimal) {
    let wins: Vec<Decimal> = trades
        .iter()
        .filter_map(|t| t.realized_pnl)
        .filter(|p| *p > Decimal::ZERO)
        .collect();
    let losses: Vec<Decimal> = trades
        .iter()
        .filter_map(|t| t.realized_pnl)
        .filter(|p| *p < Decimal::ZERO)
        .collect();

    let average = |values: &[Decimal]| {
        if values.is_empty() {
            Decimal::ZERO
        } else {
            values.iter().sum::<Decimal>() / Decimal::from(values.len() as u64)
        }
    };

    (average(&wins), average(&losses))
}

/// Total return over maximum drawdown.
///
/// `None` when drawdown is zero and the return is positive;
/// `Some(0.0)` when both are zero or the return is negative.
pub fn calmar_ratio(total_return: f64, max_drawdown: f64) -> Option<f64> {
    if max_drawdown == 0.0 {
        if total_return > 0.0 {
            None
        } else {
            Some(0.0)
        }
    } else {
        Some(total_return / max_drawdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use replay_core::{OrderSide, TradingPair};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn btc_usdt() -> TradingPair {
        TradingPair::spot("BTC", "USDT").unwrap()
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn point(d: u32, equity: Decimal) -> EquityPoint {
        EquityPoint {
            time: day(d),
            equity,
        }
    }

    fn trade_with_pnl(pnl: Option<Decimal>) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            order_id: None,
            symbol: btc_usdt(),
            side: OrderSide::Sell,
            price: dec!(50000),
            size: dec!(0.1),
            commission: Decimal::ZERO,
            commission_asset: "USDT".to_string(),
            realized_pnl: pnl,
            executed_at: day(1),
        }
    }

    #[test]
    fn test_total_return() {
        assert_relative_eq!(total_return(dec!(10000), dec!(12500)), 0.25);
        assert_relative_eq!(total_return(dec!(10000), dec!(7500)), -0.25);
        assert_relative_eq!(total_return(Decimal::ZERO, dec!(100)), 0.0);
    }

    #[test]
    fn test_period_returns() {
        let curve = vec![
            point(1, dec!(10000)),
            point(2, dec!(11000)),
            point(3, dec!(9900)),
        ];
        let returns = period_returns(&curve);
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(returns[1], -0.1, epsilon = 1e-12);

        assert!(period_returns(&[point(1, dec!(10000))]).is_empty());
    }

    #[test]
    fn test_sharpe_ratio() {
        let returns = vec![0.01, -0.005, 0.02, 0.003];
        let sharpe = sharpe_ratio(&returns, 0.02, 252);

        let n = 4.0;
        let mean: f64 = returns.iter().sum::<f64>() / n;
        let var: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let expected = (mean * 252.0 - 0.02) / (var.sqrt() * 252f64.sqrt());
        assert_relative_eq!(sharpe, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe_degenerate_inputs() {
        assert_eq!(sharpe_ratio(&[0.01], 0.02, 252), 0.0);
        // Zero variance.
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.02, 252), 0.0);
    }

    #[test]
    fn test_sortino_uses_full_count_denominator() {
        let returns = vec![0.02, -0.01, 0.015, -0.005];
        let sortino = sortino_ratio(&returns, 0.02, 252).unwrap();

        let n = 4.0;
        let mean: f64 = returns.iter().sum::<f64>() / n;
        let downside_std = ((0.01f64.powi(2) + 0.005f64.powi(2)) / n).sqrt();
        let expected = (mean * 252.0 - 0.02) / (downside_std * 252f64.sqrt());
        assert_relative_eq!(sortino, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sortino_without_downside_is_undefined() {
        assert_eq!(sortino_ratio(&[0.01, 0.02, 0.03], 0.02, 252), None);
        assert_eq!(sortino_ratio(&[0.01], 0.02, 252), Some(0.0));
    }

    #[test]
    fn test_max_drawdown_scenario() {
        // [(t0, 10000), (t1, 12000), (t2, 9000), (t3, 11000)] => 0.25.
        let curve = vec![
            point(1, dec!(10000)),
            point(2, dec!(12000)),
            point(3, dec!(9000)),
            point(4, dec!(11000)),
        ];
        let (dd, duration) = max_drawdown(&curve);
        assert_relative_eq!(dd, 0.25);
        // Peak on day 2, maximum recorded on day 3.
        assert_eq!(duration, 1);
    }

    #[test]
    fn test_max_drawdown_monotonic_curve() {
        let curve = vec![point(1, dec!(10000)), point(2, dec!(10500)), point(3, dec!(11000))];
        assert_eq!(max_drawdown(&curve), (0.0, 0));
        assert_eq!(max_drawdown(&[]), (0.0, 0));
    }

    #[test]
    fn test_max_drawdown_duration_spans_deepening_decline() {
        let curve = vec![
            point(1, dec!(10000)),
            point(2, dec!(9500)),
            point(5, dec!(9000)),
            point(9, dec!(8000)),
        ];
        let (dd, duration) = max_drawdown(&curve);
        assert_relative_eq!(dd, 0.2);
        // Decline deepens through day 9, measured from the day-1 peak.
        assert_eq!(duration, 8);
    }

    #[test]
    fn test_win_rate_ignores_flat_and_opening_trades() {
        let trades = vec![
            trade_with_pnl(Some(dec!(100))),
            trade_with_pnl(Some(dec!(-50))),
            trade_with_pnl(Some(Decimal::ZERO)),
            trade_with_pnl(None),
        ];
        // One winner out of four trades.
        assert_relative_eq!(win_rate(&trades), 0.25);
        assert_relative_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn test_profit_factor() {
        let trades = vec![
            trade_with_pnl(Some(dec!(300))),
            trade_with_pnl(Some(dec!(-100))),
            trade_with_pnl(Some(dec!(-50))),
        ];
        assert_relative_eq!(profit_factor(&trades).unwrap(), 2.0);

        let all_wins = vec![trade_with_pnl(Some(dec!(300)))];
        assert_eq!(profit_factor(&all_wins), None);

        let no_pnl = vec![trade_with_pnl(None)];
        assert_eq!(profit_factor(&no_pnl), Some(0.0));
    }

    #[test]
    fn test_average_win_loss() {
        let trades = vec![
            trade_with_pnl(Some(dec!(100))),
            trade_with_pnl(Some(dec!(300))),
            trade_with_pnl(Some(dec!(-50))),
        ];
        let (avg_win, avg_loss) = average_win_loss(&trades);
        assert_eq!(avg_win, dec!(200));
        assert_eq!(avg_loss, dec!(-50));
    }

    #[test]
    fn test_calmar_ratio() {
        assert_relative_eq!(calmar_ratio(0.5, 0.25).unwrap(), 2.0);
        assert_eq!(calmar_ratio(0.5, 0.0), None);
        assert_eq!(calmar_ratio(-0.1, 0.0), Some(0.0));
    }

    #[test]
    fn test_calculate_all_degenerate_inputs() {
        let report = calculate_all(dec!(10000), dec!(10000), &[], &[], 0.02, 252);
        assert_eq!(report, PerformanceReport::default());

        let curve = vec![point(1, dec!(10000))];
        let report = calculate_all(dec!(10000), dec!(10000), &curve, &[], 0.02, 252);
        assert_eq!(report, PerformanceReport::default());
    }

    #[test]
    fn test_calculate_all_merges_metrics() {
        let curve = vec![
            point(1, dec!(10000)),
            point(2, dec!(12000)),
            point(3, dec!(9000)),
            point(4, dec!(11000)),
        ];
        let trades = vec![
            trade_with_pnl(None),
            trade_with_pnl(Some(dec!(2000))),
            trade_with_pnl(Some(dec!(-1000))),
        ];
        let report = calculate_all(dec!(10000), dec!(11000), &curve, &trades, 0.02, 252);

        assert_relative_eq!(report.total_return, 0.1);
        assert_relative_eq!(report.total_return_pct, 10.0);
        assert_relative_eq!(report.max_drawdown, 0.25);
        assert_eq!(report.total_trades, 3);
        assert_eq!(report.winning_trades, 1);
        assert_eq!(report.losing_trades, 1);
        assert_relative_eq!(report.win_rate, 1.0 / 3.0);
        assert_relative_eq!(report.profit_factor.unwrap(), 2.0);
        assert_relative_eq!(report.calmar_ratio.unwrap(), 0.4);
    }
}
