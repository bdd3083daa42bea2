//! Prometheus export
//!
//! A small registry fed from the timer thread's status snapshot; the
//! control-plane server serves it at `/metrics`. Nothing here runs on
//! the tick path.

use crate::control::status::StatusSnapshot;
use anyhow::{Context, Result};
use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

/// Registry plus the gauges the runtime maintains
pub struct Metrics {
    registry: Registry,
    pub ticks: IntGauge,
    pub exposure: IntGauge,
    pub deviation: Gauge,
    pub spread_std_dev: Gauge,
    pub orders_sent: IntGauge,
    pub orders_rejected: IntGauge,
    pub fills: IntGauge,
    pub realized_pnl: Gauge,
    pub unrealized_pnl: Gauge,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, help))?;
    registry
        .register(Box::new(g.clone()))
        .with_context(|| format!("register {name}"))?;
    Ok(g)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let g = Gauge::with_opts(Opts::new(name, help))?;
    registry
        .register(Box::new(g.clone()))
        .with_context(|| format!("register {name}"))?;
    Ok(g)
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            ticks: int_gauge(&registry, "tandem_ticks_total", "Market-data records applied")?,
            exposure: int_gauge(
                &registry,
                "tandem_exposure_lots",
                "Residual directional exposure across both legs",
            )?,
            deviation: gauge(
                &registry,
                "tandem_spread_deviation",
                "Standardised spread deviation at the last tick",
            )?,
            spread_std_dev: gauge(
                &registry,
                "tandem_spread_std_dev",
                "Rolling spread standard deviation",
            )?,
            orders_sent: int_gauge(&registry, "tandem_orders_sent_total", "Orders sent, both legs")?,
            orders_rejected: int_gauge(
                &registry,
                "tandem_orders_rejected_total",
                "Rejects counted, both legs",
            )?,
            fills: int_gauge(&registry, "tandem_fills_total", "Fills applied, both legs")?,
            realized_pnl: gauge(
                &registry,
                "tandem_realized_pnl",
                "Realised PnL summed over both legs",
            )?,
            unrealized_pnl: gauge(
                &registry,
                "tandem_unrealized_pnl",
                "Unrealised PnL summed over both legs",
            )?,
            registry,
        })
    }

    /// Refresh every gauge from a status snapshot.
    pub fn update_from(&self, status: &StatusSnapshot) {
        self.ticks.set(status.ticks as i64);
        self.exposure.set(status.exposure);
        self.deviation.set(status.spread.deviation);
        self.spread_std_dev.set(status.spread.std_dev);

        let mut sent = 0i64;
        let mut rejected = 0i64;
        let mut fills = 0i64;
        let mut realized = 0.0;
        let mut unrealized = 0.0;
        for leg in &status.legs {
            sent += leg.orders_sent as i64;
            rejected += leg.reject_count as i64;
            fills += leg.fills_seen as i64;
            realized += leg.realized_pnl;
            unrealized += leg.unrealized_pnl;
        }
        self.orders_sent.set(sent);
        self.orders_rejected.set(rejected);
        self.fills.set(fills);
        self.realized_pnl.set(realized);
        self.unrealized_pnl.set(unrealized);
    }

    /// Encode the registry in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("encode metrics")?;
        String::from_utf8(buffer).context("metrics not utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::status::StatusSnapshot;

    #[test]
    fn test_encode_contains_gauges() {
        let metrics = Metrics::new().unwrap();
        let mut status = StatusSnapshot::empty(1);
        status.ticks = 42;
        status.exposure = -3;
        status.spread.deviation = -2.5;
        metrics.update_from(&status);

        let text = metrics.encode().unwrap();
        assert!(text.contains("tandem_ticks_total 42"));
        assert!(text.contains("tandem_exposure_lots -3"));
        assert!(text.contains("tandem_spread_deviation -2.5"));
        assert!(text.contains("HELP"));
    }
}
