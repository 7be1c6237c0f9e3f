//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::bar::Granularity;
use crate::domain::config_validation::{
    validate_backtest_config, validate_live_config, validate_strategy_config,
};
use crate::domain::error::PairtraderError;
use crate::domain::ledger::TradeRecord;
use crate::domain::metrics::ExpectancyStats;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;

/// Exit code when the backtest gate keeps the live trader from starting.
pub const GATE_CLOSED_EXIT: u8 = 6;

#[derive(Parser, Debug)]
#[command(name = "pairtrader", about = "ADX divergence pair trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over the configured CSV data
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the trade ledger to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Trade against the paper broker until Ctrl-C
    Live {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the persisted trade ledger
    Trades {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest { config, output } => run_backtest_command(&config, output.as_deref()),
        Command::Live { config } => run_live(&config),
        Command::Trades { config } => run_trades(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Serve { config } => run_serve(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: PairtraderError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

pub fn build_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, PairtraderError> {
    let defaults = StrategyConfig::default();
    let granularity = config
        .get_string_or("strategy", "granularity", &defaults.granularity.to_string())
        .parse::<Granularity>()
        .map_err(|reason| PairtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: "granularity".into(),
            reason,
        })?;

    let period = |key: &str, default: usize| -> Result<usize, PairtraderError> {
        let value = config.get_int("strategy", key, default as i64);
        usize::try_from(value).map_err(|_| PairtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: key.into(),
            reason: format!("{} must be a positive integer", key),
        })
    };

    Ok(StrategyConfig {
        instrument: config.get_string_or("strategy", "instrument", &defaults.instrument),
        reference: config.get_string_or("strategy", "reference", &defaults.reference),
        granularity,
        adx_threshold: config.get_double("strategy", "adx_threshold", defaults.adx_threshold),
        adx_period: period("adx_period", defaults.adx_period)?,
        atr_period: period("atr_period", defaults.atr_period)?,
        sma_period: period("sma_period", defaults.sma_period)?,
        volume_period: period("volume_period", defaults.volume_period)?,
        trailing_stop_atr_multiplier: config.get_double(
            "strategy",
            "trailing_stop_atr_multiplier",
            defaults.trailing_stop_atr_multiplier,
        ),
        risk_fraction: config.get_double("strategy", "risk_fraction", defaults.risk_fraction),
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    let defaults = BacktestConfig::default();
    BacktestConfig {
        initial_balance: config.get_double("backtest", "initial_balance", defaults.initial_balance),
    }
}

/// Bars requested per instrument, for both the backtest and each live cycle.
pub fn bar_count(config: &dyn ConfigPort) -> usize {
    config.get_int("backtest", "bar_count", 500).max(1) as usize
}

pub fn build_market_data(config: &dyn ConfigPort, granularity: Granularity) -> CsvMarketData {
    CsvMarketData::new(
        PathBuf::from(config.get_string_or("data", "csv_dir", "data")),
        granularity,
    )
}

/// Live poll interval: `[live] poll_interval_secs`, else one bar.
/// How often `live` re-runs the backtest gate. Defaults to one week.
pub fn regate_interval(config: &dyn ConfigPort) -> chrono::Duration {
    chrono::Duration::seconds(config.get_int("live", "regate_interval_secs", 604_800).max(1))
}

pub fn poll_interval(config: &dyn ConfigPort, granularity: Granularity) -> Duration {
    let secs = config.get_int("live", "poll_interval_secs", 0);
    if secs > 0 {
        return Duration::from_secs(secs as u64);
    }
    granularity
        .interval()
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

/// Validate every section a command depends on.
fn validate_all(config: &dyn ConfigPort, live: bool) -> Result<(), PairtraderError> {
    validate_strategy_config(config)?;
    validate_backtest_config(config)?;
    if live {
        validate_live_config(config)?;
    }
    Ok(())
}

/// Fetch both instruments and run the backtest over them.
pub fn run_backtest_pipeline(
    market: &dyn MarketDataPort,
    strategy: &StrategyConfig,
    bt_config: &BacktestConfig,
    bar_count: usize,
) -> Result<BacktestResult, PairtraderError> {
    let traded = market.get_bars(&strategy.instrument, strategy.granularity, bar_count)?;
    let reference = market.get_bars(&strategy.reference, strategy.granularity, bar_count)?;
    eprintln!(
        "Loaded {} {} bars and {} {} bars",
        traded.len(),
        strategy.instrument,
        reference.len(),
        strategy.reference
    );
    run_backtest(&traded, &reference, strategy, bt_config)
}

fn print_backtest_summary(strategy: &StrategyConfig, result: &BacktestResult) {
    let stats = &result.expectancy;
    eprintln!();
    eprintln!(
        "Backtest {} vs {} ({})",
        strategy.instrument, strategy.reference, strategy.granularity
    );
    eprintln!("  Steps:            {}", result.steps.len());
    eprintln!("  Closed trades:    {}", stats.trades);
    eprintln!("  Win rate:         {:.1}%", stats.win_rate * 100.0);
    eprintln!("  Average win:      {:.5}", stats.avg_win);
    eprintln!("  Average loss:     {:.5}", stats.avg_loss);
    eprintln!("  Expectancy:       {:.5}", stats.expectancy);
    eprintln!("  Realized balance: {:.2}", result.realized_balance);
    eprintln!("  Total return:     {:.2}%", result.summary.total_return * 100.0);
    eprintln!("  Max drawdown:     {:.2}%", result.summary.max_drawdown * 100.0);
    if let Some(position) = &result.open_position {
        eprintln!(
            "  Open position:    {} {} units from {:.5}, stop {:.5}",
            position.direction, position.units, position.entry_price, position.stop_loss_price
        );
    }
    eprintln!(
        "  Live trading:     {}",
        if result.live_trading_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// Write ledger records as CSV, one row per trade.
pub fn write_trades_csv(path: &Path, records: &[TradeRecord]) -> Result<(), PairtraderError> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    writer
        .write_record([
            "id",
            "instrument",
            "direction",
            "units",
            "entry_price",
            "stop_loss",
            "entry_time",
            "exit_price",
            "exit_time",
            "profit",
            "profit_ratio",
            "expectancy",
        ])
        .map_err(std::io::Error::from)?;

    for record in records {
        let entry = &record.entry;
        let exit = record.exit.as_ref();
        writer
            .write_record([
                record.id.to_string(),
                entry.instrument.clone(),
                entry.direction.as_str().to_string(),
                entry.units.to_string(),
                entry.entry_price.to_string(),
                entry.stop_loss_price.to_string(),
                entry.entry_time.to_rfc3339(),
                exit.map_or_else(String::new, |e| e.exit_price.to_string()),
                exit.map_or_else(String::new, |e| e.exit_time.to_rfc3339()),
                exit.map_or_else(String::new, |e| e.profit.to_string()),
                exit.map_or_else(String::new, |e| e.profit_ratio.to_string()),
                exit.map_or_else(String::new, |e| e.expectancy.to_string()),
            ])
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_backtest_command(config_path: &Path, output_path: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&config, false) {
        return fail(e);
    }

    let strategy = match build_strategy_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let bt_config = build_backtest_config(&config);
    let market = build_market_data(&config, strategy.granularity);

    let result = match run_backtest_pipeline(&market, &strategy, &bt_config, bar_count(&config)) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    print_backtest_summary(&strategy, &result);

    if let Some(path) = output_path {
        if let Err(e) = write_trades_csv(path, result.ledger.records()) {
            return fail(e);
        }
        eprintln!("Trades written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_live(config_path: &Path) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::paper_broker::PaperBroker;
        use crate::adapters::sqlite_adapter::SqliteLedger;
        use crate::domain::live::{GateSchedule, LiveTrader};

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        if let Err(e) = validate_all(&config, true) {
            return fail(e);
        }

        let strategy = match build_strategy_config(&config) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };
        let bt_config = build_backtest_config(&config);
        let count = bar_count(&config);
        let market = build_market_data(&config, strategy.granularity);

        let gate = match run_backtest_pipeline(&market, &strategy, &bt_config, count) {
            Ok(r) => r,
            Err(e) => return fail(e),
        };
        print_backtest_summary(&strategy, &gate);
        if !gate.live_trading_enabled() {
            eprintln!(
                "Live trading disabled: backtest expectancy {:.5} is not positive",
                gate.expectancy.expectancy
            );
            return ExitCode::from(GATE_CLOSED_EXIT);
        }
        info!(
            "backtest gate open with expectancy {:.5}",
            gate.expectancy.expectancy
        );

        let ledger = match SqliteLedger::from_config(&config) {
            Ok(l) => l,
            Err(e) => return fail(e),
        };
        let broker = PaperBroker::new(
            &market,
            config.get_double("live", "paper_balance", 10_000.0),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let handler_flag = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
            eprintln!("error: failed to install Ctrl-C handler: {e}");
            return ExitCode::from(1);
        }

        let interval = poll_interval(&config, strategy.granularity);
        let schedule = GateSchedule {
            backtest: bt_config,
            interval: regate_interval(&config),
        };
        let mut trader = LiveTrader::new(strategy, count, &market, &broker, &ledger)
            .with_gate(schedule, true, chrono::Utc::now());
        match trader.run(&stop, interval) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        eprintln!("error: sqlite feature is required for live trading");
        ExitCode::from(1)
    }
}

fn run_trades(config_path: &Path) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteLedger;
        use crate::ports::ledger_port::LedgerPort;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        let ledger = match SqliteLedger::from_config(&config) {
            Ok(l) => l,
            Err(e) => return fail(e),
        };
        let records = match ledger.list_trades() {
            Ok(r) => r,
            Err(e) => return fail(e),
        };

        print_ledger(&records);
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        eprintln!("error: sqlite feature is required for the trade ledger");
        ExitCode::from(1)
    }
}

#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
fn print_ledger(records: &[TradeRecord]) {
    println!(
        "{:>4}  {:<10} {:<5} {:>8}  {:>10}  {:>10}  {:<20} {:>10}  {:>10}",
        "id", "instrument", "dir", "units", "entry", "stop", "entry_time", "exit", "profit"
    );
    for r in records {
        let (exit, profit) = match &r.exit {
            Some(e) => (format!("{:.5}", e.exit_price), format!("{:.5}", e.profit)),
            None => ("open".to_string(), String::new()),
        };
        println!(
            "{:>4}  {:<10} {:<5} {:>8}  {:>10.5}  {:>10.5}  {:<20} {:>10}  {:>10}",
            r.id,
            r.entry.instrument,
            r.entry.direction.as_str(),
            r.entry.units,
            r.entry.entry_price,
            r.entry.stop_loss_price,
            r.entry.entry_time.format("%Y-%m-%d %H:%M:%S"),
            exit,
            profit
        );
    }

    let stats = ExpectancyStats::compute(records);
    eprintln!();
    eprintln!(
        "{} closed trades, win rate {:.1}%, expectancy {:.5}",
        stats.trades,
        stats.win_rate * 100.0,
        stats.expectancy
    );
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&config, true) {
        return fail(e);
    }
    let strategy = match build_strategy_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    eprintln!("\nStrategy:");
    eprintln!("  Instrument:  {}", strategy.instrument);
    eprintln!("  Reference:   {}", strategy.reference);
    eprintln!("  Granularity: {}", strategy.granularity);
    eprintln!(
        "  ADX:         period {}, threshold {}",
        strategy.adx_period, strategy.adx_threshold
    );
    eprintln!(
        "  ATR:         period {}, stop multiplier {}",
        strategy.atr_period, strategy.trailing_stop_atr_multiplier
    );
    eprintln!(
        "  SMA:         close {}, volume {}",
        strategy.sma_period, strategy.volume_period
    );
    eprintln!("  Risk:        {}", strategy.risk_fraction);
    eprintln!("  Warm-up:     {} bars", strategy.warmup_bars());
    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}

fn run_serve(config_path: &Path) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::sqlite_adapter::SqliteLedger;
        use crate::adapters::web::{build_router, AppState};
        use std::net::SocketAddr;

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let ledger = match SqliteLedger::from_config(&config) {
            Ok(l) => l,
            Err(e) => return fail(e),
        };

        let listen = config.get_string_or("web", "listen", "127.0.0.1:3000");
        let addr: SocketAddr = match listen.parse() {
            Ok(a) => a,
            Err(_) => {
                return fail(PairtraderError::ConfigInvalid {
                    section: "web".into(),
                    key: "listen".into(),
                    reason: format!("'{}' is not a socket address", listen),
                });
            }
        };

        let state = AppState {
            ledger: Arc::new(ledger),
            instrument: config.get_string_or("strategy", "instrument", "EUR_USD"),
        };
        let router = build_router(state);

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(r) => r,
            Err(e) => return fail(PairtraderError::Io(e)),
        };
        eprintln!("Starting web server on {}", addr);
        let served = runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        });
        match served {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(PairtraderError::Io(e)),
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn strategy_defaults_when_section_empty() {
        let strategy = build_strategy_config(&config("[strategy]\n")).unwrap();
        assert_eq!(strategy, StrategyConfig::default());
    }

    #[test]
    fn strategy_reads_overrides() {
        let strategy = build_strategy_config(&config(
            "[strategy]\ninstrument = GBP_USD\nreference = DXY\ngranularity = H1\nadx_period = 10\nrisk_fraction = 0.01\n",
        ))
        .unwrap();
        assert_eq!(strategy.instrument, "GBP_USD");
        assert_eq!(strategy.reference, "DXY");
        assert_eq!(strategy.granularity, Granularity::H1);
        assert_eq!(strategy.adx_period, 10);
        assert_eq!(strategy.risk_fraction, 0.01);
        assert_eq!(strategy.sma_period, 20);
    }

    #[test]
    fn negative_period_is_invalid() {
        let err = build_strategy_config(&config("[strategy]\natr_period = -3\n")).unwrap_err();
        assert!(matches!(err, PairtraderError::ConfigInvalid { key, .. } if key == "atr_period"));
    }

    #[test]
    fn poll_interval_defaults_to_bar_length() {
        let empty = config("[live]\n");
        assert_eq!(poll_interval(&empty, Granularity::M15), Duration::from_secs(900));
        let explicit = config("[live]\npoll_interval_secs = 30\n");
        assert_eq!(poll_interval(&explicit, Granularity::M15), Duration::from_secs(30));
    }

    #[test]
    fn regate_interval_defaults_to_a_week() {
        assert_eq!(regate_interval(&config("[live]\n")), chrono::Duration::weeks(1));
        let explicit = config("[live]\nregate_interval_secs = 3600\n");
        assert_eq!(regate_interval(&explicit), chrono::Duration::hours(1));
    }

    #[test]
    fn bar_count_has_floor_of_one() {
        assert_eq!(bar_count(&config("[backtest]\nbar_count = 0\n")), 1);
        assert_eq!(bar_count(&config("[backtest]\n")), 500);
    }
}
