//! HTML templates using Askama.

use askama::Template;

use crate::domain::ledger::TradeRecord;
use crate::domain::metrics::ExpectancyStats;

/// One ledger row, preformatted for display.
pub struct TradeRow {
    pub id: i64,
    pub instrument: String,
    pub direction: &'static str,
    pub units: i64,
    pub entry_price: String,
    pub stop_loss: String,
    pub entry_time: String,
    pub exit_price: String,
    pub exit_time: String,
    pub profit: String,
    pub status: &'static str,
}

impl From<&TradeRecord> for TradeRow {
    fn from(record: &TradeRecord) -> Self {
        let exit = record.exit.as_ref();
        Self {
            id: record.id,
            instrument: record.entry.instrument.clone(),
            direction: record.entry.direction.as_str(),
            units: record.entry.units,
            entry_price: format!("{:.5}", record.entry.entry_price),
            stop_loss: format!("{:.5}", record.entry.stop_loss_price),
            entry_time: record.entry.entry_time.format("%Y-%m-%d %H:%M").to_string(),
            exit_price: exit.map_or_else(String::new, |e| format!("{:.5}", e.exit_price)),
            exit_time: exit.map_or_else(String::new, |e| {
                e.exit_time.format("%Y-%m-%d %H:%M").to_string()
            }),
            profit: exit.map_or_else(String::new, |e| format!("{:.5}", e.profit)),
            status: if exit.is_some() { "closed" } else { "open" },
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html>
<head><title>{{ instrument }} trades</title></head>
<body>
<h1>{{ instrument }} trades</h1>
<table class="summary">
<tr><th>Closed trades</th><td>{{ trades_closed }}</td></tr>
<tr><th>Win rate</th><td>{{ win_rate }}</td></tr>
<tr><th>Average win</th><td>{{ avg_win }}</td></tr>
<tr><th>Average loss</th><td>{{ avg_loss }}</td></tr>
<tr><th>Expectancy</th><td>{{ expectancy }}</td></tr>
</table>
{% if rows.is_empty() %}
<p>No trades recorded</p>
{% else %}
<table class="trades">
<tr><th>ID</th><th>Instrument</th><th>Direction</th><th>Units</th><th>Entry</th><th>Stop</th><th>Entry time</th><th>Exit</th><th>Exit time</th><th>Profit</th><th>Status</th></tr>
{% for row in rows %}
<tr class="{{ row.status }}"><td>{{ row.id }}</td><td>{{ row.instrument }}</td><td>{{ row.direction }}</td><td>{{ row.units }}</td><td>{{ row.entry_price }}</td><td>{{ row.stop_loss }}</td><td>{{ row.entry_time }}</td><td>{{ row.exit_price }}</td><td>{{ row.exit_time }}</td><td>{{ row.profit }}</td><td>{{ row.status }}</td></tr>
{% endfor %}
</table>
{% endif %}
</body>
</html>"#,
    ext = "html"
)]
pub struct TradesTemplate<'a> {
    pub instrument: &'a str,
    pub rows: Vec<TradeRow>,
    pub trades_closed: usize,
    pub win_rate: String,
    pub avg_win: String,
    pub avg_loss: String,
    pub expectancy: String,
}

impl<'a> TradesTemplate<'a> {
    pub fn new(instrument: &'a str, records: &[TradeRecord]) -> Self {
        let stats = ExpectancyStats::compute(records);
        Self {
            instrument,
            rows: records.iter().map(TradeRow::from).collect(),
            trades_closed: stats.trades,
            win_rate: format!("{:.1}%", stats.win_rate * 100.0),
            avg_win: format!("{:.5}", stats.avg_win),
            avg_loss: format!("{:.5}", stats.avg_loss),
            expectancy: format!("{:.5}", stats.expectancy),
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html>
<head><title>Error {{ status }}</title></head>
<body>
<h1>Error {{ status }}</h1>
<p class="error">{{ message }}</p>
</body>
</html>"#,
    ext = "html"
)]
pub struct ErrorTemplate<'a> {
    pub message: &'a str,
    pub status: u16,
}
