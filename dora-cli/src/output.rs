use clap::ValueEnum;
use dora_engine::{CacheStats, PartitionStats, TrxCounters};
use dora_tpcc::TrxType;
use serde::Serialize;
use strum::Display;
use tabled::Table;
use tabled::builder::Builder;
use tabled::settings::{Style, Theme};

#[derive(Debug, ValueEnum, Clone, Copy, Default, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    Sharp,
    Modern,
    Psql,
    Markdown,
}

impl OutputMode {
    fn theme(self) -> Theme {
        match self {
            OutputMode::Sharp => Theme::from_style(Style::sharp()),
            OutputMode::Modern => Theme::from_style(Style::modern()),
            OutputMode::Psql => Theme::from_style(Style::psql()),
            OutputMode::Markdown => Theme::from_style(Style::markdown()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrxRow {
    pub trx_type: TrxType,
    #[serde(flatten)]
    pub counters: TrxCounters,
}

/// Everything a run reports.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub clients: usize,
    pub elapsed_secs: f64,
    pub throughput: f64,
    pub transactions: Vec<TrxRow>,
    pub totals: TrxCounters,
    pub partitions: Vec<PartitionStats>,
    pub action_cache: CacheStats,
    pub rvp_cache: CacheStats,
}

fn table(
    mode: OutputMode,
    header: &[&str],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> Table {
    let mut builder = Builder::new();
    builder.push_record(header.iter().map(|h| h.to_string()));
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(mode.theme());
    table
}

impl RunReport {
    pub fn render(&self, mode: OutputMode) -> String {
        let counters = |c: &TrxCounters| {
            vec![
                c.attempted.to_string(),
                c.committed.to_string(),
                c.aborted.to_string(),
                c.user_aborts.to_string(),
            ]
        };
        let trx = table(
            mode,
            &["transaction", "attempted", "committed", "aborted", "user aborts"],
            self.transactions
                .iter()
                .map(|row| {
                    let mut cells = vec![row.trx_type.to_string()];
                    cells.extend(counters(&row.counters));
                    cells
                })
                .chain(std::iter::once({
                    let mut cells = vec!["total".to_owned()];
                    cells.extend(counters(&self.totals));
                    cells
                })),
        );
        let partitions = table(
            mode,
            &[
                "table",
                "partition",
                "keys",
                "served",
                "early aborts",
                "failures",
                "lock waits",
                "deadlocks",
                "rvps fired",
            ],
            self.partitions.iter().map(|p| {
                vec![
                    p.table.clone(),
                    p.partition.to_string(),
                    format!("{}..={}", p.lo, p.hi),
                    p.served.to_string(),
                    p.early_aborts.to_string(),
                    p.failures.to_string(),
                    p.lock_waits.to_string(),
                    p.deadlocks.to_string(),
                    p.rvps_fired.to_string(),
                ]
            }),
        );
        let caches = table(
            mode,
            &["cache", "requests", "setups", "givebacks"],
            [("action", self.action_cache), ("rvp", self.rvp_cache)]
                .into_iter()
                .map(|(name, c)| {
                    vec![
                        name.to_owned(),
                        c.requests.to_string(),
                        c.setups.to_string(),
                        c.givebacks.to_string(),
                    ]
                }),
        );
        format!(
            "{} clients, {:.2}s, {:.1} committed trx/s\n{trx}\n{partitions}\n{caches}",
            self.clients, self.elapsed_secs, self.throughput
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        let counters = TrxCounters {
            attempted: 3,
            committed: 2,
            aborted: 1,
            user_aborts: 1,
        };
        RunReport {
            clients: 1,
            elapsed_secs: 1.0,
            throughput: 2.0,
            transactions: vec![TrxRow {
                trx_type: TrxType::NewOrder,
                counters,
            }],
            totals: counters,
            partitions: Vec::new(),
            action_cache: CacheStats::default(),
            rvp_cache: CacheStats::default(),
        }
    }

    #[test]
    fn test_render_tables() {
        let text = report().render(OutputMode::Markdown);
        assert!(text.starts_with("1 clients, 1.00s, 2.0 committed trx/s"));
        assert!(text.contains("| new-order"));
        assert!(text.contains("| total"));
    }

    #[test]
    fn test_json_flattens_counters() {
        let value = serde_json::to_value(report()).unwrap();
        let row = &value["transactions"][0];
        assert_eq!(row["trx_type"], "new-order");
        assert_eq!(row["committed"], 2);
    }
}
