use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use clap::Parser;
use dora_engine::{ErrorClass, TrxError};
use dora_tpcc::{DoraTpcc, InputGenerator, Mix, PartitionConfig, TpccConfig};
use itertools::Itertools;
use miette::{IntoDiagnostic, Result, miette};
use tracing::{debug, info, warn};

use crate::cli::load_config;
use crate::output::{OutputMode, RunReport, TrxRow};

/// Load a TPC-C database and drive a transaction mix against it.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Configuration file; the flags below override its fields.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of warehouses.
    #[arg(short, long)]
    pub warehouses: Option<i32>,

    /// Partitions of every table.
    #[arg(short, long)]
    pub partitions: Option<usize>,

    /// Seed of the loader and of the input generators.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Client threads submitting transactions.
    #[arg(short, long, default_value_t = 4)]
    pub clients: usize,

    /// Transactions submitted by each client.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub transactions: usize,

    /// Transactions each client keeps in flight.
    #[arg(long, default_value_t = 1)]
    pub depth: usize,

    /// Transaction mix.
    #[arg(long, default_value_t = Mix::Tpcc)]
    pub mix: Mix,

    /// Bind each client to one home warehouse.
    #[arg(long)]
    pub home: bool,

    /// Table style.
    #[arg(long, default_value = "sharp")]
    pub mode: OutputMode,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn effective_config(&self) -> Result<TpccConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(warehouses) = self.warehouses {
            config.scale.warehouses = warehouses;
        }
        if let Some(partitions) = self.partitions {
            config.partitions = PartitionConfig::uniform(partitions);
        }
        if let Some(seed) = self.seed {
            config.scale.seed = seed;
        }
        Ok(config)
    }

    pub fn run(self) -> Result<()> {
        if self.clients == 0 || self.depth == 0 {
            return Err(miette!("clients and depth must be positive"));
        }
        let config = self.effective_config()?;
        info!(?config.scale, "loading database");
        let env = DoraTpcc::new(config).into_diagnostic()?;

        let started = Instant::now();
        thread::scope(|s| -> Result<()> {
            let clients = (0..self.clients)
                .map(|client| {
                    let env = &env;
                    let args = &self;
                    thread::Builder::new()
                        .name(format!("client-{client}"))
                        .spawn_scoped(s, move || drive(env, args, client))
                        .into_diagnostic()
                })
                .collect::<Result<Vec<_>>>()?;
            for client in clients {
                client
                    .join()
                    .map_err(|_| miette!("a client thread panicked"))??;
            }
            Ok(())
        })?;
        let elapsed = started.elapsed();
        env.stop();

        let report = report(&env, self.clients, elapsed.as_secs_f64());
        if self.json {
            let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
            println!("{json}");
        } else {
            println!("{}", report.render(self.mode));
        }
        Ok(())
    }
}

fn drive(env: &DoraTpcc, args: &RunArgs, client: usize) -> Result<()> {
    let scale = env.config().scale.clone();
    let warehouses = scale.warehouses;
    let seed = scale.seed.wrapping_add(client as u64 + 1);
    let mut generator = InputGenerator::new(scale, seed);
    if args.home {
        generator = generator.with_home((client as i32 % warehouses) + 1);
    }
    let mut in_flight = Vec::with_capacity(args.depth);
    for _ in 0..args.transactions {
        let handle = env
            .submit_nowait(generator.next_request(args.mix))
            .into_diagnostic()?;
        in_flight.push(handle);
        if in_flight.len() == args.depth {
            in_flight.drain(..).for_each(|h| log_abort(h.wait().error()));
        }
    }
    in_flight.into_iter().for_each(|h| log_abort(h.wait().error()));
    Ok(())
}

fn log_abort(err: Option<&TrxError>) {
    match err.map(|err| (err, err.class())) {
        None | Some((_, ErrorClass::UserData)) => {}
        Some((err, ErrorClass::Conflict)) => debug!(%err, "transaction aborted"),
        Some((err, _)) => warn!(%err, "transaction aborted"),
    }
}

fn report(env: &DoraTpcc, clients: usize, elapsed_secs: f64) -> RunReport {
    let totals = env.stats().totals();
    let transactions = env
        .stats()
        .snapshot()
        .into_iter()
        .sorted_by_key(|(trx_type, _)| *trx_type)
        .map(|(trx_type, counters)| TrxRow { trx_type, counters })
        .collect();
    let engine = env.engine();
    RunReport {
        clients,
        elapsed_secs,
        throughput: if elapsed_secs > 0.0 {
            totals.committed as f64 / elapsed_secs
        } else {
            0.0
        },
        transactions,
        totals,
        partitions: engine.partition_stats(),
        action_cache: engine.action_cache_stats(),
        rvp_cache: engine.rvp_cache_stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = RunArgs::try_parse_from(["run", "-w", "3", "-p", "2", "--seed", "9"]).unwrap();
        let config = args.effective_config().unwrap();
        assert_eq!(config.scale.warehouses, 3);
        assert_eq!(config.scale.seed, 9);
        assert_eq!(config.partitions, PartitionConfig::uniform(2));
        assert_eq!(config.scale.items, TpccConfig::default().scale.items);
    }

    #[test]
    fn test_small_run() {
        let args = RunArgs::try_parse_from(["run", "-c", "2", "-n", "20", "--depth", "2"]).unwrap();
        let mut config = TpccConfig::default();
        config.scale = dora_tpcc::ScaleConfig::small();
        config.partitions = PartitionConfig::uniform(2);
        let env = DoraTpcc::new(config).unwrap();
        thread::scope(|s| {
            for client in 0..args.clients {
                let (env, args) = (&env, &args);
                s.spawn(move || drive(env, args, client).unwrap());
            }
        });
        env.stop();
        let report = report(&env, args.clients, 1.0);
        assert_eq!(report.totals.attempted, 40);
        assert_eq!(report.totals.aborted, report.totals.user_aborts);
        assert_eq!(report.action_cache.requests, report.action_cache.givebacks);
    }
}
