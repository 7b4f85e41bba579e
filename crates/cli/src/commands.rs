//! Subcommands of `bucketctl`.

use crate::config::load_distribution_config;
use anyhow::{bail, Context};
use clap::{Args, Subcommand, ValueEnum};
use distribution::{
    BalancingResult, BucketStatistics, BucketStatsTable, ClusterActivity, DistributionInfo,
    DistributionManager, DistributionMode, NodeAddress, NodeInfo,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Found a cluster, join nodes, apply leaves and balance ticks, then
    /// print the resulting distribution
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of nodes that join, founder included
    #[arg(long, default_value = "3")]
    pub nodes: usize,

    /// Address of a node to remove after the joins (repeatable)
    #[arg(long)]
    pub leave: Vec<NodeAddress>,

    /// Bucket weight profile
    #[arg(long, value_enum, default_value_t = WeightProfile::Uniform)]
    pub weights: WeightProfile,

    /// Bucket selection mode for joins
    #[arg(long, value_enum, default_value_t = ModeArg::Shuffle)]
    pub mode: ModeArg,

    /// JSON file with distribution settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WeightProfile {
    /// Every bucket holds the same amount of data
    Uniform,
    /// The first fifth of the buckets holds most of the data
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Shuffle,
    OptimalTime,
    OptimalWeight,
    AvgWeightTime,
}

impl From<ModeArg> for DistributionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Shuffle => DistributionMode::ShuffleBuckets,
            ModeArg::OptimalTime => DistributionMode::OptimalTime,
            ModeArg::OptimalWeight => DistributionMode::OptimalWeight,
            ModeArg::AvgWeightTime => DistributionMode::AvgWeightTime,
        }
    }
}

/// Output of a command.
#[derive(Debug)]
pub enum CommandResult {
    Simulation { report: SimulationReport, json: bool },
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Simulation { report, json: true } => {
                let text = serde_json::to_string_pretty(report).map_err(|_| fmt::Error)?;
                f.write_str(&text)
            }
            CommandResult::Simulation { report, json: false } => report.fmt(f),
        }
    }
}

/// Final state of a simulated cluster.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub total_buckets: usize,
    pub mode: String,
    pub total_data_size: i64,
    pub nodes: Vec<NodeReport>,
    pub balance_ticks: Vec<TickReport>,
}

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub address: NodeAddress,
    pub buckets: usize,
    pub data_size: i64,
}

#[derive(Debug, Serialize)]
pub struct TickReport {
    pub node: NodeAddress,
    pub percent_above_avg: i64,
    pub result: String,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} buckets, mode {}, {} bytes",
            self.total_buckets, self.mode, self.total_data_size
        )?;
        writeln!(f, "{:<22} {:>8} {:>14}", "NODE", "BUCKETS", "DATA")?;
        for node in &self.nodes {
            writeln!(f, "{:<22} {:>8} {:>14}", node.address.to_string(), node.buckets, node.data_size)?;
        }
        for tick in &self.balance_ticks {
            writeln!(
                f,
                "balance {} (+{}%): {}",
                tick.node, tick.percent_above_avg, tick.result
            )?;
        }
        Ok(())
    }
}

impl Command {
    pub fn execute(self) -> anyhow::Result<CommandResult> {
        match self {
            Command::Simulate(args) => {
                let json = args.json;
                let report = simulate(&args)?;
                Ok(CommandResult::Simulation { report, json })
            }
        }
    }
}

fn node_address(index: usize) -> anyhow::Result<NodeAddress> {
    let text = format!("10.0.{}.{}:7800", index / 250, index % 250 + 1);
    text.parse()
        .with_context(|| format!("building address {text}"))
}

fn weight_table(profile: WeightProfile, total: usize) -> BucketStatsTable {
    (0..total)
        .map(|id| {
            let size = match profile {
                WeightProfile::Uniform => 1024,
                WeightProfile::Skewed if id < total / 5 => 16 * 1024,
                WeightProfile::Skewed => 512,
            };
            (id, BucketStatistics::with_size(size))
        })
        .collect()
}

fn plan_and_install(
    manager: &DistributionManager,
    info: &DistributionInfo,
    left: &[NodeAddress],
) -> anyhow::Result<BalancingResult> {
    let maps = manager.get_maps(info)?;
    manager.install_hash_map(&maps, left)?;
    Ok(maps.result)
}

/// Lock and release every pending bucket on behalf of its new owner.
fn complete_transfers(manager: &DistributionManager) -> anyhow::Result<usize> {
    let Some(map) = manager.installed_map() else {
        return Ok(0);
    };
    let mut moved = 0;
    for bucket in map.iter().filter(|b| !b.is_settled()) {
        let locked = manager.lock_buckets(&[bucket.id], bucket.temporary)?;
        moved += manager.release_buckets(&locked.lock_acquired, bucket.temporary);
    }
    debug!(moved, "transfers completed");
    Ok(moved)
}

/// Drive a manager through the whole scenario described by `args`.
pub fn simulate(args: &SimulateArgs) -> anyhow::Result<SimulationReport> {
    if args.nodes == 0 {
        bail!("at least one node is required");
    }
    let config = load_distribution_config(args.config.as_deref())?;
    let total = config.total_buckets;
    let manager = DistributionManager::new(config)?;
    let mode = DistributionMode::from(args.mode);

    let founder = node_address(0)?;
    manager.set_local_address(founder);
    let founding = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(founder));
    plan_and_install(&manager, &founding, &[])?;
    manager.update_bucket_stats(&founder, &weight_table(args.weights, total));

    for index in 1..args.nodes {
        let address = node_address(index)?;
        let info = DistributionInfo::new(ClusterActivity::NodeJoin, NodeInfo::new(address)).with_mode(mode);
        plan_and_install(&manager, &info, &[])?;
        let moved = complete_transfers(&manager)?;
        info!(node = %address, moved, "node joined");
    }

    for address in &args.leave {
        if !manager.members().contains(address) {
            bail!("{address} is not a member of the simulated cluster");
        }
        let info = DistributionInfo::new(ClusterActivity::NodeLeave, NodeInfo::new(*address));
        plan_and_install(&manager, &info, &[*address])?;
        complete_transfers(&manager)?;
        info!(node = %address, "node left");
    }

    let mut balance_ticks = Vec::new();
    for candidate in manager.candidate_nodes_for_balance() {
        let info = DistributionInfo::new(ClusterActivity::None, NodeInfo::new(candidate.node));
        let result = plan_and_install(&manager, &info, &[])?;
        complete_transfers(&manager)?;
        balance_ticks.push(TickReport {
            node: candidate.node,
            percent_above_avg: candidate.percent_above_avg,
            result: format!("{result:?}"),
        });
    }

    let map = manager
        .installed_map()
        .context("simulation ended without an installed map")?;
    let stats = manager.bucket_stats();
    let nodes = manager
        .members()
        .into_iter()
        .map(|address| NodeReport {
            address,
            buckets: map.permanent_count(&address),
            data_size: map
                .iter()
                .filter(|b| b.permanent == address)
                .map(|b| stats.get(&b.id).map_or(0, |s| s.data_size))
                .sum(),
        })
        .collect();

    Ok(SimulationReport {
        total_buckets: total,
        mode: mode.to_string(),
        total_data_size: manager.total_data_size(),
        nodes,
        balance_ticks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(nodes: usize) -> SimulateArgs {
        SimulateArgs {
            nodes,
            leave: Vec::new(),
            weights: WeightProfile::Uniform,
            mode: ModeArg::Shuffle,
            config: None,
            json: false,
        }
    }

    #[test]
    fn test_two_nodes_split_evenly() {
        let report = simulate(&args(2)).unwrap();
        assert_eq!(report.nodes.len(), 2);
        assert!(report.nodes.iter().all(|n| n.buckets == 500));
        assert_eq!(report.total_data_size, 1000 * 1024);
    }

    #[test]
    fn test_leave_moves_everything_to_the_rest() {
        let mut simulate_args = args(3);
        simulate_args.leave = vec![node_address(1).unwrap()];
        let report = simulate(&simulate_args).unwrap();
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.nodes.iter().map(|n| n.buckets).sum::<usize>(), 1000);
    }

    #[test]
    fn test_unknown_leave_is_rejected() {
        let mut simulate_args = args(2);
        simulate_args.leave = vec!["192.168.0.1:7800".parse().unwrap()];
        assert!(simulate(&simulate_args).is_err());
    }

    #[test]
    fn test_json_report() {
        let report = simulate(&args(1)).unwrap();
        let text = CommandResult::Simulation { report, json: true }.to_string();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_buckets"], 1000);
        assert_eq!(value["nodes"][0]["address"], "10.0.0.1:7800");
    }
}
