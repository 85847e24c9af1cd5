//! Main application logic and lifecycle management.
//!
//! `Application` loads and merges configuration, starts the local cluster
//! and the bot fleet, reports health once a minute, and tears everything
//! down in order on SIGINT/SIGTERM.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{shutdown_on_signal, wait_for_signal},
};
use meridian_node::{BotFleet, ClusterStats, LocalCluster};
use tracing::{error, info, warn};

pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();
        Ok(Self { config })
    }

    /// Runs the cluster until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Meridian");
        self.log_configuration_summary();

        let cluster = LocalCluster::start(self.config.to_cluster_config())?;
        let shutdown_state = cluster.shutdown_state();

        let fleet = if self.config.bots.enabled && self.config.bots.total > 0 {
            Some(BotFleet::spawn(
                &self.config.to_bot_config(),
                cluster.clients(),
                cluster.settings(),
                cluster.pubsub(),
                shutdown_state.clone(),
            )?)
        } else {
            info!("🤖 Bot simulation disabled");
            None
        };

        let monitoring_handle = {
            let router = cluster.router().clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                interval.tick().await;
                let mut last_positions = 0u64;

                loop {
                    interval.tick().await;

                    let stats = ClusterStats::collect(router.managers());
                    let positions_this_period = stats.positions_received - last_positions;
                    last_positions = stats.positions_received;

                    info!(
                        "📊 Cluster Health - {} positions/min | {} regions | {} summaries | {} node(s)",
                        positions_this_period, stats.active_regions, stats.active_summaries, stats.nodes
                    );
                    if stats.routing_failures > 0 || stats.messages_dropped > 0 {
                        warn!(
                            "⚠️ {} routing failures, {} dropped messages so far",
                            stats.routing_failures, stats.messages_dropped
                        );
                    }
                }
            })
        };

        info!("✅ Meridian is now running!");
        info!("🔍 Health monitoring active - stats every 60 seconds");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        shutdown_on_signal(&shutdown_state).await?;

        // Second signal: give up on graceful shutdown.
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        info!("📡 Phase 1: Stopping sessions and bots...");
        monitoring_handle.abort();
        if let Some(fleet) = &fleet {
            info!("🤖 {} bot positions reported in total", fleet.steps());
            fleet.stop();
        }

        let final_stats = cluster.stats();

        info!("🧹 Phase 2: Stopping region managers...");
        cluster.shutdown().await;

        log_final_statistics(&final_stats);
        info!("✅ Meridian shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let aggregation = &self.config.aggregation;
        info!("📋 Configuration Summary:");
        info!(
            "  🌐 Nodes: {} ({} virtual nodes each)",
            self.config.cluster.nodes, self.config.cluster.virtual_nodes
        );
        info!(
            "  🗺️ Leaf zoom: {} | max {} regions per viewport",
            aggregation.max_zoom_depth, aggregation.max_subscription_regions
        );
        info!(
            "  📦 Clustering: above {} points into {}x{} cells",
            aggregation.cluster_threshold, aggregation.cluster_dimension, aggregation.cluster_dimension
        );
        info!(
            "  ⏱️ Summary every {}ms | expiry {}ms | subscriber batch {}ms",
            aggregation.summary_interval_ms, aggregation.expiry_interval_ms, aggregation.subscriber_batch_interval_ms
        );
        if self.config.bots.enabled {
            info!(
                "  🤖 Bots: {} stepping every {}ms",
                self.config.bots.total, self.config.bots.step_interval_ms
            );
        }
    }
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(nodes) = args.nodes {
        config.cluster.nodes = nodes;
    }
    if let Some(bots) = args.bots {
        config.bots.enabled = true;
        config.bots.total = bots;
    }
    if args.no_bots {
        config.bots.enabled = false;
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

fn log_final_statistics(stats: &ClusterStats) {
    info!("📊 Final Statistics:");
    info!("  - Positions received: {}", stats.positions_received);
    info!("  - Child batches routed: {}", stats.batches_routed);
    info!("  - Active partitions at shutdown: {}", stats.active_regions + stats.active_summaries);
}
