//! Simulated users.
//!
//! Each bot is a client session of its own: it walks randomly inside the
//! configured area, reports its position every step, and every so often
//! moves its viewport to a random box around itself, so the fleet loads
//! both the update path and the subscription path.

use crate::config::BotConfig;
use crate::error::NodeError;
use crate::session::{ClientEvent, ClientSession};
use crate::shutdown::ShutdownState;
use meridian_core::{AggregationSettings, BoundingBox, GeoPoint, PubSub, RegionManagerClient};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Position and heading of one walking bot.
#[derive(Debug, Clone, PartialEq)]
pub struct Walker {
    pub position: GeoPoint,
    /// Radians, counter-clockwise from east
    pub heading: f64,
}

impl Walker {
    pub fn random(rng: &mut impl Rng, area: &BoundingBox) -> Self {
        Self {
            position: GeoPoint::new(
                rng.gen_range(area.south_west.lat..=area.north_east.lat),
                rng.gen_range(area.south_west.lng..=area.north_east.lng),
            ),
            heading: rng.gen_range(0.0..2.0 * PI),
        }
    }

    /// Moves `speed` degrees with a little heading jitter, bouncing off the area edges.
    pub fn step(&mut self, rng: &mut impl Rng, speed: f64, area: &BoundingBox) {
        self.heading += rng.gen_range(-0.3..0.3);
        let mut lat = self.position.lat + speed * self.heading.sin();
        let mut lng = self.position.lng + speed * self.heading.cos();

        let (south, north) = (area.south_west.lat, area.north_east.lat);
        let (west, east) = (area.south_west.lng, area.north_east.lng);
        if lat < south || lat > north {
            self.heading = -self.heading;
            lat = lat.clamp(south, north);
        }
        if lng < west || lng > east {
            self.heading = PI - self.heading;
            lng = lng.clamp(west, east);
        }
        self.position = GeoPoint::new(lat, lng);
    }

    /// A random viewport up to 10° high and 20° wide centred on the walker.
    pub fn viewport(&self, rng: &mut impl Rng) -> BoundingBox {
        let half_height = rng.gen_range(0.0..10.0) / 2.0;
        let half_width = rng.gen_range(0.0..20.0) / 2.0;
        let lat = self.position.lat;
        let lng = self.position.lng;
        BoundingBox::new(
            GeoPoint::new((lat - half_height).max(-90.0), lng - half_width),
            GeoPoint::new((lat + half_height).min(90.0), lng + half_width),
        )
    }
}

/// Running bots; dropping the fleet leaves them running until shutdown.
pub struct BotFleet {
    tasks: Vec<JoinHandle<()>>,
    steps: Arc<AtomicU64>,
}

impl BotFleet {
    /// Starts `config.total` bots, spread round-robin over `clients`.
    pub fn spawn(
        config: &BotConfig,
        clients: &[RegionManagerClient],
        settings: &AggregationSettings,
        pubsub: Arc<dyn PubSub>,
        shutdown: ShutdownState,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        if clients.is_empty() {
            return Err(NodeError::InvalidConfig("bots need at least one node".to_string()));
        }

        let steps = Arc::new(AtomicU64::new(0));
        let tasks = (0..config.total)
            .map(|i| {
                let session = ClientSession::new(
                    format!("bot-{i}"),
                    clients[i % clients.len()].clone(),
                    settings,
                    pubsub.clone(),
                );
                tokio::spawn(run_bot(session, config.clone(), shutdown.clone(), steps.clone()))
            })
            .collect();

        info!("🤖 Started {} bots over {} node(s)", config.total, clients.len());
        Ok(Self { tasks, steps })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Positions reported so far across all bots.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_bot(mut session: ClientSession, config: BotConfig, shutdown: ShutdownState, steps: Arc<AtomicU64>) {
    let mut rng = StdRng::from_entropy();
    let mut walker = Walker::random(&mut rng, &config.area);
    let mut ticker = interval(config.step_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stopped = shutdown.wait_for_shutdown();
    tokio::pin!(stopped);

    let mut step_count: u32 = 0;
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            update = session.next_update() => {
                if update.is_none() {
                    break;
                }
            }
            _ = ticker.tick() => {
                walker.step(&mut rng, config.speed_degrees, &config.area);
                let moved = ClientEvent::UserMoved { position: walker.position };
                if session.handle_event(moved).await.is_ok() {
                    steps.fetch_add(1, Ordering::Relaxed);
                }

                step_count = step_count.wrapping_add(1);
                if config.viewport_every > 0 && step_count % config.viewport_every == 0 {
                    let viewing = ClientEvent::ViewingArea { area: walker.viewport(&mut rng) };
                    let _ = session.handle_event(viewing).await;
                }
            }
        }
    }
    debug!(bot = %session.user_id(), "Bot stopped");
}
