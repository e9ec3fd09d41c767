//! Server facade: wires the registry, renderer, triggers and jobs together
//! and exposes the mutation entry points used by the setup/CRUD layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::ClientConfig;
use crate::config::ServerConfig;
use crate::effect::{ActiveEffectRegistry, EffectDefinition};
use crate::job::{DefaultJobFactory, JobContext, JobFactory, StreamSettings, StreamingJobManager};
use crate::power::PowerLimiter;
use crate::render::Renderer;
use crate::strip::{LedStrip, StripStore};
use crate::trigger::{SolarDay, SolarSchedule, TriggerDefinition, TriggerManager};

pub struct LightServer {
    config: ServerConfig,
    effects: Arc<ActiveEffectRegistry>,
    strips: Arc<StripStore>,
    power: Arc<PowerLimiter>,
    renderer: Renderer,
    solar: Arc<SolarSchedule>,
    triggers: Arc<TriggerManager>,
    jobs: StreamingJobManager,
    /// Strips whose power limit was inherited from a client, by client
    client_limits: Mutex<HashMap<Uuid, Vec<Uuid>>>,
}

impl LightServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultJobFactory))
    }

    /// Build with a custom job factory (alternate transports, tests).
    pub fn with_factory(config: ServerConfig, factory: Arc<dyn JobFactory>) -> Self {
        Self::with_context(config, factory, |ctx| ctx)
    }

    /// Build with a custom factory and a hook to adjust the job context.
    pub fn with_context(
        config: ServerConfig,
        factory: Arc<dyn JobFactory>,
        customize: impl FnOnce(JobContext) -> JobContext,
    ) -> Self {
        let effects = Arc::new(ActiveEffectRegistry::new());
        let strips = Arc::new(StripStore::new());
        let power = Arc::new(PowerLimiter::new());
        let solar = Arc::new(SolarSchedule::new());
        let renderer = Renderer::new(Arc::clone(&effects), Arc::clone(&strips));
        let triggers = Arc::new(TriggerManager::new(Arc::clone(&effects), Arc::clone(&solar)));

        let ctx = customize(JobContext::new(
            renderer.clone(),
            Arc::clone(&power),
            StreamSettings::from(&config.server),
        ));
        let jobs = StreamingJobManager::new(factory, ctx);

        let server = Self {
            config,
            effects,
            strips,
            power,
            renderer,
            solar,
            triggers,
            jobs,
            client_limits: Mutex::new(HashMap::new()),
        };
        server.load();
        server
    }

    fn load(&self) {
        for strip in &self.config.strips {
            self.add_strip(strip.clone());
        }
        for effect in &self.config.effects {
            self.add_or_update_effect(effect);
        }
        for trigger in &self.config.triggers {
            self.add_trigger(trigger);
        }
        if let Some(day) = &self.config.solar {
            self.solar.update(day.clone());
        }
        info!(
            strips = self.strips.len(),
            effects = self.effects.len(),
            triggers = self.triggers.len(),
            clients = self.config.clients.len(),
            "configuration loaded"
        );
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn effects(&self) -> &Arc<ActiveEffectRegistry> {
        &self.effects
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn power(&self) -> &Arc<PowerLimiter> {
        &self.power
    }

    pub fn triggers(&self) -> &Arc<TriggerManager> {
        &self.triggers
    }

    pub fn jobs(&self) -> &StreamingJobManager {
        &self.jobs
    }

    pub fn add_strip(&self, strip: LedStrip) {
        if let Some(limit) = strip.power_limit_ma() {
            self.power.set_limit(strip.uuid(), limit);
        }
        self.strips.insert(strip);
    }

    pub fn add_or_update_effect(&self, def: &EffectDefinition) {
        debug!(effect = %def.uuid, name = %def.name, kind = def.generator.kind(), "loading effect");
        self.effects.add_or_update(def.build(self.config.server.fps));
    }

    pub fn remove_effect(&self, uuid: Uuid) -> bool {
        self.effects.remove(uuid).is_some()
    }

    pub fn add_trigger(&self, def: &TriggerDefinition) {
        self.triggers.add(def.build());
    }

    /// Boundary for the daily sunrise/sunset collaborator.
    pub fn update_solar_day(&self, day: SolarDay) {
        self.solar.update(day);
    }

    pub async fn start_job(&self, client: &ClientConfig) {
        self.apply_client_limits(client);
        self.jobs.start_job(client).await;
    }

    pub async fn update_job(&self, client: &ClientConfig) {
        self.apply_client_limits(client);
        self.jobs.update_job(client).await;
    }

    pub async fn stop_job(&self, client: Uuid) {
        self.jobs.stop_job(client).await;
        self.release_client_limits(client);
    }

    /// Client-wide budget applies to bound strips without their own limit.
    /// Limits set for an earlier version of the client are dropped first.
    fn apply_client_limits(&self, client: &ClientConfig) {
        self.release_client_limits(client.uuid);
        let Some(limit) = client.power_limit_ma else {
            return;
        };
        let mut applied = Vec::new();
        for binding in &client.strips {
            let own = self.strips.get(binding.strip).and_then(|s| s.power_limit_ma());
            if own.is_none() {
                self.power.set_limit(binding.strip, limit);
                applied.push(binding.strip);
            }
        }
        if !applied.is_empty() {
            debug!(client = %client.uuid, strips = applied.len(), limit_ma = limit, "client power limit applied");
            self.client_limits.lock().insert(client.uuid, applied);
        }
    }

    fn release_client_limits(&self, client: Uuid) {
        let Some(strips) = self.client_limits.lock().remove(&client) else {
            return;
        };
        for strip in strips {
            self.power.remove_limit(strip);
        }
    }

    /// Start every configured client and the trigger loop; run until
    /// `cancel` fires, then stop all jobs.
    pub async fn run(&self, cancel: CancellationToken) {
        for client in &self.config.clients {
            self.start_job(client).await;
        }

        let interval = Duration::from_millis(self.config.server.trigger_interval_ms.max(10));
        let trigger_loop = tokio::spawn(Arc::clone(&self.triggers).run(interval, cancel.child_token()));

        cancel.cancelled().await;
        info!("shutting down");
        let _ = trigger_loop.await;
        self.shutdown().await;
    }

    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
    }
}
