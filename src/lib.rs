// lightstream - LED strip frame streaming server
// Effect rendering, frame codec, power limiting, triggers and client streaming jobs

pub mod client;
pub mod codec;
pub mod color;
pub mod config;
pub mod effect;
pub mod job;
pub mod power;
pub mod render;
pub mod server;
pub mod strip;
pub mod time_sync;
pub mod trigger;

pub use client::{ClientConfig, ClientKind, StripBinding};
pub use color::{ColorOrder, Palette, PaletteSource, RgbColor};
pub use config::{default_config_path, ConfigError, ServerConfig, ServerSettings};
pub use effect::{ActiveEffectRegistry, ActiveLightEffect, EffectDefinition, EffectStatus};
pub use job::{JobStatus, StreamingJobManager, StreamingJobState};
pub use power::PowerLimiter;
pub use render::{RenderedFrame, Renderer, SequenceCounter, INVALID_SEQUENCE};
pub use server::LightServer;
pub use strip::{BlendMode, LedStrip, StripInfo, StripSet};
pub use time_sync::{ClientTimeSync, Clock, SystemClock};
pub use trigger::{TriggerManager, TriggerSettings, TriggerType};
