use crate::audio::output::SinkFactory;
use crate::audio::AudioSource;
use crate::channel::SessionChannel;
use crate::config::Config;
use crate::overlay::OverlayHandle;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Transport to the voice service
    pub channel: Arc<dyn SessionChannel>,

    /// Where reply audio is played
    pub sinks: Arc<dyn SinkFactory>,

    /// Capture source for newly opened overlays
    pub source: AudioSource,

    /// The open overlay, if any (at most one at a time)
    pub overlay: Arc<Mutex<Option<OverlayHandle>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        channel: Arc<dyn SessionChannel>,
        sinks: Arc<dyn SinkFactory>,
        source: AudioSource,
    ) -> Self {
        Self {
            config: Arc::new(config),
            channel,
            sinks,
            source,
            overlay: Arc::new(Mutex::new(None)),
        }
    }
}
