use std::sync::Arc;

use spoke::audio::{AudioStreamFanout, FrameSubscriber, SilenceCaptureDevice};
use spoke::pipeline::{VoiceEventKind, VoicePipeline};
use spoke::sandbox::{GatekeeperCallHandler, SandboxConfig, SandboxExecutor};
use spoke::skills::{Catalog, Gatekeeper};
use spoke::vad::{RmsVad, VoiceActivityDetection};
use shared::audio::AudioFrame;
use shared::config::RuntimeConfig;
use shared::vad::VadCounter;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Forwards captured frames from the synchronous fanout producer into an
/// async channel the pipeline driver task reads from.
struct ChannelSubscriber {
    id: u64,
    sender: mpsc::UnboundedSender<AudioFrame>,
}

impl FrameSubscriber for ChannelSubscriber {
    fn id(&self) -> u64 {
        self.id
    }

    fn on_frame(&self, frame: &AudioFrame) {
        let _ = self.sender.send(frame.clone());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    spoke::logging::init();

    let config = RuntimeConfig::default();
    info!(
        device = "this-device",
        sample_rate = config.audio.sample_rate,
        "voice spoke starting"
    );

    let device_id = std::env::var("SPOKE_DEVICE_NAME").unwrap_or_else(|_| "unnamed_device".into());
    let device_id = shared::normalize::normalize_device_name(&device_id);

    let catalog = Arc::new(Catalog::new(device_id.clone()));
    match catalog.load(std::path::Path::new(&config.skills.path)) {
        Ok(n) => info!(classes = n, path = %config.skills.path, "skill catalog loaded"),
        Err(e) => warn!(error = %e, path = %config.skills.path, "skill catalog load failed"),
    }
    let gatekeeper = Arc::new(Gatekeeper::new(catalog.clone(), None));
    let call_handler = Arc::new(GatekeeperCallHandler::new(gatekeeper.clone()));
    let sandbox = Arc::new(SandboxExecutor::new(
        call_handler,
        SandboxConfig {
            enabled: config.skills.sandbox_enabled,
            timeout_seconds: config.skills.sandbox_timeout_seconds,
            memory_limit_mb: config.skills.sandbox_memory_limit_mb,
            ..Default::default()
        },
        String::new(),
        None,
    ));

    let pipeline = Arc::new(VoicePipeline::new(config.audio, config.vad, false));
    let fanout = Arc::new(AudioStreamFanout::new(config.audio.lookback_frames));

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<AudioFrame>();
    fanout.subscribe(Arc::new(ChannelSubscriber { id: 1, sender: frame_tx }));

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.kind {
                VoiceEventKind::Error { stage, message } => {
                    warn!(%stage, %message, "voice pipeline error")
                }
                other => info!(?other, "voice event"),
            }
        }
    });

    let frame_len = config.audio.frame_len_samples();
    let pipeline_for_frames = pipeline.clone();
    tokio::spawn(async move {
        let mut vad: Box<dyn VoiceActivityDetection> = Box::new(RmsVad::default());
        if vad.initialize().await.is_err() {
            warn!("VAD backend failed to initialize");
            return;
        }
        let mut vad_counter = VadCounter::new(config.vad, config.audio.frame_length_ms as u64);

        while let Some(frame) = frame_rx.recv().await {
            match pipeline_for_frames.feed_frame(&frame, vad.as_ref(), &mut vad_counter).await {
                Ok(_) => {}
                Err(e) => warn!(error = %e, "feed_frame error"),
            }
        }
    });

    pipeline.start()?;
    fanout.start(Box::new(SilenceCaptureDevice::new(frame_len, 30)));

    info!(
        skills = catalog.len(),
        sandbox_enabled = config.skills.sandbox_enabled,
        "voice spoke ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    fanout.stop();
    sandbox.shutdown().await;
    pipeline.shutdown()?;

    Ok(())
}
