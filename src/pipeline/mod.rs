//! FramePipeline - The Real-Time Authorization Loop
//!
//! ## Responsibilities
//!
//! - Sequential capture → match → decide loop
//! - Routing: accepted candidates to the actuator, unknown faces to the
//!   alert throttle
//! - Frame annotation + JPEG publication for the video surface
//!
//! The loop never waits on a door cycle or a notification; everything
//! with externally visible latency happens on other tasks. It terminates
//! when the capture device ends the stream.

mod overlay;

use crate::actuator::ActuatorController;
use crate::alert::AlertThrottle;
use crate::authorization::{AuthorizationPolicy, Decision, RejectReason};
use crate::error::Result;
use crate::frame_source::{Frame, FrameSource};
use crate::matcher::{CredentialMatcher, IdentityCandidate};
use crate::notifier::OperatorNotifier;
use crate::stream_hub::FrameHub;
use image::RgbImage;
use std::sync::Arc;

/// FramePipeline instance
pub struct FramePipeline {
    matcher: CredentialMatcher,
    policy: AuthorizationPolicy,
    throttle: AlertThrottle,
    actuator: Arc<ActuatorController>,
    notifier: OperatorNotifier,
    hub: Arc<FrameHub>,
}

impl FramePipeline {
    /// Create new FramePipeline
    pub fn new(
        matcher: CredentialMatcher,
        policy: AuthorizationPolicy,
        throttle: AlertThrottle,
        actuator: Arc<ActuatorController>,
        notifier: OperatorNotifier,
        hub: Arc<FrameHub>,
    ) -> Self {
        Self {
            matcher,
            policy,
            throttle,
            actuator,
            notifier,
            hub,
        }
    }

    /// Spawn the frame loop as a background task.
    pub fn start(self, source: Box<dyn FrameSource>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(source))
    }

    /// Run the loop until the capture device ends the stream or fails.
    pub async fn run(mut self, mut source: Box<dyn FrameSource>) {
        tracing::info!(gallery = self.matcher.gallery_size(), "Frame pipeline running");

        loop {
            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::warn!("Capture stream ended, stopping pipeline");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Fatal capture failure, stopping pipeline");
                    break;
                }
            };

            self.process_frame(frame).await;
        }
    }

    /// One loop iteration over an owned frame.
    async fn process_frame(&mut self, frame: Frame) {
        let candidates = self.matcher.match_frame(&frame);
        let mut annotated = frame.image.clone();

        for candidate in &candidates {
            let decision = self.policy.authorize(candidate).await;

            match &decision {
                Decision::Accept { identity, method } => {
                    self.actuator.trigger(identity, *method);
                }
                Decision::Reject {
                    reason: RejectReason::Unknown,
                } => {
                    // alert path is independent of door state
                    self.maybe_alert(&frame.image);
                }
                Decision::Reject { .. } => {}
            }

            annotate(&mut annotated, candidate, &decision);
        }

        match encode_jpeg(&annotated) {
            Ok(jpeg) => self.hub.publish(jpeg),
            Err(e) => tracing::error!(error = %e, "Annotated frame encode failed"),
        }
    }

    /// Throttled unknown-person alert with a still of the capture.
    fn maybe_alert(&self, image: &RgbImage) {
        if !self.throttle.should_fire() {
            return;
        }

        match encode_jpeg(image) {
            Ok(jpeg) => {
                tracing::info!("Dispatching unknown person alert");
                self.notifier.notify_photo(jpeg, "Unknown person at the door");
            }
            Err(e) => tracing::error!(error = %e, "Alert frame encode failed"),
        }
    }
}

/// Presentation-only overlay per candidate.
fn annotate(img: &mut RgbImage, candidate: &IdentityCandidate, decision: &Decision) {
    match candidate {
        IdentityCandidate::Qr {
            corners: Some(corners),
            ..
        } => {
            let rejected_token = matches!(
                decision,
                Decision::Reject {
                    reason: RejectReason::InvalidToken
                }
            );
            let color = if rejected_token {
                overlay::RED
            } else {
                overlay::BLUE
            };
            overlay::draw_quad(img, corners, color);
        }
        IdentityCandidate::Qr { corners: None, .. } => {}
        IdentityCandidate::Face { region, .. } => {
            overlay::draw_region(img, region, overlay::GREEN);
        }
        IdentityCandidate::UnknownFace { region } => {
            overlay::draw_region(img, region, overlay::RED);
        }
    }
}

/// Encode a frame for the video surface / alert photo.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 80);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::AccessLogService;
    use crate::actuator::{ActuatorSettings, LatchHardware, SimulatedLatch};
    use crate::credential_store::CredentialStore;
    use crate::frame_source::ScriptedFrames;
    use crate::notifier::{Notification, OperatorTransport};
    use crate::recognition::{FaceEngine, FaceGallery, FaceRegion, FeatureVector};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct OneUnknownFace;

    impl FaceEngine for OneUnknownFace {
        fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<FaceRegion>> {
            Ok(vec![FaceRegion {
                top: 4,
                right: 24,
                bottom: 24,
                left: 4,
            }])
        }

        fn embed(&self, _image: &RgbImage, _region: &FaceRegion) -> Result<FeatureVector> {
            Ok(vec![9.0, 9.0])
        }
    }

    struct RecordingTransport {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl OperatorTransport for RecordingTransport {
        async fn deliver(&self, notification: Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn pipeline_with(
        engine: Arc<dyn FaceEngine>,
        transport: Arc<RecordingTransport>,
        alert_interval: Duration,
    ) -> (FramePipeline, Arc<FrameHub>) {
        let notifier = OperatorNotifier::start(transport);
        let credentials = Arc::new(CredentialStore::new());
        let access_log = Arc::new(AccessLogService::new(16));
        let hardware: Arc<dyn LatchHardware> = Arc::new(SimulatedLatch);
        let actuator = ActuatorController::start(
            hardware,
            ActuatorSettings::default(),
            access_log,
            notifier.clone(),
        );
        let policy = AuthorizationPolicy::new(credentials, actuator.door());
        let matcher = CredentialMatcher::new(engine, FaceGallery::empty(), 0.38);
        let hub = Arc::new(FrameHub::new());

        (
            FramePipeline::new(
                matcher,
                policy,
                AlertThrottle::new(alert_interval),
                actuator,
                notifier,
                hub.clone(),
            ),
            hub,
        )
    }

    fn frames(n: usize) -> Box<ScriptedFrames> {
        Box::new(ScriptedFrames::new(
            (0..n).map(|_| Frame::new(RgbImage::new(64, 48))).collect(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_faces_alert_once_per_window() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let (pipeline, _hub) = pipeline_with(
            Arc::new(OneUnknownFace),
            transport.clone(),
            Duration::from_secs(30),
        );

        // 4 frames: decimation runs the face channel on the 1st and 3rd,
        // both inside one alert window
        pipeline.run(frames(4)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let photos = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notification::Photo { .. }))
            .count();
        assert_eq!(photos, 1);
    }

    #[tokio::test]
    async fn pipeline_stops_at_end_of_stream() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let (pipeline, hub) = pipeline_with(
            Arc::new(OneUnknownFace),
            transport,
            Duration::from_secs(30),
        );

        // run() returning at all proves the terminal exit
        pipeline.run(frames(2)).await;
        assert!(hub.subscribe().borrow().is_some());
    }

    #[test]
    fn encode_jpeg_produces_a_decodable_image() {
        let img = RgbImage::from_pixel(32, 16, image::Rgb([120, 30, 60]));
        let jpeg = encode_jpeg(&img).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 16));
    }
}
