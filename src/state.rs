//! Application state
//!
//! Holds all shared components and state

use crate::access_log::AccessLogService;
use crate::actuator::ActuatorController;
use crate::credential_store::CredentialStore;
use crate::stream_hub::FrameHub;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret for the remote trigger / provisioning endpoints
    pub api_secret_key: String,
    /// Camera input: a V4L2 device (/dev/video0), an RTSP URL, or an
    /// http(s) snapshot URL (polled instead of streamed)
    pub video_source: String,
    /// Capture rate passed to ffmpeg (frames per second)
    pub frame_rate: u32,
    /// Face gallery file ({encodings, names} JSON)
    pub gallery_path: PathBuf,
    /// Face match acceptance threshold (Euclidean distance)
    pub face_match_threshold: f32,
    /// Servo angle for the open position (degrees, 0-180)
    pub servo_open_angle: f32,
    /// Servo angle for the closed position (degrees, 0-180)
    pub servo_close_angle: f32,
    /// Relay settle time before driving the servo
    pub relay_settle: Duration,
    /// Servo pulse hold time per move
    pub servo_pulse: Duration,
    /// How long the door stays open
    pub hold_open: Duration,
    /// Minimum interval between unknown-person alerts
    pub alert_interval: Duration,
    /// Latch backend: "simulated" or "sysfs"
    pub hardware_backend: String,
    /// Relay GPIO line number (sysfs backend)
    pub relay_gpio: u32,
    /// PWM chip index for the servo line (sysfs backend)
    pub pwm_chip: u32,
    /// PWM channel index for the servo line (sysfs backend)
    pub pwm_channel: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            api_secret_key: std::env::var("API_SECRET_KEY")
                .unwrap_or_else(|_| "change-me".to_string()),
            video_source: std::env::var("VIDEO_SOURCE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            frame_rate: std::env::var("FRAME_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            gallery_path: std::env::var("GALLERY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("encodings.json")),
            face_match_threshold: std::env::var("FACE_MATCH_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.38),
            servo_open_angle: std::env::var("SERVO_OPEN_ANGLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90.0),
            servo_close_angle: std::env::var("SERVO_CLOSE_ANGLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            relay_settle: Duration::from_millis(200),
            servo_pulse: Duration::from_millis(500),
            hold_open: Duration::from_secs(
                std::env::var("HOLD_OPEN_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            alert_interval: Duration::from_secs(
                std::env::var("ALERT_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            hardware_backend: std::env::var("HARDWARE_BACKEND")
                .unwrap_or_else(|_| "simulated".to_string()),
            relay_gpio: std::env::var("RELAY_GPIO")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(17),
            pwm_chip: std::env::var("PWM_CHIP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            pwm_channel: std::env::var("PWM_CHANNEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// CredentialStore (QR pass tokens)
    pub credentials: Arc<CredentialStore>,
    /// AccessLogService (in-memory ring buffer)
    pub access_log: Arc<AccessLogService>,
    /// ActuatorController (door cycle + state flag)
    pub actuator: Arc<ActuatorController>,
    /// FrameHub (annotated MJPEG distribution)
    pub frames: Arc<FrameHub>,
    /// Gallery entry count at startup (status endpoint)
    pub gallery_size: usize,
}
