//! ActuatorController - Door Cycle State Machine
//!
//! ## Responsibilities
//!
//! - Door state flag (IDLE / OPENING) with a compare-and-set transition
//! - Single-flight open→hold→close cycle on a dedicated worker task
//! - Access logging + operator notification at cycle start
//!
//! ## Design
//!
//! The worker is fed by a capacity-1 channel, so at most one cycle can
//! ever be queued; the CAS on `DoorState` rejects re-entrant triggers
//! before they reach the channel. The frame loop only reads the flag and
//! never waits on a cycle. An in-flight cycle is never cancelled: partial
//! physical actuation is unsafe to abort mid-travel.

mod hardware;

pub use hardware::{LatchHardware, SimulatedLatch, SysfsLatch};

use crate::access_log::AccessLogService;
use crate::authorization::AccessMethod;
use crate::notifier::OperatorNotifier;
use crate::state::AppConfig;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const DOOR_IDLE: u8 = 0;
const DOOR_OPENING: u8 = 1;

/// Linear angle-to-duty conversion for the latch servo (percent duty at
/// 50 Hz): 0° ↦ 2.0, 90° ↦ 7.0, 180° ↦ 12.0.
pub fn angle_to_duty(angle: f32) -> f32 {
    angle / 18.0 + 2.0
}

/// Process-wide door flag shared between the frame loop and the actuator
/// worker. Cheap to clone.
#[derive(Clone)]
pub struct DoorState(Arc<AtomicU8>);

impl DoorState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(DOOR_IDLE)))
    }

    pub fn is_opening(&self) -> bool {
        self.0.load(Ordering::Acquire) == DOOR_OPENING
    }

    /// The single write transition: IDLE → OPENING. Returns false when a
    /// cycle is already in flight.
    pub(crate) fn begin_opening(&self) -> bool {
        self.0
            .compare_exchange(DOOR_IDLE, DOOR_OPENING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish(&self) {
        self.0.store(DOOR_IDLE, Ordering::Release);
    }
}

impl Default for DoorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycle angles and phase durations
#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    pub open_angle: f32,
    pub close_angle: f32,
    pub relay_settle: Duration,
    pub servo_pulse: Duration,
    pub hold_open: Duration,
}

impl ActuatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            open_angle: config.servo_open_angle,
            close_angle: config.servo_close_angle,
            relay_settle: config.relay_settle,
            servo_pulse: config.servo_pulse,
            hold_open: config.hold_open,
        }
    }
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            open_angle: 90.0,
            close_angle: 0.0,
            relay_settle: Duration::from_millis(200),
            servo_pulse: Duration::from_millis(500),
            hold_open: Duration::from_secs(5),
        }
    }
}

struct OpenRequest {
    identity: String,
    method: AccessMethod,
}

/// ActuatorController instance
pub struct ActuatorController {
    door: DoorState,
    tx: mpsc::Sender<OpenRequest>,
}

impl ActuatorController {
    /// Spawn the cycle worker and return the controller handle.
    pub fn start(
        hardware: Arc<dyn LatchHardware>,
        settings: ActuatorSettings,
        access_log: Arc<AccessLogService>,
        notifier: OperatorNotifier,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<OpenRequest>(1);
        let door = DoorState::new();

        let worker_door = door.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                run_cycle(&*hardware, &settings, &access_log, &notifier, &request).await;
                worker_door.finish();
            }
            tracing::debug!("Actuator worker stopped");
        });

        Arc::new(Self { door, tx })
    }

    /// Shared flag handle for the policy / frame loop.
    pub fn door(&self) -> DoorState {
        self.door.clone()
    }

    pub fn is_opening(&self) -> bool {
        self.door.is_opening()
    }

    /// Request a door cycle. Returns false (and does nothing) when a
    /// cycle is already in flight - re-entrant triggers are dropped by
    /// design, never queued.
    pub fn trigger(&self, identity: &str, method: AccessMethod) -> bool {
        if !self.door.begin_opening() {
            tracing::debug!(
                identity = %identity,
                method = %method,
                "Trigger dropped, door cycle already in flight"
            );
            return false;
        }

        let request = OpenRequest {
            identity: identity.to_string(),
            method,
        };
        if self.tx.try_send(request).is_err() {
            // worker gone or slot full; flag must not stay latched
            self.door.finish();
            tracing::error!("Actuator worker unavailable, trigger dropped");
            return false;
        }

        true
    }
}

/// One full open→hold→close cycle. Hardware and dispatch failures are
/// logged and the remaining phases still run; the door always completes
/// its travel.
async fn run_cycle(
    hardware: &dyn LatchHardware,
    settings: &ActuatorSettings,
    access_log: &AccessLogService,
    notifier: &OperatorNotifier,
    request: &OpenRequest,
) {
    tracing::info!(
        identity = %request.identity,
        method = %request.method,
        "Opening door"
    );

    access_log.record(&request.identity, request.method).await;
    notifier.notify_text(format!(
        "Access granted: {} (via {})",
        request.identity, request.method
    ));

    if let Err(e) = hardware.set_relay(true) {
        tracing::error!(error = %e, "Relay energize failed");
    }
    sleep(settings.relay_settle).await;

    drive_servo(hardware, angle_to_duty(settings.open_angle), settings.servo_pulse).await;

    sleep(settings.hold_open).await;

    drive_servo(hardware, angle_to_duty(settings.close_angle), settings.servo_pulse).await;

    if let Err(e) = hardware.set_relay(false) {
        tracing::error!(error = %e, "Relay release failed");
    }

    tracing::info!(identity = %request.identity, "Door cycle complete");
}

/// Pulse the servo line at the target duty, then idle it.
async fn drive_servo(hardware: &dyn LatchHardware, duty: f32, pulse: Duration) {
    if let Err(e) = hardware.set_servo_duty(duty) {
        tracing::error!(error = %e, duty = duty, "Servo drive failed");
    }
    sleep(pulse).await;
    if let Err(e) = hardware.set_servo_duty(0.0) {
        tracing::error!(error = %e, "Servo idle failed");
    }
}
