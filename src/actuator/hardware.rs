//! Latch hardware boundary: one binary relay line, one PWM servo line

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Servo PWM period: 50 Hz
const SERVO_PERIOD_NS: u64 = 20_000_000;

/// The two output lines the actuator drives. Duty is expressed in percent
/// of the PWM period; 0.0 idles the servo line.
pub trait LatchHardware: Send + Sync {
    fn set_relay(&self, energized: bool) -> Result<()>;
    fn set_servo_duty(&self, duty_percent: f32) -> Result<()>;
}

/// Backend that only logs line transitions. Default on machines without
/// the latch wired up.
pub struct SimulatedLatch;

impl LatchHardware for SimulatedLatch {
    fn set_relay(&self, energized: bool) -> Result<()> {
        tracing::info!(energized = energized, "latch relay");
        Ok(())
    }

    fn set_servo_duty(&self, duty_percent: f32) -> Result<()> {
        tracing::info!(duty_percent = duty_percent, "latch servo");
        Ok(())
    }
}

/// Linux sysfs backend: GPIO for the relay, the kernel PWM class for the
/// servo line.
pub struct SysfsLatch {
    relay_value: PathBuf,
    pwm_duty_cycle: PathBuf,
}

impl SysfsLatch {
    /// Export and configure both lines. The relay starts de-energized and
    /// the servo line idle.
    pub fn new(relay_gpio: u32, pwm_chip: u32, pwm_channel: u32) -> Result<Self> {
        let gpio_dir = PathBuf::from(format!("/sys/class/gpio/gpio{}", relay_gpio));
        if !gpio_dir.exists() {
            std::fs::write("/sys/class/gpio/export", relay_gpio.to_string())?;
        }
        std::fs::write(gpio_dir.join("direction"), "out")?;
        let relay_value = gpio_dir.join("value");
        std::fs::write(&relay_value, "0")?;

        let chip_dir = PathBuf::from(format!("/sys/class/pwm/pwmchip{}", pwm_chip));
        let channel_dir = chip_dir.join(format!("pwm{}", pwm_channel));
        if !channel_dir.exists() {
            std::fs::write(chip_dir.join("export"), pwm_channel.to_string())?;
        }
        std::fs::write(channel_dir.join("period"), SERVO_PERIOD_NS.to_string())?;
        let pwm_duty_cycle = channel_dir.join("duty_cycle");
        std::fs::write(&pwm_duty_cycle, "0")?;
        std::fs::write(channel_dir.join("enable"), "1")?;

        tracing::info!(
            relay_gpio = relay_gpio,
            pwm_chip = pwm_chip,
            pwm_channel = pwm_channel,
            "sysfs latch hardware configured"
        );

        Ok(Self {
            relay_value,
            pwm_duty_cycle,
        })
    }
}

impl LatchHardware for SysfsLatch {
    fn set_relay(&self, energized: bool) -> Result<()> {
        std::fs::write(&self.relay_value, if energized { "1" } else { "0" })
            .map_err(|e| Error::Hardware(format!("relay write failed: {}", e)))
    }

    fn set_servo_duty(&self, duty_percent: f32) -> Result<()> {
        let clamped = duty_percent.clamp(0.0, 100.0);
        let ns = (SERVO_PERIOD_NS as f32 * clamped / 100.0) as u64;
        std::fs::write(&self.pwm_duty_cycle, ns.to_string())
            .map_err(|e| Error::Hardware(format!("servo duty write failed: {}", e)))
    }
}
