//! Temperature sampling.
//!
//! The publishing core only needs a sequence of Celsius readings, so the
//! sensor surface is one trait plus a sampling helper. Real hardware
//! drivers live behind the same trait; the built-in [`FakeSensor`] cycles
//! through fixture readings and is what runs when no hardware is attached.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::trace;

/// A sensor read failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sensor read failed: {0}")]
pub struct SensorError(pub String);

/// Anything that can produce one temperature reading in degrees Celsius.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    async fn read_temp_c(&self) -> Result<f32, SensorError>;
}

/// Deterministic stand-in sensor cycling through fixture readings.
pub struct FakeSensor {
    temps: Vec<f32>,
    next: AtomicUsize,
}

impl FakeSensor {
    pub fn new(temps: Vec<f32>) -> Self {
        FakeSensor {
            temps,
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for FakeSensor {
    fn default() -> Self {
        // A comfortable indoor band.
        FakeSensor::new(vec![15.0, 16.5, 18.25, 17.75])
    }
}

#[async_trait]
impl TemperatureSensor for FakeSensor {
    async fn read_temp_c(&self) -> Result<f32, SensorError> {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(self.temps[i % self.temps.len()])
    }
}

/// Takes `num_samples` readings, `interval` apart. There is no sleep after
/// the final reading.
pub async fn sample(
    sensor: &dyn TemperatureSensor,
    num_samples: u32,
    interval: Duration,
) -> Result<Vec<f32>, SensorError> {
    let mut temps = Vec::with_capacity(num_samples as usize);
    for i in 0..num_samples {
        let temp = sensor.read_temp_c().await?;
        trace!("sample {}: {temp} °C", i + 1);
        temps.push(temp);

        if i + 1 < num_samples {
            sleep(interval).await;
        }
    }
    Ok(temps)
}
