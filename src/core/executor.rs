//! The sample-then-publish executor.
//!
//! Each cycle captures one timestamp, takes the configured number of
//! readings, builds a measurement, constructs a fresh backend from
//! configuration and publishes. Cycles are strictly sequential: sampling
//! never overlaps publishing, and no backend instance survives a cycle.
//!
//! In periodic mode a failed cycle does not end the loop: the failure is
//! logged and the next cycle runs on schedule. In one-shot mode the
//! cycle's error is the run's result.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info};

use crate::{
    config::sampling::SamplingConfig,
    sensor::{self, SensorError, TemperatureSensor},
};

use super::{
    backends::{BackendFactory, PublishError},
    measurement::{DeviceId, Measurement, NoReadings},
};

/// One cycle's failure modes. In periodic mode these are logged and the
/// loop continues; in one-shot mode the cycle's error is the run's error.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    NoReadings(#[from] NoReadings),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Drives periodic measurement collection and publishing.
pub struct Executor {
    sensor: Arc<dyn TemperatureSensor>,
    device_id: DeviceId,
    factory: Arc<dyn BackendFactory>,
    sampling: SamplingConfig,
}

impl Executor {
    pub fn new(
        sensor: Arc<dyn TemperatureSensor>,
        device_id: DeviceId,
        factory: Arc<dyn BackendFactory>,
        sampling: SamplingConfig,
    ) -> Self {
        Executor {
            sensor,
            device_id,
            factory,
            sampling,
        }
    }

    /// Runs forever in periodic mode. With `collection_interval_secs = 0`
    /// a single cycle runs and its failure, if any, is returned.
    pub async fn run(self) -> Result<(), CycleError> {
        let interval = Duration::from_secs(self.sampling.collection_interval_secs);

        if interval.is_zero() {
            info!("one-shot mode: sampling and publishing once");
            return self.cycle().await;
        }

        info!(
            "collection started (interval: {}s, {} sample(s) per cycle)",
            self.sampling.collection_interval_secs, self.sampling.num_samples
        );

        loop {
            let start = Instant::now();

            match self.cycle().await {
                Ok(()) => {}
                // Publishing failed but the loop lives on; the next cycle
                // runs on schedule.
                Err(CycleError::Publish(e)) => error!("publish failed: {e}"),
                Err(CycleError::Sensor(e)) => error!("sampling failed: {e}"),
                Err(CycleError::NoReadings(e)) => error!("{e}"),
            }

            let elapsed = start.elapsed();
            if elapsed < interval {
                sleep(interval - elapsed).await;
            }
        }
    }

    async fn cycle(&self) -> Result<(), CycleError> {
        // One timestamp per invocation, shared by everything downstream.
        let timestamp = OffsetDateTime::now_utc();

        let temps = sensor::sample(
            self.sensor.as_ref(),
            self.sampling.num_samples,
            Duration::from_secs(self.sampling.sample_interval_secs),
        )
        .await?;

        let measurement = Measurement::new(self.device_id.clone(), timestamp, temps)?;
        debug!(
            "sampled {} reading(s), mean {:.3} °C",
            measurement.temps_c().len(),
            measurement.mean_temp()
        );

        let backend = self.factory.build(&self.device_id)?;
        backend.publish(&measurement).await?;

        info!("published measurement for {}", self.device_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{core::backends::Backend, sensor::FakeSensor};

    use super::*;

    #[derive(Default)]
    struct MockBackend {
        fail: bool,
        published: Mutex<Vec<Measurement>>,
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Remote {
                    status: 500,
                    body: "backend down".into(),
                });
            }
            self.published.lock().unwrap().push(measurement.clone());
            Ok(())
        }
    }

    struct MockFactory {
        backend: Arc<MockBackend>,
        builds: Mutex<usize>,
    }

    impl MockFactory {
        fn new(backend: Arc<MockBackend>) -> Self {
            MockFactory {
                backend,
                builds: Mutex::new(0),
            }
        }
    }

    impl BackendFactory for MockFactory {
        fn build(&self, _device_id: &DeviceId) -> Result<Box<dyn Backend>, PublishError> {
            *self.builds.lock().unwrap() += 1;
            Ok(Box::new(self.backend.clone()))
        }
    }

    fn one_shot_sampling(num_samples: u32) -> SamplingConfig {
        SamplingConfig {
            num_samples,
            sample_interval_secs: 0,
            collection_interval_secs: 0,
        }
    }

    #[tokio::test]
    async fn one_shot_publishes_a_single_measurement() {
        let backend = Arc::new(MockBackend::default());
        let factory = Arc::new(MockFactory::new(backend.clone()));

        let executor = Executor::new(
            Arc::new(FakeSensor::new(vec![15.0, 16.0])),
            DeviceId::new("sensor-01").unwrap(),
            factory.clone(),
            one_shot_sampling(2),
        );

        executor.run().await.unwrap();

        let published = backend.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].temps_c(), &[15.0, 16.0]);
        assert_eq!(published[0].device_id().as_str(), "sensor-01");
        assert_eq!(*factory.builds.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn one_shot_surfaces_the_publish_failure() {
        let backend = Arc::new(MockBackend {
            fail: true,
            ..Default::default()
        });
        let factory = Arc::new(MockFactory::new(backend));

        let executor = Executor::new(
            Arc::new(FakeSensor::default()),
            DeviceId::new("sensor-01").unwrap(),
            factory,
            one_shot_sampling(1),
        );

        let err = executor.run().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Publish(PublishError::Remote { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn periodic_loop_survives_publish_failures() {
        let backend = Arc::new(MockBackend {
            fail: true,
            ..Default::default()
        });
        let factory = Arc::new(MockFactory::new(backend));

        let executor = Executor::new(
            Arc::new(FakeSensor::default()),
            DeviceId::new("sensor-01").unwrap(),
            factory.clone(),
            SamplingConfig {
                num_samples: 1,
                sample_interval_secs: 0,
                collection_interval_secs: 1,
            },
        );

        let handle = tokio::spawn(executor.run());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!handle.is_finished(), "loop must outlive failed publishes");
        handle.abort();

        // Fresh backend per cycle: at least two constructions happened.
        assert!(*factory.builds.lock().unwrap() >= 2);
    }

    #[tokio::test]
    async fn each_cycle_builds_a_fresh_backend() {
        let backend = Arc::new(MockBackend::default());
        let factory = Arc::new(MockFactory::new(backend.clone()));

        let executor = Executor::new(
            Arc::new(FakeSensor::default()),
            DeviceId::new("sensor-01").unwrap(),
            factory.clone(),
            SamplingConfig {
                num_samples: 1,
                sample_interval_secs: 0,
                collection_interval_secs: 1,
            },
        );

        let handle = tokio::spawn(executor.run());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.abort();

        let builds = *factory.builds.lock().unwrap();
        let published = backend.published.lock().unwrap().len();
        assert!(builds >= 2);
        assert_eq!(builds, published);
    }
}
