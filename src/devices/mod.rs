//! Actuator driver implementations

pub mod mock;
pub mod pca9685;
pub mod worker;

use crate::config::ActuatorConfig;
use crate::core::actuator::ActuatorSink;
use crate::error::{Error, Result};
use log::info;
use mock::MockActuator;
use pca9685::Pca9685Actuator;
use worker::ActuatorWorker;

/// Create the actuator sink selected by configuration
pub fn create_actuator(config: &ActuatorConfig) -> Result<Box<dyn ActuatorSink>> {
    let sink: Box<dyn ActuatorSink> = match config.driver.as_str() {
        "pca9685" => Box::new(Pca9685Actuator::open(config)?),
        "mock" => Box::new(MockActuator::new()),
        other => {
            return Err(Error::HardwareInit(format!(
                "Unknown actuator driver: {}",
                other
            )));
        }
    };

    if config.dedicated_thread {
        info!("Applying signals on a dedicated actuator thread");
        return Ok(Box::new(ActuatorWorker::spawn(sink)?));
    }
    Ok(sink)
}
