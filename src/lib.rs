//! vkdispatch CLI library: configuration, kernel loading and the run
//! driver shared by the `vkdispatch` binary and its tests.

pub mod config;
pub mod error;
pub mod loader;

use std::io::Write;

use vkdispatch_vulkan::{run_dispatch, ComputeDevice};

pub use config::{ConfigError, Fill, RunConfig, DEFAULT_CONFIG_FILE};
pub use error::{AppError, BACKEND_SYSTEM_ERROR, RUNTIME_ERROR, UNKNOWN_ERROR};

/// Select the device, print its name, run one dispatch of the configured
/// kernel and print the readback as `<index>: <value>` lines.
pub fn run(config: &RunConfig, out: &mut impl Write) -> Result<(), AppError> {
    config.validate()?;

    let gpu = ComputeDevice::new()?;
    writeln!(out, "{}", gpu.device_name()).map_err(AppError::Output)?;

    let code = loader::load_spirv(&config.shader_path)?;
    let values = run_dispatch(&gpu, &code, &config.dispatch_params())?;
    write_values(out, &values).map_err(AppError::Output)?;
    Ok(())
}

pub fn write_values(out: &mut impl Write, values: &[f32]) -> std::io::Result<()> {
    for (i, v) in values.iter().enumerate() {
        writeln!(out, "{}: {}", i, v)?;
    }
    out.flush()
}
