// loader.rs: reads the compute kernel binary from disk.
//
// The file is taken as raw bytes and reinterpreted as little-endian 32-bit
// words. Nothing beyond the byte count is checked here; the pipeline checks
// the SPIR-V header before handing the words to the driver.

use std::fs::File;
use std::path::Path;

use crate::error::AppError;

pub fn load_spirv(path: &Path) -> Result<Vec<u32>, AppError> {
    let mut file = File::open(path).map_err(|source| AppError::FileOpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let words = ash::util::read_spv(&mut file).map_err(|source| AppError::InvalidShaderBinary {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("loaded {} SPIR-V words from {}", words.len(), path.display());
    Ok(words)
}
