use crate::module::Module;
use std::fs;
use std::io;
use std::path::Path;

/// Serialized modules are the input contract: an upstream frontend lowers a
/// translation unit, saves it, and the analyzer loads it back with every
/// annotation channel intact.
pub fn save_module(module: &Module, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(module)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_module(path: impl AsRef<Path>) -> io::Result<Module> {
    let json = fs::read_to_string(path)?;
    let module =
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(module)
}
