//! TOML config loading, generalising the teacher's `ConfigBuilder` fluent
//! pattern with an on-disk source `serde`/`toml` can deserialize directly
//! into `Config` (already `Serialize`/`Deserialize`).

use std::path::Path;

use ferrochain_core::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load(path: &Path) -> Result<Config, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}
