//! Config command implementation.

use std::path::Path;

use anyhow::Result;

use cftp_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs, path: Option<&Path>) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = super::load_config(path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = path.map_or_else(Config::config_path, Path::to_path_buf);
            println!("{}", path.display());
        }
    }
    Ok(())
}
