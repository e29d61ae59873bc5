//! `toolrelay config`: Configuration commands.

use toolrelay_config::AppConfig;

pub fn show() -> anyhow::Result<()> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub fn path() -> anyhow::Result<()> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
