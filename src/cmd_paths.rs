use anyhow::Result;
use keeper::config::UserConfig;
use keeper::RuntimeConfiguration;

pub(crate) fn cmd_paths(config: &RuntimeConfiguration, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let show = |p: Option<&std::path::Path>| {
        p.map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unset)".to_string())
    };

    println!("Config file: {}", UserConfig::config_path().display());
    println!("Binary:      {}", show(config.binary_path.as_deref()));
    println!("Socket:      {}", show(config.socket()));
    println!("Database:    {}", show(config.database()));
    println!("Data dir:    {}", config.data_dir.display());
    if config.run_dir_degraded {
        println!("Run dir:     {} (fallback)", config.run_dir.display());
    } else {
        println!("Run dir:     {}", config.run_dir.display());
    }
    println!("Logs:        {}*", config.log_path_prefix().display());
    Ok(())
}
