// Configuration file loading and creation

use super::types::Config;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("heartlink");

    // Create config directory if it doesn't exist
    fs::create_dir_all(&path).ok();

    path.push("config.toml");
    path
}

/// Load configuration from file, or create default if it doesn't exist
pub fn load_config() -> Result<Config, io::Error> {
    let config_path = get_config_path();

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        Ok(parse_config(&contents))
    } else {
        create_default_config(&config_path)?;
        Ok(Config::default())
    }
}

/// Parse TOML, falling back to defaults on a broken file
pub fn parse_config(contents: &str) -> Config {
    match toml::from_str(contents) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config file, using defaults: {}", e);
            eprintln!("Warning: Failed to parse config file: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    }
}

/// Create a default configuration file with helpful comments
pub fn create_default_config(path: &Path) -> Result<(), io::Error> {
    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).map_err(io::Error::other)?;

    let commented_toml = format!(
        "# heartlink configuration file\n\
         # After editing, restart the game for changes to take effect\n\
         #\n\
         # [player] name is pre-filled when hosting or joining\n\
         # [network] signaling_server is the rendezvous WebSocket URL;\n\
         #           leave stun_server empty to skip public address discovery;\n\
         #           voice_enabled = false keeps the microphone closed\n\
         #\n\
         # Key binding format: \"Up\", \"Down\", \"Left\", \"Right\", \"Enter\", \"Esc\"\n\
         #                     or single characters like \"R\", \"M\", \"Q\"\n\
         #\n\
         # Colors: RGB values from 0-255\n\n\
         {}",
        toml_string
    );

    fs::write(path, commented_toml)?;
    println!("Created default config file at: {}", path.display());
    Ok(())
}
