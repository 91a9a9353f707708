//! `pgimport config` command implementation

use crate::config::Config;
use crate::error::Result;
use colored::Colorize;

/// Show all configuration
pub async fn show(config: &Config) -> Result<()> {
    println!("{}", "pgimport Configuration:".cyan().bold());
    println!();
    print!("{}", config.to_toml()?);
    println!();
    println!("{}", "Environment Variables:".cyan());
    println!("  PGIMPORT_SERVER_URL        - Server URL");
    println!("  PGIMPORT_SERVER_ID         - Server/tenant identifier");
    println!("  PGIMPORT_ENDPOINT          - Import script path");
    println!("  PGIMPORT_CHUNK_SIZE        - Chunk size in bytes");
    println!("  PGIMPORT_MAX_UPLOAD_SIZE   - Largest file to upload");
    println!("  PGIMPORT_STATE_DIR         - Resume token directory");
    println!("  PGIMPORT_API_TIMEOUT_SECS  - Request timeout");
    println!("  PGIMPORT_AUTO_CONTINUE     - Import right after upload");
    if let Some(path) = Config::default_path() {
        println!();
        println!("Config file: {}", path.display());
    }

    Ok(())
}
