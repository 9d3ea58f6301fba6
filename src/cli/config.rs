use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try to write to ~/.config/convlog/config.yml first
    let config_path = dirs::home_dir()
        .map(|home| home.join(".config/convlog/config.yml"))
        .and_then(|user_config| match user_config.parent().map(fs::create_dir_all) {
            Some(Ok(())) => Some(user_config),
            Some(Err(e)) => {
                eprintln!("Warning: Could not create directory for {}: {}", user_config.display(), e);
                eprintln!("Falling back to /etc/convlog/config.yml");
                None
            }
            None => None,
        })
        .unwrap_or_else(|| PathBuf::from("/etc/convlog/config.yml"));

    write_new_file(&config_path, &config_content)?;
    println!("Config file written to {}", config_path.display());
    Ok(())
}

fn write_new_file(path: &Path, contents: &str) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Print the effective configuration after defaults, file and environment.
pub fn show(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = crate::config::load_config(config_path.as_deref())?;

    match &config_path {
        Some(path) => println!("# Effective configuration (file: {})", path.display()),
        None => println!("# Effective configuration (no config file found)"),
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
