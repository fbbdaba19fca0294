use super::config::{resolve_config_path, WardenConfig};
use warden::gatekeeper::EnforcementProfile;

/// Write a commented default configuration file
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn execute(
    config_path: Option<String>,
    gate_role: String,
    profile: EnforcementProfile,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    WardenConfig::create_default(&config_path, &gate_role, profile)?;

    // Round-trip through the loader so a bad --gate-role fails here, not at startup
    let config = WardenConfig::load(&config_path)?;

    println!("📝 Created: {}", config_path.display());
    println!("   Gate role: {}", config.gate.gate_role);
    println!("   Profile: {:?}", config.gate.profile);
    Ok(())
}
