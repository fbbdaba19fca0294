use super::config::{resolve_config_path, WardenConfig};

/// Load and validate a configuration file, then print the resolved policy
pub fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    let config = WardenConfig::load(&config_path)?;
    let policy = config.gate.enforcement_policy()?;

    println!("✅ {}", config_path.display());
    println!();
    println!("Gate role:        {}", policy.gate_role);
    if policy.exempt_roles.is_empty() {
        println!("Exempt roles:     (none)");
    } else {
        let exempt: Vec<&str> = policy.exempt_roles.iter().map(|r| r.as_str()).collect();
        println!("Exempt roles:     {}", exempt.join(", "));
    }
    println!("Profile:          {:?}", config.gate.profile);
    println!(
        "Code lifetime:    {}",
        humantime::format_duration(config.gate.expiration())
    );
    println!(
        "First check:      {} after join",
        humantime::format_duration(policy.lower_age)
    );
    println!(
        "Enforced until:   {} after join",
        humantime::format_duration(policy.upper_age)
    );
    println!(
        "Grace period:     {}",
        humantime::format_duration(policy.grace_period)
    );
    println!("Log level:        {}", config.logging.level);
    Ok(())
}
