use std::env;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    is_http_url, normalize_text_option, CliProfile, CliProfilesConfig, CredentialStorage,
};
use crate::error::CliError;

/// Values passed to `config init`; `None` keeps what the profile already has.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub backup_url: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub debounce_ms: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub keyring: bool,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            backup_url,
            token_url,
            client_id,
            debounce_ms,
            poll_secs,
            keyring,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                backup_url,
                token_url,
                client_id,
                debounce_ms,
                poll_interval_secs: poll_secs,
                keyring,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_update(profile, update);
    validate_profile(profile)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    if profile.backup_url.is_none() {
        println!("Profile '{profile_name}' is missing: backup_url");
    } else if profile.token_url.is_none() {
        println!(
            "Backup profile '{profile_name}' is ready. Run `taskdeck auth login --token <TOKEN>`."
        );
    } else {
        println!(
            "Backup profile '{profile_name}' is ready. Run `taskdeck auth login --username <name> --password <password>`."
        );
    }

    Ok(())
}

/// Merge explicit values, then `TASKDECK_*` variables, then existing values.
pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) {
    let from_env = |name: &str| normalize_text_option(env::var(name).ok());

    if let Some(value) =
        normalize_text_option(update.backup_url).or_else(|| from_env("TASKDECK_BACKUP_URL"))
    {
        profile.backup_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) =
        normalize_text_option(update.token_url).or_else(|| from_env("TASKDECK_TOKEN_URL"))
    {
        profile.token_url = Some(value);
    }
    if let Some(value) =
        normalize_text_option(update.client_id).or_else(|| from_env("TASKDECK_CLIENT_ID"))
    {
        profile.client_id = Some(value);
    }
    if update.debounce_ms.is_some() {
        profile.debounce_ms = update.debounce_ms;
    }
    if update.poll_interval_secs.is_some() {
        profile.poll_interval_secs = update.poll_interval_secs;
    }
    if update.keyring {
        profile.credential_storage = CredentialStorage::Keyring;
    }
}

pub fn validate_profile(profile: &CliProfile) -> Result<(), CliError> {
    for (name, url) in [
        ("backup_url", profile.backup_url.as_deref()),
        ("token_url", profile.token_url.as_deref()),
    ] {
        if let Some(url) = url {
            if !is_http_url(url) {
                return Err(CliError::Config(format!(
                    "{name} must include http:// or https://"
                )));
            }
        }
    }
    if profile.token_url.is_some() && profile.client_id.is_none() {
        return Err(CliError::Config(
            "token_url requires client_id".to_string(),
        ));
    }
    profile.sync_settings(|_| None).map_err(CliError::Config)?;
    Ok(())
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    let settings = profile
        .sync_settings(|name| env::var(name).ok())
        .map_err(CliError::Config)?;
    println!("Profile:       {profile_name}");
    println!(
        "Backup URL:    {}",
        settings.backup_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Token URL:     {}",
        settings.token_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Client ID:     {}",
        settings.client_id.as_deref().unwrap_or("(not set)")
    );
    println!("Debounce:      {:?}", settings.debounce());
    println!("Poll interval: {:?}", settings.poll_interval());
    println!(
        "Credential:    {}",
        match profile.credential_storage {
            CredentialStorage::Database => "local database",
            CredentialStorage::Keyring => "system keychain",
        }
    );
    Ok(())
}
