use std::path::Path;

use taskdeck_core::auth::Credential;
use taskdeck_core::sync::ConnectOutcome;

use crate::cli::{AuthCommands, FirstSyncChoice};
use crate::commands::common::{format_timestamp, open_session, OpenMode, Session};
use crate::commands::sync::describe_report;
use crate::error::CliError;

pub async fn run_auth(
    command: AuthCommands,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            username,
            password,
            token,
            first_sync,
        } => {
            let session = open_session(db_path, profile, OpenMode::RequireBackup).await?;
            let credential =
                acquire_credential(&session, username, password, token).await?;
            run_connect(&session, &credential, first_sync).await
        }
        AuthCommands::Status => {
            let session = open_session(db_path, profile, OpenMode::Local).await?;
            let Some(credential) = session.engine.auth().get().await? else {
                println!("Profile '{}' is not connected.", session.profile_name);
                return Ok(());
            };

            let expiry = credential.expires_at.map_or_else(
                || "no expiry".to_string(),
                |expires_at| {
                    let label = if credential.is_expired(session.engine.now()) {
                        "expired"
                    } else {
                        "expires"
                    };
                    format!("{label} {}", format_timestamp(expires_at))
                },
            );
            let can_refresh = session.engine.auth().has_issuer().await;
            let refresh = if credential.refresh_token.is_some() && can_refresh {
                "silent refresh available"
            } else {
                "no silent refresh"
            };
            println!(
                "Profile '{}' is connected ({expiry}, {refresh})",
                session.profile_name
            );
            Ok(())
        }
        AuthCommands::Logout => {
            let session = open_session(db_path, profile, OpenMode::Local).await?;
            session.engine.disconnect().await?;

            let pending = session.engine.pending_change_count().await?;
            println!("Disconnected profile '{}'", session.profile_name);
            if pending > 0 {
                println!("{pending} unsynced changes are kept for the next connection.");
            }
            Ok(())
        }
    }
}

async fn acquire_credential(
    session: &Session,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
) -> Result<Credential, CliError> {
    if let Some(token) = taskdeck_core::util::normalize_text_option(token) {
        return Ok(Credential::bearer(token));
    }

    let (Some(username), Some(password)) = (username, password) else {
        return Err(CliError::Auth(
            "pass --username and --password, or --token".to_string(),
        ));
    };
    let issuer = session.issuer.as_ref().ok_or_else(|| {
        CliError::Config(format!(
            "Profile '{}' has no token endpoint. Run `taskdeck config init --token-url <URL> --client-id <ID>` or pass --token.",
            session.profile_name
        ))
    })?;
    Ok(issuer.sign_in(&username, &password).await?)
}

async fn run_connect(
    session: &Session,
    credential: &Credential,
    first_sync: Option<FirstSyncChoice>,
) -> Result<(), CliError> {
    let report = match session.engine.connect(credential).await? {
        ConnectOutcome::Synced(report) => report,
        ConnectOutcome::DecisionRequired(summary) => {
            let Some(choice) = first_sync else {
                // The decision cannot outlive this process; connect again with a choice
                session.engine.disconnect().await?;
                return Err(CliError::FirstSyncDecisionRequired {
                    local: summary.local_task_count,
                    remote: summary.remote_task_count,
                });
            };
            session
                .engine
                .apply_first_connect_decision(choice.into())
                .await?
        }
    };

    println!("Connected profile '{}'", session.profile_name);
    println!("{}", describe_report(&report));
    Ok(())
}
