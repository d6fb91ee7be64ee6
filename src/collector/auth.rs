use std::io::{BufRead, Write};

use grammers_client::{Client, SignInError};

use super::CollectorError;

/// Make sure the user-account client is signed in, prompting on the console
/// for whatever is missing. A stored session skips all prompts.
pub async fn ensure_user_login(
    client: &Client,
    phone: Option<&str>,
    api_hash: &str,
) -> Result<(), CollectorError> {
    if is_authorized(client).await? {
        return Ok(());
    }

    let phone = match phone {
        Some(p) if !p.trim().is_empty() => p.trim().to_string(),
        _ => prompt("Phone number for the search account: ")?,
    };

    let token = client
        .request_login_code(&phone, api_hash)
        .await
        .map_err(|e| CollectorError::Auth(format!("failed to request login code: {}", e)))?;
    let code = prompt("Login code sent by Telegram: ")?;

    match client.sign_in(&token, &code).await {
        Ok(_user) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("2FA password (hint: {}): ", hint))?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| CollectorError::Auth(format!("2FA failed: {}", e)))?;
        }
        Err(e) => return Err(CollectorError::Auth(format!("sign in failed: {}", e))),
    }

    log::info!("Search account signed in");
    Ok(())
}

/// Sign the bot identity in with its token unless the session already is.
pub async fn ensure_bot_login(
    client: &Client,
    bot_token: &str,
    api_hash: &str,
) -> Result<(), CollectorError> {
    if is_authorized(client).await? {
        return Ok(());
    }

    log::info!("Bot signing in with token");
    client
        .bot_sign_in(bot_token, api_hash)
        .await
        .map_err(|e| CollectorError::Auth(format!("bot sign in failed: {}", e)))?;
    Ok(())
}

/// Check if the client is already authorized (has a valid session).
pub async fn is_authorized(client: &Client) -> Result<bool, CollectorError> {
    client
        .is_authorized()
        .await
        .map_err(|e| CollectorError::Auth(format!("auth check failed: {}", e)))
}

// Startup only: blocking stdin is fine before the update loop exists.
fn prompt(message: &str) -> Result<String, CollectorError> {
    print!("{}", message);
    std::io::stdout().flush().map_err(CollectorError::Io)?;

    let line = std::io::stdin()
        .lock()
        .lines()
        .next()
        .ok_or_else(|| CollectorError::Auth("stdin closed".to_string()))?
        .map_err(CollectorError::Io)?;
    Ok(line.trim().to_string())
}
