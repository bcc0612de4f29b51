use anyhow::{Context, Result};
use idbridge_provider::IdentitySession;
use serde::Serialize;

use crate::cli::{CheckPasswordArgs, OutputFormat};
use crate::output::{print_error, print_json, print_success};

#[derive(Serialize)]
struct PasswordCheck<'a> {
    user_id: &'a str,
    valid: bool,
}

/// Returns whether the password was accepted.
pub async fn check(
    session: &IdentitySession,
    args: &CheckPasswordArgs,
    format: OutputFormat,
) -> Result<bool> {
    let valid = session
        .check_password(&args.user_id, &args.password)
        .await
        .with_context(|| format!("Password check for {} failed", args.user_id))?;

    match format {
        OutputFormat::Json => print_json(&PasswordCheck {
            user_id: &args.user_id,
            valid,
        }),
        OutputFormat::Table if valid => print_success(&format!("Password accepted for {}", args.user_id)),
        OutputFormat::Table => print_error(&format!("Password rejected for {}", args.user_id)),
    }
    Ok(valid)
}
