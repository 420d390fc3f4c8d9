//! User commands - registration, login, profile and password reset

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use smscp_core::{User, UserUpdate};

use super::{get_context, prompt_secret, require_token};
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new account
    Create {
        /// Username
        #[arg(long)]
        username: String,
        /// Phone number that receives and sends notes (E.164, e.g. +15551234567)
        #[arg(long)]
        phone: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in and print a user token
    Login {
        /// Username
        #[arg(long)]
        username: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the account behind the current token
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change username, phone or password
    Update {
        /// New username
        #[arg(long)]
        username: Option<String>,
        /// New phone number
        #[arg(long)]
        phone: Option<String>,
        /// Prompt for a new password
        #[arg(long)]
        password: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a password reset link to the account's phone
    ForgotPassword {
        /// Username of the account
        username: String,
    },
    /// Set a new password using a reset token
    ResetPassword {
        /// Token from the reset link
        reset_token: String,
    },
}

pub fn run(data_dir: &Path, token: Option<&str>, command: UserCommands) -> Result<()> {
    let ctx = get_context(data_dir)?;
    let accounts = &ctx.account_service;

    match command {
        UserCommands::Create { username, phone, json } => {
            let password = prompt_secret("Password")?;
            let verify = prompt_secret("Verify password")?;
            let user = accounts.create_user(&username, &password, &verify, &phone)?;
            print_user(&user, json, "Account created")
        }
        UserCommands::Login { username, json } => {
            let password = prompt_secret("Password")?;
            let user = accounts.login(&username, &password)?;
            print_user(&user, json, "Logged in")
        }
        UserCommands::Show { json } => {
            let user = accounts.current_user(require_token(token)?)?;
            print_user(&user, json, "Current account")
        }
        UserCommands::Update { username, phone, password, json } => {
            let token = require_token(token)?;
            let (password, verify) = if password {
                (Some(prompt_secret("New password")?), Some(prompt_secret("Verify password")?))
            } else {
                (None, None)
            };
            let update = UserUpdate {
                username,
                phone,
                password,
                verify,
            };
            if update.is_empty() {
                output::warning("Nothing to update. Pass --username, --phone or --password.");
                return Ok(());
            }
            let user = accounts.update_user(token, update)?;
            print_user(&user, json, "Account updated")
        }
        UserCommands::ForgotPassword { username } => {
            accounts.forgot_password(&username)?;
            output::success("If the account exists, a reset link was sent to its phone.");
            Ok(())
        }
        UserCommands::ResetPassword { reset_token } => {
            let password = prompt_secret("New password")?;
            let verify = prompt_secret("Verify password")?;
            let user = accounts.reset_password(&reset_token, &password, &verify)?;
            print_user(&user, false, "Password changed")
        }
    }
}

fn print_user(user: &User, json: bool, headline: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(user)?);
        return Ok(());
    }

    println!("{} {}", "✓".green(), headline);
    println!("  Username: {}", user.username);
    println!("  Phone:    {}", user.phone);
    if let Some(token) = user.token() {
        println!();
        println!("  Token: {}", token.bold());
        output::info("Export it as SMSCP_TOKEN to use it with other commands.");
    }
    Ok(())
}
