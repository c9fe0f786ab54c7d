//! Subcommand handlers.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};
use zeroize::Zeroizing;

use lettermind_core::utils::{format_date, format_optional, mask_key, truncate_string};
use lettermind_core::{
    ApiClient, ApiError, ApiKeyRegistry, Config, IdentityAssertion, KeyDraft, Provider,
    SessionManager, User,
};

use crate::cli::{Commands, KeysCommands};

/// Maximum width for names in status output
const NAME_DISPLAY_WIDTH: usize = 40;

/// Everything a command needs, wired up once per run.
pub struct Context {
    config: Config,
    session: SessionManager,
    registry: ApiKeyRegistry,
}

impl Context {
    /// Build the client stack and restore any saved session.
    /// `backend_url` overrides the configured backend for this run only.
    pub async fn new(config: Config, backend_url: Option<&str>) -> Result<Self> {
        let api = match backend_url {
            Some(url) => ApiClient::with_base_url(url, config.google_client_id.clone())?,
            None => ApiClient::new(&config)?,
        };
        let api = Arc::new(api);
        info!(backend = api.base_url(), store = %config.credential_backend, "Client ready");

        let store = config.open_credential_store()?;
        let session = SessionManager::new(store, api.clone());
        session.initialize().await;
        let registry = ApiKeyRegistry::new(session.clone(), api);

        Ok(Self {
            config,
            session,
            registry,
        })
    }
}

pub async fn run(mut ctx: Context, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let email = match email {
                Some(email) => email,
                None => prompt_line("Email", ctx.config.last_email.as_deref())?,
            };
            let password = match password {
                Some(password) => Zeroizing::new(password),
                None => prompt_secret("Password: ")?,
            };
            let assertion = IdentityAssertion::password(&email, password.as_str());
            let user = sign_in(&ctx, assertion).await?;
            remember_email(&mut ctx.config, &user);
        }
        Commands::Register { name, email, keys } => {
            let password = prompt_secret("Password: ")?;
            let confirm = prompt_secret("Confirm password: ")?;
            if *password != *confirm {
                bail!("Passwords do not match");
            }

            let mut initial_keys = BTreeMap::new();
            for provider in keys {
                let key = prompt_secret(&format!("{} API key: ", provider.display_name()))?;
                initial_keys.insert(provider, key);
            }

            let assertion = IdentityAssertion::registration(&email, password.as_str(), &name, initial_keys);
            let user = sign_in(&ctx, assertion).await?;
            remember_email(&mut ctx.config, &user);
        }
        Commands::Demo { name, email } => {
            sign_in(&ctx, IdentityAssertion::demo(&name, &email)).await?;
        }
        Commands::Google { token } => {
            if !ctx.config.google_enabled() {
                warn!("No Google client id configured");
            }
            sign_in(&ctx, IdentityAssertion::third_party(&token)).await?;
        }
        Commands::Logout => {
            let was_signed_in = ctx.session.is_authenticated();
            ctx.session.logout();
            if was_signed_in {
                println!("Signed out.");
            } else {
                println!("Not signed in.");
            }
        }
        Commands::Status => match ctx.session.user() {
            Some(user) => print_user(&user),
            None => println!("Not signed in."),
        },
        Commands::Keys(cmd) => run_keys(&ctx, cmd).await?,
    }
    Ok(())
}

async fn run_keys(ctx: &Context, command: KeysCommands) -> Result<()> {
    match command {
        KeysCommands::Show => {
            let profile = ctx.registry.fetch_profile().await.map_err(key_error)?;
            print_key_status(&profile);
        }
        KeysCommands::Set { providers } => {
            let mut draft = KeyDraft::new();
            for provider in providers {
                let key = prompt_secret(&format!("{} API key: ", provider.display_name()))?;
                if key.trim().is_empty() {
                    println!("  {} left unchanged", provider.display_name());
                } else {
                    println!("  {} -> {}", provider.display_name(), mask_key(&key));
                }
                draft.set(provider, Some(key.as_str().to_string()));
            }

            if draft.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            ctx.registry.update_keys(&mut draft).await.map_err(key_error)?;

            let profile = ctx.registry.fetch_profile().await.map_err(key_error)?;
            println!("API keys updated.\n");
            print_key_status(&profile);
        }
        KeysCommands::Gemini => {
            let key = prompt_secret("Gemini API key: ")?;
            if key.trim().is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            ctx.registry.update_gemini_key(key).await.map_err(key_error)?;
            println!("Gemini API key updated.");
        }
    }
    Ok(())
}

async fn sign_in(ctx: &Context, assertion: IdentityAssertion) -> Result<User> {
    let kind = assertion.kind();
    println!("Signing in...");
    match ctx.session.login(assertion).await {
        Ok(user) => {
            info!(kind, user_id = %user.id, "Signed in");
            println!("Signed in as {} <{}>", user.name, user.email);
            Ok(user)
        }
        Err(e) => {
            warn!(kind, error = %e, "Sign-in failed");
            Err(anyhow!(e.user_message()))
        }
    }
}

/// Turn key registry failures into something actionable
fn key_error(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::NotAuthenticated => anyhow!("Not signed in. Run `lettermind login` first."),
        ApiError::Unauthorized => {
            anyhow!("Your session is no longer valid. Run `lettermind login` again.")
        }
        e if e.is_network() => anyhow!("Unable to reach the server. Check your connection."),
        e => anyhow!(e),
    }
}

fn remember_email(config: &mut Config, user: &User) {
    if let Err(e) = config.remember_email(&user.email) {
        warn!(error = %e, "Failed to save config");
    }
}

fn print_user(user: &User) {
    println!("{} {}", user.initial(), truncate_string(&user.name, NAME_DISPLAY_WIDTH));
    println!("  Email:        {}", user.email);
    println!("  Sign-in:      {}", format_optional(&user.oauth_provider, "password"));
    println!("  Member since: {}", format_date(&user.created_at));
    if let Some(ref last_login) = user.last_login {
        println!("  Last login:   {}", format_date(last_login));
    }
}

fn print_key_status(user: &User) {
    println!("API keys for {}:", user.email);
    for provider in Provider::ALL {
        println!(
            "  {:<12} {}",
            provider.display_name(),
            user.key_status(provider).display()
        );
    }
}

/// Prompt for one line; an empty answer takes `default` when there is one
fn prompt_line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(answer_or_default(&line, default))
}

fn answer_or_default(line: &str, default: Option<&str>) -> String {
    match (line.trim(), default) {
        ("", Some(default)) => default.to_string(),
        (answer, _) => answer.to_string(),
    }
}

fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}
