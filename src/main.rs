//! Gatehouse CLI
//!
//! Operator tooling over the library: evaluate flags for the stored session,
//! list quick actions, and drive registration, sign-in and sign-out.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use gatehouse::{
    auth::{AuthBackend, AuthContext, ExpiryPolicy, FileStore, RegistrationData, Role},
    config::{Args, Command},
    flags::{EvaluationContext, FlagEvaluator, FlagSnapshot, FlagStore, FlagValue},
    logging,
    nav::compose_quick_actions,
    oauth::{AuthorizationRequest, CallbackHandler, CallbackOutcome},
    types::AuthError,
};

type Session = AuthContext<FileStore, Box<dyn AuthBackend>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let policy = if args.enforce_token_expiry {
        ExpiryPolicy::Enforce
    } else {
        ExpiryPolicy::Ignore
    };
    let mut session: Session = AuthContext::new(
        FileStore::new(&args.session_file),
        args.auth_backend().context("Failed to set up auth backend")?,
    )
    .with_expiry_policy(policy);
    session.restore();

    match args.command.clone() {
        Command::Evaluate {
            key,
            audience,
            space,
        } => {
            let evaluator = load_evaluator(&args).await?;
            let mut ctx = evaluation_context(&args, &session);
            if let Some(audience) = audience {
                ctx = ctx.with_audience(audience);
            }
            if let Some(space) = space {
                ctx = ctx.with_space(space);
            }

            let evaluation = evaluator.resolve(&key, FlagValue::Bool(false), &ctx);
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }

        Command::QuickActions { role } => {
            let evaluator = load_evaluator(&args).await?;
            let ctx = evaluation_context(&args, &session);
            let role = match role {
                Some(raw) => Role::resolve(&raw),
                None => session.user().map(|u| u.primary_role()).unwrap_or_default(),
            };

            let enabled = evaluator.enabled_flags(&ctx);
            let actions = compose_quick_actions(role, &enabled);
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }

        Command::Login { email, password } => match session.login(&email, &password).await {
            Ok(user) => println!("Signed in as {} ({})", user.email, user.primary_role()),
            Err(e) => {
                error!("Login failed: {}", e);
                std::process::exit(1);
            }
        },

        Command::Register {
            first_name,
            last_name,
            email,
            password,
            confirm_password,
            role,
            company,
        } => {
            let form = RegistrationData {
                first_name,
                last_name,
                email,
                password,
                confirm_password,
                role,
                company,
            };
            match session.register(&form).await {
                Ok(user) => println!(
                    "Registered and signed in as {} ({})",
                    user.email,
                    user.primary_role()
                ),
                Err(AuthError::Validation(fields)) => {
                    for (field, message) in fields.iter() {
                        eprintln!("{}: {}", field, message);
                    }
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Registration failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Command::AuthorizeUrl => {
            let config = args.oauth_config()?;
            let request = AuthorizationRequest::build(&config, session.storage())?;
            println!("{}", request.url);
        }

        Command::Callback { query } => {
            let handler = CallbackHandler::new(args.oauth_config()?)?;
            match handler.handle(&query, &mut session).await {
                CallbackOutcome::Authenticated { user, redirect_to } => {
                    println!("Signed in as {}; continue to {}", user.email, redirect_to);
                }
                CallbackOutcome::Failed {
                    error,
                    redirect_home_after,
                } => {
                    eprintln!(
                        "Sign-in failed: {}. Returning home in {}s.",
                        error,
                        redirect_home_after.as_secs_f32()
                    );
                    tokio::time::sleep(redirect_home_after).await;
                    std::process::exit(1);
                }
            }
        }

        Command::Logout => {
            session.logout();
            info!("Session cleared");
        }

        Command::Whoami => match session.user() {
            Some(user) => println!("{}", serde_json::to_string_pretty(user)?),
            None => println!("Not signed in"),
        },
    }

    Ok(())
}

/// Load the flag snapshot once; without a source every flag is missing
async fn load_evaluator(args: &Args) -> anyhow::Result<FlagEvaluator> {
    let sink = args.warning_sink().context("Failed to open warnings log")?;
    let store = match args.flag_source()? {
        Some(source) => FlagStore::load(source.as_ref(), sink.as_ref())
            .await
            .context("Failed to load flags")?,
        None => FlagStore::new(FlagSnapshot::empty()),
    };
    Ok(FlagEvaluator::with_sink(store.snapshot(), Arc::clone(&sink)))
}

fn evaluation_context(args: &Args, session: &Session) -> EvaluationContext {
    match session.user() {
        Some(user) => EvaluationContext::for_user(user, &args.internal_domain_list()),
        None => EvaluationContext::anonymous(),
    }
}
