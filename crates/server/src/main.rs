use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use sea_orm::Database;
use space::AppResources;
use space::accounts::{
    NewClient, NewUser, activate_user, create_client, create_user, find_or_create_client,
};
use space::api::start_webserver;
use space::config::load_config;
use space::entity::ClientType;
use space::secrets::SeedCipher;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OAuth 2.0 authorization server and identity provider.
#[derive(Parser, Debug)]
#[command(name = "space", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Manage registered client applications
    #[command(subcommand)]
    Client(ClientCommand),
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Register a client and print its key
    Create(CreateClientArgs),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Enrol an activated user and print their one-time secrets
    Create(CreateUserArgs),
}

#[derive(Args, Debug)]
struct CreateClientArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    secret: String,
    /// Canonical URI of the application
    #[arg(long)]
    uri: String,
    /// Allowed redirect URI; repeat for several, the first is the default
    #[arg(long = "redirect", required = true)]
    redirect: Vec<String>,
    /// Scope level the client may request; repeat for several
    #[arg(long = "scope", default_value = "public")]
    scopes: Vec<String>,
    #[arg(long = "type", default_value = "confidential")]
    client_type: ClientType,
}

#[derive(Args, Debug)]
struct CreateUserArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "SPACE_USER_PASSWORD")]
    password: String,
    #[arg(long, default_value = "en-US")]
    language: String,
    #[arg(long, default_value = "GMT")]
    timezone: String,
}

fn initialize_standard_tracing() {
    let default_directives = "space=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_standard_tracing();

    let cli = Cli::parse();

    let config = Arc::new(load_config().wrap_err("Failed to load configuration")?);
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .wrap_err("Failed to connect to database")?,
    );
    let cipher = Arc::new(SeedCipher::new(&config.storage_secret)?);
    let resources = AppResources { db, cipher, config };

    match cli.command {
        Command::Serve => start_webserver(resources).await?,
        Command::Client(ClientCommand::Create(args)) => {
            let client = create_client(
                resources.db.as_ref(),
                NewClient {
                    name: args.name,
                    description: args.description,
                    secret: args.secret,
                    scopes: args.scopes.join("\n"),
                    canonical_uri: args.uri,
                    redirect_uri: args.redirect.join("\n"),
                    client_type: args.client_type,
                },
            )
            .await?;
            println!("{}", client.key);
        }
        Command::User(UserCommand::Create(args)) => {
            // Accounts created here belong to the first-party client.
            let first_party = find_or_create_client(
                resources.db.as_ref(),
                &resources.config.first_party_client,
                &resources.config.application_uri,
            )
            .await?;
            let enrollment = create_user(
                resources.db.as_ref(),
                &resources.cipher,
                &resources.config.totp_issuer,
                NewUser {
                    username: args.username,
                    first_name: args.first_name,
                    last_name: args.last_name,
                    email: args.email,
                    passphrase: args.password,
                    client_id: first_party.id,
                    language: args.language,
                    timezone_identifier: args.timezone,
                },
            )
            .await?;
            let user = activate_user(resources.db.as_ref(), enrollment.user).await?;
            println!("public id:       {}", user.public_id);
            println!("recovery secret: {}", enrollment.recover_secret);
            println!("totp uri:        {}", enrollment.code_secret.provisioning_uri);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn user_password_can_come_from_environment() {
        let cli = Cli::command();
        let create = cli
            .find_subcommand("user")
            .and_then(|user| user.find_subcommand("create"))
            .expect("user create subcommand");
        let password = create
            .get_arguments()
            .find(|arg| arg.get_id() == "password")
            .expect("password argument");
        assert_eq!(
            password.get_env(),
            Some(std::ffi::OsStr::new("SPACE_USER_PASSWORD"))
        );
    }

    #[test]
    fn client_create_collects_repeated_flags() {
        let cli = Cli::try_parse_from([
            "space", "client", "create", "--name", "Orbiter", "--secret", "s3cret", "--uri",
            "https://orbiter.example", "--redirect", "https://orbiter.example/cb", "--redirect",
            "https://orbiter.example/alt", "--scope", "public", "--scope", "read",
        ])
        .expect("parse");
        let Command::Client(ClientCommand::Create(args)) = cli.command else {
            panic!("expected client create");
        };
        assert_eq!(args.redirect.len(), 2);
        assert_eq!(args.scopes, vec!["public", "read"]);
    }
}
