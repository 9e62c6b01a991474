use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins; otherwise fall back to config.yaml
    if env::var("DATABASE_URL").is_err() {
        let url = Config::builder()
            .add_source(config::File::with_name("config.yaml").required(false))
            .build()
            .and_then(|settings| settings.get_string("database_url"));
        match url {
            Ok(url) => env::set_var("DATABASE_URL", url),
            Err(e) => eprintln!("No database_url in config.yaml: {e}"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
