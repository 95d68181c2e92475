//! Authenticates one user against the directory described by a JSON configuration file.
//!
//! ```sh
//! DIRAUTH_PASSWORD=secret cargo run --example ldap_auth -- ldap.json alice
//! ```
//!
//! Set `RUST_LOG=dirauth=debug` to see why a login gets refused.

use dirauth::Builder;
use dirauth_core::auth::Authenticator;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let (Some(config), Some(username)) = (args.next(), args.next()) else {
        eprintln!("usage: ldap_auth <config.json> <username>");
        std::process::exit(2);
    };
    let password = std::env::var("DIRAUTH_PASSWORD").unwrap_or_default();

    let authenticator = Builder::from_file(config)?.build()?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    match runtime.block_on(authenticator.authenticate(&username, &password.into())) {
        Ok(principal) => println!("authenticated as {}", principal),
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
