//! Demo cache front door: authenticates clients against a user table and
//! keeps their sessions open.
//!
//! ```text
//! RUST_LOG=debug cargo run -p cachegate-server -- demo.json
//! ```
//!
//! `demo.json` holds a [`ServerConfig`] plus a `users` table:
//!
//! ```json
//! {
//!   "bind": "0.0.0.0:40404",
//!   "security-client-authenticator": "password",
//!   "transport": "websocket",
//!   "users": [
//!     {"principal": "super-user", "secret": "1234567", "attributes": {"role": "admin"}},
//!     {"principal": "reader", "bcrypt": "$2b$12$..."}
//!   ]
//! }
//! ```

use std::path::Path;

use cachegate::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    #[serde(flatten)]
    server: ServerConfig,
    users: Vec<UserEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UserEntry {
    principal: String,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    bcrypt: Option<String>,
    #[serde(default)]
    attributes: Attributes,
}

fn load_config(path: Option<&Path>) -> Result<DemoConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(DemoConfig::default());
    };
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn build_store(users: Vec<UserEntry>) -> Result<InMemoryCredentialStore, String> {
    let store = InMemoryCredentialStore::new();

    if users.is_empty() {
        tracing::warn!("no users configured, adding demo user `super-user`");
        let mut attributes = Attributes::new();
        attributes.insert("role".into(), "admin".into());
        store.insert_plain("super-user", "1234567", attributes);
        return Ok(store);
    }

    for user in users {
        let secret = match (user.secret, user.bcrypt) {
            (Some(plain), None) => StoredSecret::Plain(plain),
            (None, Some(hash)) => StoredSecret::Bcrypt(hash),
            _ => {
                return Err(format!(
                    "user `{}` needs exactly one of `secret` or `bcrypt`",
                    user.principal
                ));
            }
        };
        store.insert(
            user.principal,
            StoredCredential {
                secret,
                attributes: user.attributes,
            },
        );
    }
    Ok(store)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref().map(Path::new))?;
    let store = build_store(config.users)?;

    tracing::info!(
        bind = %config.server.bind,
        scheme = %config.server.authenticator,
        transport = ?config.server.transport,
        users = store.len(),
        "starting cachegate demo server"
    );

    CacheServerBuilder::from_config(config.server)
        .authenticator(
            PasswordAuthenticator::<InMemoryCredentialStore>::SCHEME,
            PasswordAuthenticator::new(store),
        )
        .run()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_reads_server_and_users() {
        let config: DemoConfig = serde_json::from_str(
            r#"{
                "bind": "0.0.0.0:9000",
                "security-client-authenticator": "password",
                "users": [
                    {"principal": "super-user", "secret": "1234567"},
                    {"principal": "reader", "bcrypt": "$2b$04$abc"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.users.len(), 2);

        let store = build_store(config.users).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_build_store_empty_table_adds_demo_user() {
        let store = build_store(Vec::new()).unwrap();
        assert!(store.lookup("super-user").unwrap().is_some());
    }

    #[test]
    fn test_build_store_rejects_user_with_both_secrets() {
        let users = vec![UserEntry {
            principal: "x".into(),
            secret: Some("a".into()),
            bcrypt: Some("b".into()),
            attributes: Attributes::new(),
        }];

        assert!(build_store(users).is_err());
    }
}
