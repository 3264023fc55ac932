//! Secret commands - manage registry credentials

use std::path::PathBuf;

use clap::{Args, Subcommand};
use packctl_core::RegistrySecretRequest;

use super::{Context, connect};
use crate::display;
use crate::error::{CliError, Result};

#[derive(Subcommand, Debug)]
pub enum SecretCommands {
    /// Manage container registry credentials
    #[command(subcommand)]
    Registry(RegistryCommands),
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommands {
    /// Add a registry secret
    Add(RegistryArgs),

    /// Update the credentials of a registry secret
    Update(RegistryArgs),

    /// Delete a registry secret and its export
    Delete {
        /// Name of the secret
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Name of the secret
    pub name: String,

    /// Registry server, e.g. registry.example.com
    #[arg(long)]
    pub server: String,

    #[arg(long)]
    pub username: String,

    #[command(flatten)]
    pub password: PasswordSource,

    /// Export the secret to all namespaces (`=false` removes an existing export)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub export_to_all_namespaces: Option<bool>,
}

/// Exactly one way of supplying the registry password
#[derive(Args, Debug, Default)]
#[group(required = true, multiple = false)]
pub struct PasswordSource {
    /// Registry password
    #[arg(long)]
    pub password: Option<String>,

    /// Read the password from a file
    #[arg(long)]
    pub password_file: Option<PathBuf>,

    /// Read the password from an environment variable
    #[arg(long)]
    pub password_env_var: Option<String>,
}

impl PasswordSource {
    pub fn resolve(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if let Some(path) = &self.password_file {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                CliError::io(format!("failed to read password file '{}': {}", path.display(), e))
            })?;
            return Ok(contents.trim_end_matches(['\r', '\n']).to_string());
        }
        if let Some(var) = &self.password_env_var {
            return std::env::var(var).map_err(|_| {
                CliError::usage(format!("environment variable '{}' is not set", var))
            });
        }
        Err(CliError::usage(
            "one of --password, --password-file or --password-env-var is required",
        ))
    }
}

impl RegistryArgs {
    pub fn into_request(self, ctx: &Context) -> Result<RegistrySecretRequest> {
        Ok(RegistrySecretRequest {
            password: self.password.resolve()?,
            name: self.name,
            namespace: ctx.namespace.clone(),
            server: self.server,
            username: self.username,
            export_to_all_namespaces: self.export_to_all_namespaces,
        })
    }
}

pub async fn run(command: SecretCommands, ctx: &Context) -> Result<()> {
    let SecretCommands::Registry(command) = command;

    match command {
        RegistryCommands::Add(args) => {
            let request = args.into_request(ctx)?;
            display::action("Adding", "registry secret", &request.name, &request.namespace);
            connect().await?.add_registry_secret(&request).await?;
            display::success(format!("Added registry secret '{}'", request.name));
        }
        RegistryCommands::Update(args) => {
            let request = args.into_request(ctx)?;
            display::action("Updating", "registry secret", &request.name, &request.namespace);
            connect().await?.update_registry_secret(&request).await?;
            display::success(format!("Updated registry secret '{}'", request.name));
        }
        RegistryCommands::Delete { name } => {
            display::action("Deleting", "registry secret", &name, &ctx.namespace);
            if connect().await?.delete_registry_secret(&name, &ctx.namespace).await? {
                display::success(format!("Deleted registry secret '{}'", name));
            } else {
                display::warning(format!("registry secret '{}' does not exist", name));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_password_from_file_trims_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();

        let source = PasswordSource {
            password_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(source.resolve().unwrap(), "s3cret");
    }

    #[test]
    fn test_missing_password_file() {
        let source = PasswordSource {
            password_file: Some(PathBuf::from("/nonexistent/password")),
            ..Default::default()
        };
        assert!(matches!(source.resolve(), Err(CliError::Io { .. })));
    }

    #[test]
    fn test_unset_password_env_var() {
        let source = PasswordSource {
            password_env_var: Some("PACKCTL_TEST_UNSET_PASSWORD_VAR".to_string()),
            ..Default::default()
        };
        assert!(matches!(source.resolve(), Err(CliError::Usage { .. })));
    }

    #[test]
    fn test_request_uses_context_namespace() {
        let args = RegistryArgs {
            name: "regcred".to_string(),
            server: "registry.example.com".to_string(),
            username: "admin".to_string(),
            password: PasswordSource {
                password: Some("s3cret".to_string()),
                ..Default::default()
            },
            export_to_all_namespaces: None,
        };
        let ctx = Context::new(Default::default(), Some("ns1".to_string()));

        let request = args.into_request(&ctx).unwrap();
        assert_eq!(request.namespace, "ns1");
        assert_eq!(request.password, "s3cret");
        assert_eq!(request.export_to_all_namespaces, None);
    }
}
