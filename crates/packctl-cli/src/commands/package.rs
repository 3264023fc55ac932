//! Package commands - install, update and uninstall packages

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use packctl_core::PackageInstallRequest;

use super::{Context, PollArgs, WaitArgs, connect, drive};
use crate::display::{self, Spinner};
use crate::error::{CliError, Result};

#[derive(Subcommand, Debug)]
pub enum PackageCommands {
    /// Install a package
    Install(InstallArgs),

    /// Update an installed package
    Update(UpdateArgs),

    /// Uninstall a package and the resources created for it
    Uninstall(UninstallArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Name of the package install
    pub name: String,

    /// Name of the package to install
    #[arg(short = 'p', long = "package-name")]
    pub package_name: String,

    /// Version or version range of the package
    #[arg(short = 'v', long)]
    pub version: String,

    /// Configuration values file
    #[arg(short = 'f', long)]
    pub values_file: Option<PathBuf>,

    /// Existing service account to install with
    #[arg(long)]
    pub service_account_name: Option<String>,

    /// Create the namespace if it doesn't exist
    #[arg(long)]
    pub create_namespace: bool,

    /// Label added to the package install (key=value, repeatable)
    #[arg(short = 'l', long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Name of the package install
    pub name: String,

    /// Package name; defaults to the installed package
    #[arg(short = 'p', long = "package-name")]
    pub package_name: Option<String>,

    /// Version or version range; defaults to the installed one
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Configuration values file
    #[arg(short = 'f', long)]
    pub values_file: Option<PathBuf>,

    /// Install the package if it isn't installed yet
    #[arg(long)]
    pub install: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Name of the package install
    pub name: String,

    #[command(flatten)]
    pub poll: PollArgs,
}

fn parse_label(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

impl InstallArgs {
    pub fn into_request(self, ctx: &Context) -> PackageInstallRequest {
        let mut request = PackageInstallRequest::new(self.name, &ctx.namespace)
            .with_package(self.package_name, self.version);
        request.values_file = self.values_file;
        request.service_account_name = self.service_account_name;
        request.create_namespace = self.create_namespace;
        request.labels = self.labels.into_iter().collect::<BTreeMap<_, _>>();
        request.wait = self.wait.wait();
        request.poll = self.wait.settings(&ctx.config);
        request
    }
}

impl UpdateArgs {
    pub fn into_request(self, ctx: &Context) -> Result<PackageInstallRequest> {
        if self.install && (self.package_name.is_none() || self.version.is_none()) {
            return Err(CliError::usage(
                "--install requires --package-name and --version",
            ));
        }

        let mut request = PackageInstallRequest::new(self.name, &ctx.namespace).with_package(
            self.package_name.unwrap_or_default(),
            self.version.unwrap_or_default(),
        );
        request.values_file = self.values_file;
        request.install = self.install;
        request.wait = self.wait.wait();
        request.poll = self.wait.settings(&ctx.config);
        Ok(request)
    }
}

impl UninstallArgs {
    pub fn into_request(self, ctx: &Context) -> PackageInstallRequest {
        let mut request = PackageInstallRequest::new(self.name, &ctx.namespace);
        request.wait = true;
        request.poll = self.poll.settings(&ctx.config);
        request
    }
}

pub async fn run(command: PackageCommands, ctx: &Context) -> Result<()> {
    match command {
        PackageCommands::Install(args) => install(args.into_request(ctx)).await,
        PackageCommands::Update(args) => update(args.into_request(ctx)?).await,
        PackageCommands::Uninstall(args) => uninstall(args.into_request(ctx)).await,
    }
}

async fn install(request: PackageInstallRequest) -> Result<()> {
    display::action("Installing", "package", &request.name, &request.namespace);
    let client = connect().await?;
    let name = request.name.clone();

    let spinner = Spinner::start(format!("Installing package '{}'", name));
    match drive(client.install(request), &spinner).await? {
        Some(reason) => display::warning(reason),
        None => display::success(format!("Installed package '{}'", name)),
    }
    Ok(())
}

async fn update(request: PackageInstallRequest) -> Result<()> {
    display::action("Updating", "package", &request.name, &request.namespace);
    let client = connect().await?;
    let name = request.name.clone();

    let spinner = Spinner::start(format!("Updating package '{}'", name));
    match drive(client.update(request), &spinner).await? {
        Some(reason) => display::warning(reason),
        None => display::success(format!("Updated package '{}'", name)),
    }
    Ok(())
}

async fn uninstall(request: PackageInstallRequest) -> Result<()> {
    display::action("Uninstalling", "package", &request.name, &request.namespace);
    let client = connect().await?;
    let name = request.name.clone();

    let spinner = Spinner::start(format!("Uninstalling package '{}'", name));
    match drive(client.uninstall(request), &spinner).await? {
        Some(reason) => display::warning(reason),
        None => display::success(format!("Uninstalled package '{}'", name)),
    }
    Ok(())
}
