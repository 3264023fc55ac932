//! Repository commands - manage package repositories

use clap::{Args, Subcommand};
use packctl_core::RepositoryRequest;

use super::{Context, WaitArgs, connect, drive};
use crate::display::{self, Spinner};
use crate::error::Result;

#[derive(Subcommand, Debug)]
pub enum RepositoryCommands {
    /// Add a package repository
    Add(AddArgs),

    /// Update the source of a package repository
    Update(UpdateArgs),

    /// Delete a package repository
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Name of the package repository
    pub name: String,

    /// OCI image of the repository bundle (without a tag, the newest is used)
    #[arg(long)]
    pub url: String,

    /// Create the namespace if it doesn't exist
    #[arg(long)]
    pub create_namespace: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Name of the package repository
    pub name: String,

    /// OCI image of the repository bundle
    #[arg(long)]
    pub url: String,

    /// Add the repository if it doesn't exist
    #[arg(long)]
    pub create: bool,

    /// Create the namespace if it doesn't exist (with --create)
    #[arg(long)]
    pub create_namespace: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Name of the package repository
    pub name: String,

    #[command(flatten)]
    pub wait: WaitArgs,
}

impl AddArgs {
    pub fn into_request(self, ctx: &Context) -> RepositoryRequest {
        let mut request = RepositoryRequest::new(self.name, &ctx.namespace).with_url(self.url);
        request.create_namespace = self.create_namespace;
        request.wait = self.wait.wait();
        request.poll = self.wait.settings(&ctx.config);
        request
    }
}

impl UpdateArgs {
    pub fn into_request(self, ctx: &Context) -> RepositoryRequest {
        let mut request = RepositoryRequest::new(self.name, &ctx.namespace).with_url(self.url);
        request.create_repository = self.create;
        request.create_namespace = self.create_namespace;
        request.wait = self.wait.wait();
        request.poll = self.wait.settings(&ctx.config);
        request
    }
}

impl DeleteArgs {
    pub fn into_request(self, ctx: &Context) -> RepositoryRequest {
        let mut request = RepositoryRequest::new(self.name, &ctx.namespace);
        request.wait = self.wait.wait();
        request.poll = self.wait.settings(&ctx.config);
        request
    }
}

pub async fn run(command: RepositoryCommands, ctx: &Context) -> Result<()> {
    let client = connect().await?;

    let (verb, done, session, request_name, request_namespace) = match command {
        RepositoryCommands::Add(args) => {
            let request = args.into_request(ctx);
            let (name, namespace) = (request.name.clone(), request.namespace.clone());
            ("Adding", "Added", client.add_repository(request), name, namespace)
        }
        RepositoryCommands::Update(args) => {
            let request = args.into_request(ctx);
            let (name, namespace) = (request.name.clone(), request.namespace.clone());
            ("Updating", "Updated", client.update_repository(request), name, namespace)
        }
        RepositoryCommands::Delete(args) => {
            let request = args.into_request(ctx);
            let (name, namespace) = (request.name.clone(), request.namespace.clone());
            ("Deleting", "Deleted", client.delete_repository(request), name, namespace)
        }
    };

    display::action(verb, "package repository", &request_name, &request_namespace);
    let spinner = Spinner::start(format!("{} package repository '{}'", verb, request_name));
    match drive(session, &spinner).await? {
        Some(reason) => display::warning(reason),
        None => display::success(format!("{} package repository '{}'", done, request_name)),
    }
    Ok(())
}
