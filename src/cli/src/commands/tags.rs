//! `a3s-mirror tags` command.

use a3s_mirror_core::config::CredentialsConfig;
use a3s_mirror_runtime::transfer::{list_tags, ListOptions};
use a3s_mirror_runtime::{RegistryAuth, RegistryClient, RegistryLocation};
use clap::Args;

#[derive(Args)]
pub struct TagsArgs {
    /// Location: "file:<path>.tar.gz", "dir:<path>" or "docker://<repository>"
    pub location: String,

    /// Registry username
    #[arg(long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(long, env = "A3S_MIRROR_PASSWORD")]
    pub password: Option<String>,

    /// Skip TLS verification
    #[arg(long)]
    pub insecure: bool,
}

pub async fn execute(args: TagsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = CredentialsConfig {
        username: args.username,
        password: args.password,
    };
    let location = RegistryLocation::parse(
        &args.location,
        RegistryAuth::from_credentials(&credentials),
    )?;

    let options = ListOptions {
        auth: None,
        insecure: args.insecure,
    };
    let tags = list_tags(&RegistryClient::new(), &location, &options).await?;

    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}
