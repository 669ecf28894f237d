//! `a3s-mirror versions` command.

use clap::Args;

use super::LocationArgs;
use crate::output::{format_versions, new_table};

#[derive(Args)]
pub struct VersionsArgs {
    #[command(flatten)]
    pub location: LocationArgs,
}

pub async fn execute(args: VersionsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.location.to_config()?;
    let pipeline =
        super::open_pipeline(&config)?.with_cancellation(super::cancel_on_ctrl_c());

    let plan = pipeline.plan().await?;

    println!("Source:      {}", format_versions(plan.source.versions()));
    println!("Destination: {}", format_versions(plan.destination.versions()));
    println!("Missing:     {}", format_versions(&plan.diff));
    println!();

    let mut table = new_table(&["CHANNEL", "VERSION", "MIRROR"]);
    for channel in &plan.channels {
        table.add_row(vec![
            channel.channel.clone(),
            format!("v{}", channel.version),
            if channel.needs_mirror { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{table}");
    println!();
    println!("To mirror:   {}", format_versions(&plan.versions));

    Ok(())
}
