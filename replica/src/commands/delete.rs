use super::endpoint::{self, SideOptions};
use crate::context::AppContext;
use libreplica::Result;
use libreplica::transfer::Options;

/// Handle the delete and delete-tag commands
pub async fn handle_delete(
    ctx: &AppContext,
    reference: &str,
    side: SideOptions,
    tag_only: bool,
) -> Result<()> {
    let target = endpoint::resource(reference, &side)?;
    let dst = target.clone().deleting(tag_only);

    let job = if tag_only { "delete-tag" } else { "delete" };
    ctx.replica
        .run(&format!("{job} {reference}"), &target, &dst, &Options::default())
        .await?;

    if !ctx.token.is_cancelled() {
        println!("✓ Processed {job} of {reference}");
    }
    Ok(())
}
