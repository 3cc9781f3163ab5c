use super::endpoint::{self, SideOptions};
use crate::context::AppContext;
use libreplica::{Reference, Result};
use std::io::Write;
use std::str::FromStr;

/// Handle the chart-addition command, writing the addition to stdout
pub async fn handle_addition(
    ctx: &AppContext,
    reference: &str,
    name: &str,
    side: SideOptions,
) -> Result<()> {
    let parsed = Reference::from_str(reference)?;
    let addition = ctx
        .replica
        .addition(
            &endpoint::endpoint(&parsed, &side),
            parsed.repository(),
            &endpoint::artifact(&parsed),
            name,
        )
        .await?;

    tracing::debug!(content_type = %addition.content_type, "addition resolved");
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&addition.content)?;
    stdout.flush()?;
    Ok(())
}
