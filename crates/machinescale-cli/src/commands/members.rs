use anyhow::bail;

use machinescale_autoscale::NodeGroupManager;

pub async fn members(manager: &NodeGroupManager, group_id: &str, format: &str) -> anyhow::Result<String> {
    let Some(group) = manager.group(group_id).await? else {
        bail!("node group {group_id} not found (ids look like MachineSet/<namespace>/<name>)");
    };
    let mut provider_ids = manager.members_of(&group).await?;
    provider_ids.sort();

    match format {
        "json" => Ok(serde_json::to_string_pretty(&provider_ids)?),
        _ => Ok(provider_ids.join("\n")),
    }
}
