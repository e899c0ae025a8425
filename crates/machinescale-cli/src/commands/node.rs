use serde::Serialize;

use machinescale_autoscale::NodeGroupManager;

use super::GroupSummary;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeAnswer {
    provider_id: String,
    group: Option<GroupSummary>,
}

pub async fn node(manager: &NodeGroupManager, provider_id: &str, format: &str) -> anyhow::Result<String> {
    let group = manager.group_for_node(provider_id).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&NodeAnswer {
            provider_id: provider_id.to_string(),
            group: group.as_ref().map(GroupSummary::from),
        })?),
        _ => Ok(match group {
            Some(group) => format!("{provider_id} → {group}"),
            None => format!("{provider_id}: not in any node group"),
        }),
    }
}
