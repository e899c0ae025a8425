use machinescale_autoscale::NodeGroupManager;

use super::GroupSummary;

pub async fn groups(manager: &NodeGroupManager, namespace: Option<&str>, format: &str) -> anyhow::Result<String> {
    let groups = manager.list_groups(namespace).await?;

    match format {
        "json" => {
            let summaries: Vec<GroupSummary> = groups.iter().map(GroupSummary::from).collect();
            Ok(serde_json::to_string_pretty(&summaries)?)
        }
        _ => {
            if groups.is_empty() {
                return Ok("no scalable node groups".to_string());
            }
            let mut lines = Vec::with_capacity(groups.len());
            for group in &groups {
                let members = manager.members_of(group).await?;
                lines.push(format!("{group}  [{} nodes]  {}", members.len(), group.id()));
            }
            Ok(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[tokio::test]
    async fn text_lists_scalable_groups_only() {
        let (_dir, manager) = testing::manager().await;

        let out = groups(&manager, None, "text").await.unwrap();
        assert_eq!(
            out,
            "MachineSet ns/a (min: 1, max: 4, replicas: 2)  [2 nodes]  MachineSet/ns/a"
        );
    }

    #[tokio::test]
    async fn json_includes_capacity() {
        let (_dir, manager) = testing::manager().await;

        let out = groups(&manager, Some("ns"), "json").await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["id"], "MachineSet/ns/a");
        assert_eq!(parsed[0]["targetSize"], 2);
        assert_eq!(parsed[0]["capacity"]["memory"], "16Gi");
        assert!(parsed[0]["capacity"].get("cpu").is_none());
    }

    #[tokio::test]
    async fn empty_namespace_message() {
        let (_dir, manager) = testing::manager().await;

        let out = groups(&manager, Some("elsewhere"), "text").await.unwrap();
        assert_eq!(out, "no scalable node groups");
    }
}
