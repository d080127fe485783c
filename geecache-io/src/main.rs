use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use geecache::builder::Builder;
use geecache::config::GroupSettings;
use geecache::group::Getter;
use geecache::node::Node;

/// Serves the values of a group from the static **data** map in the config.
///
/// This simulates a slow database, therefore every lookup is logged.
struct StaticSource {
    group: String,
    data: HashMap<String, String>,
}

impl StaticSource {
    fn new(settings: &GroupSettings) -> Self {
        StaticSource {
            group: settings.name.clone(),
            data: settings.data.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl Getter for StaticSource {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        log::info!("[{}] Searching for '{}' in the data source...", self.group, key);
        match self.data.get(key) {
            Some(value) => Ok(value.as_bytes().to_vec()),
            None => Err(anyhow::anyhow!("{} not exist", key)),
        }
    }
}

/// Creates all groups defined in the config which don't exist yet.
fn create_groups(node: &Node) {
    for settings in node.config().current().groups() {
        if node.groups().find(&settings.name).is_some() {
            continue;
        }

        if let Err(error) = node.create_group(
            &settings.name,
            settings.max_memory,
            StaticSource::new(&settings),
        ) {
            log::error!("Cannot create group {}: {}", settings.name, error);
        }
    }
}

/// Creates groups which are added to the config while the node is running.
fn watch_groups(node: Arc<Node>) {
    let mut notifier = node.config().notifier();
    geecache::spawn!(async move {
        while node.is_running() {
            tokio::select! {
                message = notifier.recv() => match message {
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    _ => create_groups(&node),
                },
                _ = node.await_termination() => (),
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let node = Builder::new().enable_all().build().await;

    create_groups(&node);
    watch_groups(node.clone());

    if let Some(server) = node.server() {
        server.event_loop().await;
    }
}

#[cfg(test)]
mod tests {
    use crate::{create_groups, StaticSource};
    use geecache::builder::Builder;
    use geecache::config::GroupSettings;
    use geecache::group::Getter;

    #[tokio::test]
    async fn static_sources_report_missing_keys() {
        let source = StaticSource::new(&GroupSettings {
            name: "scores".to_owned(),
            max_memory: 0,
            data: vec![("Tom".to_owned(), "630".to_owned())],
        });

        assert_eq!(source.get("Tom").await.unwrap(), b"630".to_vec());
        assert_eq!(
            source.get("Kim").await.unwrap_err().to_string(),
            "Kim not exist"
        );
    }

    #[tokio::test]
    async fn groups_are_created_from_the_config() {
        let node = Builder::new().build().await;
        node.config()
            .load_from_string(
                "
groups:
    scores:
        max_memory: 2k
        data:
            Tom: 630
",
                None,
            )
            .unwrap();

        create_groups(&node);
        // Creating them twice is a no-op...
        create_groups(&node);

        let scores = node.groups().find("scores").unwrap();
        assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
        assert_eq!(scores.get("Kim").await.is_err(), true);
        assert_eq!(node.groups().names(), vec!["scores".to_owned()]);
    }
}
