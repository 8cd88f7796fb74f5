//! Team records under `teams.<tla>.*`.

use crate::error::Result;
use crate::events::{CompEvent, TeamChange};
use crate::store::{keys, Store};
use std::sync::Arc;
use tracing::info;

const FIELDS: [&str; 5] = ["name", "college", "info", "notes", "disqualified"];

/// A team as registered by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub tla: String,
    pub name: String,
    pub college: String,
    pub info: String,
    pub notes: String,
    pub disqualified: bool,
}

/// Fields an `update-team` may change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub college: Option<String>,
    pub info: Option<String>,
    pub notes: Option<String>,
    pub disqualified: bool,
}

#[derive(Debug)]
pub struct TeamRegistry {
    store: Arc<dyn Store>,
}

impl TeamRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn add(&self, tla: &str, name: &str, college: Option<&str>, info: &str) -> Result<()> {
        let tla = tla.to_ascii_uppercase();
        self.set(&tla, "name", name).await?;
        self.set(&tla, "college", college.unwrap_or(name)).await?;
        self.set(&tla, "info", info).await?;
        self.set(&tla, "disqualified", "false").await?;
        self.set(&tla, "notes", "").await?;
        info!("Added team {} ({})", tla, name);
        self.announce(tla, TeamChange::New).await
    }

    pub async fn update(&self, tla: &str, update: TeamUpdate) -> Result<()> {
        let tla = tla.to_ascii_uppercase();
        // Empty names and colleges are ignored; info and notes may be blanked.
        if let Some(name) = update.name.filter(|name| !name.is_empty()) {
            self.set(&tla, "name", &name).await?;
        }
        if let Some(college) = update.college.filter(|college| !college.is_empty()) {
            self.set(&tla, "college", &college).await?;
        }
        if let Some(info) = update.info {
            self.set(&tla, "info", &info).await?;
        }
        if let Some(notes) = update.notes {
            self.set(&tla, "notes", &notes).await?;
        }
        self.set(&tla, "disqualified", if update.disqualified { "true" } else { "false" })
            .await?;
        info!("Updated team {}", tla);
        self.announce(tla, TeamChange::Updated).await
    }

    pub async fn remove(&self, tla: &str) -> Result<()> {
        let tla = tla.to_ascii_uppercase();
        for field in FIELDS {
            self.store.delete(&keys::team(&tla, field)).await?;
        }
        info!("Removed team {}", tla);
        self.announce(tla, TeamChange::Gone).await
    }

    /// Reads a team back, `None` if it is not registered.
    pub async fn get(&self, tla: &str) -> Result<Option<Team>> {
        let tla = tla.to_ascii_uppercase();
        let Some(name) = self.store.get(&keys::team(&tla, "name")).await? else {
            return Ok(None);
        };
        let field = |field: &str| keys::team(&tla, field);
        let college = self.store.get(&field("college")).await?.unwrap_or_else(|| name.clone());
        let info = self.store.get(&field("info")).await?.unwrap_or_default();
        let notes = self.store.get(&field("notes")).await?.unwrap_or_default();
        let disqualified = self.store.get(&field("disqualified")).await?.as_deref() == Some("true");
        Ok(Some(Team {
            tla,
            name,
            college,
            info,
            notes,
            disqualified,
        }))
    }

    async fn set(&self, tla: &str, field: &str, value: &str) -> Result<()> {
        self.store.set(&keys::team(tla, field), value).await
    }

    async fn announce(&self, tla: String, change: TeamChange) -> Result<()> {
        CompEvent::TeamChanged { tla, change }
            .publish(self.store.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures::{FutureExt, StreamExt};

    #[tokio::test]
    async fn add_update_remove() {
        let store = MemoryStore::new();
        let mut feed = store.listen(&[], &["teams.*".to_string()]).await.unwrap();
        let registry = TeamRegistry::new(Arc::new(store.clone()));

        registry.add("abc", "Alpha Bots", None, "").await.unwrap();
        let team = registry.get("ABC").await.unwrap().unwrap();
        assert_eq!(team.college, "Alpha Bots");
        assert!(!team.disqualified);

        registry
            .update(
                "ABC",
                TeamUpdate {
                    notes: Some("late".to_string()),
                    name: Some(String::new()),
                    disqualified: true,
                    ..TeamUpdate::default()
                },
            )
            .await
            .unwrap();
        let team = registry.get("abc").await.unwrap().unwrap();
        assert_eq!(team.name, "Alpha Bots");
        assert_eq!(team.notes, "late");
        assert!(team.disqualified);

        registry.remove("ABC").await.unwrap();
        assert_eq!(registry.get("ABC").await.unwrap(), None);
        assert!(store.keys("teams.ABC.*").await.unwrap().is_empty());

        let mut changes = Vec::new();
        while let Some(Some(message)) = feed.next().now_or_never() {
            changes.push((message.channel, message.payload));
        }
        assert_eq!(
            changes,
            vec![
                ("teams.ABC".to_string(), "new".to_string()),
                ("teams.ABC".to_string(), "updated".to_string()),
                ("teams.ABC".to_string(), "gone".to_string()),
            ]
        );
    }
}
