//! Policies running side by side in one connected session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use verdant_automation::{AutomationEngine, AutomationError, HarvestTask, PetCareTask};
use verdant_core::{HarvestConfig, PetFoodConfig, SelectionMode, StateStore};
use verdant_networking::{
    Backoff, ConnectionManager, ConnectionResult, ConnectionSettings, ConnectionState, Connector, Credential,
    JoinRules, Link, SessionTask, TaskContext, TaskError,
};

const WAIT: Duration = Duration::from_secs(60);

struct OneRoom {
    peers: mpsc::UnboundedSender<Link>,
}

impl Connector for OneRoom {
    fn authenticate<'a>(
        &'a self,
        _room: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Credential>> {
        async move { Ok(credential.clone()) }.boxed()
    }

    fn open<'a>(
        &'a self,
        _room: &'a str,
        _player_id: &'a str,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, ConnectionResult<Link>> {
        async move {
            let (bot, peer) = Link::pair(64);
            let _ = self.peers.send(peer);
            Ok(bot)
        }
        .boxed()
    }
}

/// A policy whose every tick fails.
struct Broken {
    ticks: AtomicUsize,
}

impl SessionTask for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn tick<'a>(&'a self, _ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        async move {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Err(AutomationError::NoDocument.into())
        }
        .boxed()
    }
}

fn plant(mutations: usize) -> Value {
    let marks = vec!["Gold"; mutations];
    json!({
        "objectType": "plant",
        "slots": [{"species": "Carrot", "startTime": 0, "endTime": 0, "mutations": marks}]
    })
}

fn welcome() -> String {
    json!({
        "type": "Welcome",
        "playerId": "p_me",
        "roomId": "MG1",
        "fullState": {
            "data": {"roomId": "MG1", "players": [{"id": "p_me"}]},
            "child": {"scope": "Quinoa", "data": {"userSlots": [{
                "playerId": "p_me",
                "data": {
                    "inventory": {"items": [
                        {"itemType": "Produce", "species": "Aloe", "id": "aloe-1", "quantity": 2}
                    ]},
                    "petSlots": [{"id": "pet-1", "petSpecies": "Worm", "hunger": 0}],
                    "garden": {"tileObjects": {"2": plant(3), "5": plant(7), "9": plant(3), "11": plant(0)}}
                }
            }]}}
        }
    })
    .to_string()
}

fn engine() -> AutomationEngine {
    let harvest = HarvestConfig {
        enabled: true,
        species: vec!["Carrot".into()],
        min_mutations: 1,
        mode: SelectionMode::Highest,
        check_interval_seconds: 5,
        ..HarvestConfig::default()
    };
    let mut pets = PetFoodConfig {
        enabled: true,
        check_interval_seconds: 5,
        ..PetFoodConfig::default()
    };
    pets.mapping.insert("Worm".into(), vec!["Aloe".into()]);
    AutomationEngine::default()
        .with_harvest(HarvestTask::new(harvest))
        .with_pets(PetCareTask::with_seed(pets, 3))
}

#[tokio::test(start_paused = true)]
async fn test_policies_keep_sending_while_a_sibling_fails() {
    let (peers, mut incoming) = mpsc::unbounded_channel();
    let settings = ConnectionSettings {
        rooms: vec!["MG1".into()],
        join: JoinRules {
            join_timeout: Duration::from_secs(2),
            grace: Duration::from_secs(1),
        },
        backoff: Backoff::new(Duration::from_millis(10), Duration::from_millis(40), 1),
        keepalive_interval: Duration::from_secs(3_600),
        position_interval: Duration::from_secs(3_600),
    };
    let store = Arc::new(StateStore::new(Some("p_me".into())));
    let manager = Arc::new(ConnectionManager::new(
        Arc::new(OneRoom { peers }),
        settings,
        store,
        Credential::new("mc_jwt=abc"),
    ));
    let broken = Arc::new(Broken {
        ticks: AtomicUsize::new(0),
    });
    manager.register(Arc::clone(&broken) as Arc<dyn SessionTask>);
    engine().install(&manager);

    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run().await }
    });

    let mut peer = timeout(WAIT, incoming.recv()).await.unwrap().unwrap();
    for expected in ["VoteForGame", "SetSelectedGame"] {
        let raw = timeout(WAIT, peer.rx.recv()).await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame["type"], expected);
    }
    peer.tx.send(welcome()).await.unwrap();

    let mut harvested = Vec::new();
    let mut sell = None;
    let mut fed = None;
    while sell.is_none() || fed.is_none() {
        let raw = timeout(WAIT, peer.rx.recv()).await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(&raw).unwrap();
        match frame["type"].as_str() {
            Some("Harvest") => harvested.push(frame["slot"].as_u64().unwrap()),
            Some("Sell") => sell = Some(frame["slots"].clone()),
            Some("FeedPet") => fed = Some(frame["petId"].clone()),
            _ => {}
        }
    }

    assert_eq!(harvested, vec![5, 2, 9]);
    assert_eq!(sell, Some(json!([5, 2, 9])));
    assert_eq!(fed, Some(json!("pet-1")));
    assert!(broken.ticks.load(Ordering::SeqCst) >= 4);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.shutdown();
    timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(manager.state(), ConnectionState::Closed);
}
