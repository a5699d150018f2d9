//! End-to-end scenarios driven through the hub handle.

mod common;

use common::{recording_backends, test_config, TestClient};
use pixboard_protocol::{
    AdminEvent, CanvasClearEvent, ClientMessage, LinkEvent, PlacePixel, ServerMessage,
};
use pixboard_server::{
    Backends, DurableQueue, FlushOutcome, FlushWorker, LegacyGridShim, PixboardServer,
    ServerError,
};
use pixboard_storage::{InMemoryBackend, InMemoryPlacementStore, KvBackend, PlacementStore};
use pixboard_testkit::{FlakyBackend, FlakyStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn placement_is_broadcast_and_visible_on_request_init() {
    let (backends, _) = recording_backends();
    let server = PixboardServer::bind(test_config(10, 10), backends).await.unwrap();
    let hub = server.hub();

    let mut alice = TestClient::connect(&hub).await;
    let mut bob = TestClient::connect(&hub).await;

    alice.send(ClientMessage::PlacePixel(
        PlacePixel::new(5, 5, "#FF0000").with_user("alice"),
    ));

    for client in [&mut alice, &mut bob] {
        let ServerMessage::UpdatePixel(update) = client.recv().await else {
            panic!("expected updatePixel");
        };
        assert_eq!((update.x, update.y), (5, 5));
        assert_eq!(update.color, "#FF0000");
        assert_eq!(update.user_id.as_deref(), Some("alice"));
        assert_eq!(update.total_pixels, 1);
    }

    bob.send(ClientMessage::RequestInit);
    let ServerMessage::Init(init) = bob.recv().await else {
        panic!("expected init");
    };
    assert_eq!(init.grid[5 * 10 + 5], "#FF0000");
    assert_eq!(init.grid[0], "#FFFFFF");
    assert_eq!(init.total_pixels, 1);
}

#[tokio::test]
async fn redundant_placement_is_silent() {
    let server = PixboardServer::bind(test_config(4, 4), Backends::in_memory())
        .await
        .unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    let place = ClientMessage::PlacePixel(PlacePixel::new(1, 1, "#00FF00"));
    client.send(place.clone());
    assert!(matches!(client.recv().await, ServerMessage::UpdatePixel(_)));

    client.send(place);
    client.assert_quiet().await;
    assert_eq!(hub.stats().await.unwrap().total_pixels, 1);
}

#[tokio::test]
async fn canvas_clear_reaches_every_client() {
    let (backends, sink) = recording_backends();
    let kv = Arc::clone(&backends.kv);
    let server = PixboardServer::bind(test_config(100, 100), backends).await.unwrap();
    let hub = server.hub();

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TestClient::connect(&hub).await);
    }
    clients[0].send(ClientMessage::PlacePixel(PlacePixel::new(42, 7, "#123456")));
    for client in &mut clients {
        client.recv().await;
    }

    server.events().publish(AdminEvent::CanvasClear(CanvasClearEvent {
        admin_id: Some("root".into()),
        timestamp: 1_700_000_000_000,
        width: 100,
        height: 100,
        default_color: "#FFFFFF".into(),
        grid: None,
    }));

    for client in &mut clients {
        let ServerMessage::CanvasClear(cleared) = client.recv().await else {
            panic!("expected canvasClear");
        };
        assert_eq!((cleared.width, cleared.height), (100, 100));
        assert_eq!(cleared.total_pixels, 0);
        assert_eq!(cleared.grid.len(), 10_000);
        assert!(cleared.grid.iter().all(|cell| cell == "#FFFFFF"));
        assert_eq!(cleared.cleared_by.as_deref(), Some("root"));
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.total_pixels, 0);
    assert_eq!(stats.palette_len, 1);

    hub.shutdown().await.unwrap();
    let saved = kv.get("canvas:grid").unwrap().unwrap();
    assert_eq!(saved.len(), 10_000);
    assert!(saved.iter().all(|&id| id == 0));
    assert!(sink.lines().iter().any(|line| line.contains("cleared by root")));
}

#[tokio::test]
async fn canvas_clear_saves_without_waiting_for_debounce() {
    let kv = Arc::new(InMemoryBackend::new());
    let painted: Vec<String> = ["#FF0000", "#FFFFFF", "#00FF00", "#FF0000"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    LegacyGridShim::new("canvas:grid:legacy")
        .save(kv.as_ref(), &painted)
        .unwrap();
    kv.set("canvas:grid", &[1, 0, 2, 1]).unwrap();

    let backends = Backends::new(Arc::clone(&kv) as Arc<dyn KvBackend>, Arc::new(InMemoryPlacementStore::new()));
    let config = test_config(2, 2).with_save_debounce(Duration::from_secs(60));
    let server = PixboardServer::bind(config, backends).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    client.send(ClientMessage::PlacePixel(PlacePixel::new(1, 0, "#0000FF")));
    assert!(matches!(client.recv().await, ServerMessage::UpdatePixel(_)));

    hub.admin(AdminEvent::CanvasClear(CanvasClearEvent {
        admin_id: Some("root".into()),
        timestamp: 5,
        width: 2,
        height: 2,
        default_color: "#FFFFFF".into(),
        grid: None,
    }))
    .unwrap();
    assert!(matches!(client.recv().await, ServerMessage::CanvasClear(_)));

    let legacy = LegacyGridShim::new("canvas:grid:legacy");
    let saved = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let grid = kv.get("canvas:grid").unwrap().unwrap_or_default();
            let strings = legacy.load(kv.as_ref()).unwrap().unwrap_or_default();
            if grid == vec![0; 4] && strings.iter().all(|c| c == "#FFFFFF") {
                return (grid, strings);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("wiped canvas was not saved before the debounce window");

    assert_eq!(saved.0.len(), 4);
    assert_eq!(saved.1.len(), 4);
    assert_eq!(hub.stats().await.unwrap().dirty_chunks, 0);
}

#[tokio::test]
async fn canvas_clear_right_after_placements_wins() {
    let server = PixboardServer::bind(test_config(6, 6), Backends::in_memory())
        .await
        .unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    for x in 0..4 {
        client.send(ClientMessage::PlacePixel(
            PlacePixel::new(x, 2, "#ABCDEF").with_user("alice"),
        ));
    }
    hub.admin(AdminEvent::CanvasClear(CanvasClearEvent {
        admin_id: None,
        timestamp: 9,
        width: 6,
        height: 6,
        default_color: "#FFFFFF".into(),
        grid: None,
    }))
    .unwrap();

    loop {
        match client.recv().await {
            ServerMessage::UpdatePixel(_) => continue,
            ServerMessage::CanvasClear(cleared) => {
                assert_eq!(cleared.total_pixels, 0);
                break;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.total_pixels, 0);
    assert_eq!(stats.palette_len, 1);

    client.send(ClientMessage::RequestInit);
    let ServerMessage::Init(init) = client.recv().await else {
        panic!("expected init");
    };
    assert_eq!(init.total_pixels, 0);
    assert!(init.grid.iter().all(|cell| cell == "#FFFFFF"));
}

#[tokio::test]
async fn replayed_canvas_clear_is_harmless() {
    let server = PixboardServer::bind(test_config(8, 8), Backends::in_memory())
        .await
        .unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    let event = AdminEvent::CanvasClear(CanvasClearEvent {
        admin_id: None,
        timestamp: 1,
        width: 8,
        height: 8,
        default_color: "#000000".into(),
        grid: None,
    });
    for _ in 0..2 {
        hub.admin(event.clone()).unwrap();
        let ServerMessage::CanvasClear(cleared) = client.recv().await else {
            panic!("expected canvasClear");
        };
        assert!(cleared.grid.iter().all(|cell| cell == "#000000"));
    }
}

#[tokio::test]
async fn debounced_save_lands_after_quiet_period() {
    let backends = Backends::in_memory();
    let kv = Arc::clone(&backends.kv);
    let server = PixboardServer::bind(test_config(4, 4), backends).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    client.send(ClientMessage::PlacePixel(PlacePixel::new(3, 0, "#0000FF")));
    client.recv().await;
    assert_eq!(kv.get("canvas:grid").unwrap(), None);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let saved = kv.get("canvas:grid").unwrap().unwrap();
    assert_eq!(saved[3], 1);

    let legacy = LegacyGridShim::new("canvas:grid:legacy")
        .load(kv.as_ref())
        .unwrap()
        .unwrap();
    assert_eq!(legacy[3], "#0000FF");
}

#[tokio::test]
async fn link_notifies_each_connection_once() {
    let server = PixboardServer::bind(test_config(4, 4), Backends::in_memory())
        .await
        .unwrap();
    let hub = server.hub();

    let mut linking = TestClient::connect(&hub).await;
    let mut other_tab = TestClient::connect(&hub).await;
    let mut stranger = TestClient::connect(&hub).await;
    linking.auth(Some("u1"), Some("d1"), Some("tok-1"));
    other_tab.auth(None, Some("d1"), None);
    stranger.auth(Some("u2"), None, Some("tok-2"));

    hub.admin(AdminEvent::Link(LinkEvent {
        user_id: "d1".into(),
        client_token: Some("tok-1".into()),
    }))
    .unwrap();

    let ServerMessage::Linked(notice) = linking.recv().await else {
        panic!("expected linked");
    };
    assert_eq!(notice.client_token.as_deref(), Some("tok-1"));
    assert_eq!(notice.for_discord_id, "d1");
    linking.assert_quiet().await;

    assert!(matches!(other_tab.recv().await, ServerMessage::Linked(_)));
    other_tab.assert_quiet().await;
    stranger.assert_quiet().await;
}

#[tokio::test]
async fn link_without_token_reuses_registered_token() {
    let server = PixboardServer::bind(test_config(4, 4), Backends::in_memory())
        .await
        .unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;
    client.auth(None, Some("d7"), Some("tok-7"));

    hub.admin(AdminEvent::Link(LinkEvent {
        user_id: "d7".into(),
        client_token: None,
    }))
    .unwrap();

    let ServerMessage::Linked(notice) = client.recv().await else {
        panic!("expected linked");
    };
    assert_eq!(notice.client_token.as_deref(), Some("tok-7"));
}

#[tokio::test]
async fn placement_falls_back_to_authenticated_user() {
    let config = test_config(4, 4).with_allow_anonymous(false);
    let server = PixboardServer::bind(config, Backends::in_memory()).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    client.send(ClientMessage::PlacePixel(PlacePixel::new(0, 0, "#FF00FF")));
    client.assert_quiet().await;

    client.auth(Some("carol"), None, None);
    client.send(ClientMessage::PlacePixel(PlacePixel::new(0, 0, "#FF00FF")));
    let ServerMessage::UpdatePixel(update) = client.recv().await else {
        panic!("expected updatePixel");
    };
    assert_eq!(update.user_id.as_deref(), Some("carol"));
}

#[tokio::test]
async fn queue_outage_does_not_undo_placement() {
    let kv = Arc::new(FlakyBackend::new());
    let backends = Backends::new(
        Arc::clone(&kv) as Arc<dyn KvBackend>,
        Arc::new(InMemoryPlacementStore::new()),
    );
    let server = PixboardServer::bind(test_config(4, 4), backends).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    kv.set_failing(true);
    client.send(ClientMessage::PlacePixel(PlacePixel::new(2, 2, "#ABCDEF")));
    assert!(matches!(client.recv().await, ServerMessage::UpdatePixel(_)));

    client.send(ClientMessage::RequestInit);
    let ServerMessage::Init(init) = client.recv().await else {
        panic!("expected init");
    };
    assert_eq!(init.grid[2 * 4 + 2], "#ABCDEF");
    assert_eq!(init.total_pixels, 1);
}

#[tokio::test]
async fn store_outage_keeps_placements_queued() {
    let kv: Arc<dyn KvBackend> = Arc::new(InMemoryBackend::new());
    let store = Arc::new(FlakyStore::new());
    let backends = Backends::new(Arc::clone(&kv), Arc::clone(&store) as Arc<dyn PlacementStore>);
    let server = PixboardServer::bind(test_config(4, 4), backends).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    for x in 0..3 {
        client.send(ClientMessage::PlacePixel(
            PlacePixel::new(x, 0, "#010203").with_user("dave"),
        ));
        client.recv().await;
    }
    hub.shutdown().await.unwrap();

    let queue = Arc::new(DurableQueue::new(Arc::clone(&kv), "canvas:queue"));
    assert_eq!(queue.len().unwrap(), 3);

    store.set_failing(true);
    let worker = FlushWorker::new(Arc::clone(&queue), Arc::clone(&store) as Arc<dyn PlacementStore>, 10);
    assert!(matches!(worker.flush_once(), FlushOutcome::Requeued { items: 3, .. }));
    assert_eq!(queue.len().unwrap(), 3);

    store.set_failing(false);
    assert_eq!(
        worker.flush_once(),
        FlushOutcome::Committed { records: 3, users: 1, dropped: 0 }
    );
    assert_eq!(store.placements().len(), 3);
    assert!(store.last_active("dave").is_some());
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn boot_fails_when_store_unreachable() {
    let store = Arc::new(FlakyStore::new());
    store.set_failing(true);
    let backends = Backends::new(Arc::new(InMemoryBackend::new()), store);

    let err = PixboardServer::bind(test_config(4, 4), backends)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::StoreUnreachable(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn boot_restores_legacy_grid_and_counter() {
    let kv = Arc::new(InMemoryBackend::new());
    let cells: Vec<String> = (0..4)
        .map(|i| if i == 1 { "#FF0000".to_string() } else { "#FFFFFF".to_string() })
        .collect();
    LegacyGridShim::new("canvas:grid:legacy")
        .save(kv.as_ref(), &cells)
        .unwrap();

    let store = InMemoryPlacementStore::new();
    store
        .commit_batch(
            &[pixboard_storage::PlacementRecord {
                x: 1,
                y: 0,
                color: "#FF0000".into(),
                user_id: None,
                is_admin: false,
                timestamp: 1,
            }],
            &[],
            1,
        )
        .unwrap();

    let backends = Backends::new(kv, Arc::new(store));
    let server = PixboardServer::bind(test_config(2, 2), backends).await.unwrap();
    let hub = server.hub();
    let mut client = TestClient::connect(&hub).await;

    client.send(ClientMessage::RequestInit);
    let ServerMessage::Init(init) = client.recv().await else {
        panic!("expected init");
    };
    assert_eq!(init.grid, cells);
    assert_eq!(init.total_pixels, 1);
}

#[tokio::test]
async fn canvas_survives_restart_on_file_backends() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let (kv, store) = pixboard_testkit::open_backends(dir.path()).unwrap();
        let server = PixboardServer::bind(
            test_config(8, 8),
            Backends::new(Arc::new(kv), Arc::new(store)),
        )
        .await
        .unwrap();
        let hub = server.hub();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run(async {
            let _ = stop_rx.await;
        }));

        let mut client = TestClient::connect(&hub).await;
        client.send(ClientMessage::PlacePixel(
            PlacePixel::new(3, 4, "#336699").with_user("erin"),
        ));
        client.recv().await;

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    let (kv, store) = pixboard_testkit::open_backends(dir.path()).unwrap();
    assert_eq!(store.count_placements().unwrap(), 1);
    assert!(store.last_active("erin").is_some());

    let server = PixboardServer::bind(
        test_config(8, 8),
        Backends::new(Arc::new(kv), Arc::new(store)),
    )
    .await
    .unwrap();
    let mut client = TestClient::connect(&server.hub()).await;
    client.send(ClientMessage::RequestInit);
    let ServerMessage::Init(init) = client.recv().await else {
        panic!("expected init");
    };
    assert_eq!(init.grid[4 * 8 + 3], "#336699");
    assert_eq!(init.total_pixels, 1);
}
