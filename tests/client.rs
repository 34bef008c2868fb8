//! SDK against a live collector on an ephemeral port

use std::sync::Arc;

use beaconlog::client::{
    generate_client_id, AnalyticsClient, ClientConfig, ClientError, EventDetails,
    RegistrationDetails,
};
use beaconlog::client::id::FIDESCTL_CLI;
use beaconlog::config::ServerConfig;
use beaconlog::server::{self, AppState};
use beaconlog::storage::{Storage, Warehouse};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Collector {
    _dir: TempDir,
    warehouse: Arc<Warehouse>,
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Collector {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let warehouse = Arc::new(Warehouse::open(dir.path().join("beaconlog.db"), 2).unwrap());
        let storage = Storage::new(warehouse.clone(), warehouse.clone());
        let state = AppState::new(storage, &ServerConfig::default()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server::serve(listener, state, async {
            let _ = rx.await;
        }));

        Self {
            _dir: dir,
            warehouse,
            url,
            shutdown: Some(tx),
            handle,
        }
    }

    fn client(&self) -> AnalyticsClient {
        let client_id = generate_client_id(FIDESCTL_CLI);
        AnalyticsClient::new(
            ClientConfig::new(client_id, "linux", "fidesctl", "1.0.0").server_url(&self.url),
        )
        .unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn events_reach_the_warehouse() {
    let collector = Collector::start().await;
    let client = collector.client();

    client
        .send_event(
            &EventDetails::new("cli_command", Utc::now() - Duration::seconds(1))
                .command("apply")
                .flags(["--dry", "--manifest=secret.yml"])
                .status_code(0),
        )
        .await
        .unwrap();

    let rows = collector.warehouse.recent_events(10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].command.as_deref(), Some("apply"));
    assert_eq!(rows[0].flags.as_deref(), Some("--dry, --manifest"));
    assert_eq!(rows[0].client_id, client.config().client_id);

    collector.stop().await;
}

#[tokio::test]
async fn duplicate_registration_surfaces_conflict() {
    let collector = Collector::start().await;
    let client = collector.client();
    let details = RegistrationDetails {
        email: "johndoe@example.com".to_string(),
        organization: "ACME".to_string(),
    };

    let registration = client.register(&details).await.unwrap();
    assert_eq!(registration.client_id, client.config().client_id);

    match client.register(&details).await {
        Err(ClientError::Send { status, .. }) => assert_eq!(status, 409),
        other => panic!("expected conflict, got {other:?}"),
    }

    collector.stop().await;
}

#[tokio::test]
async fn collector_rejects_unknown_version_header_name() {
    let collector = Collector::start().await;
    let client = AnalyticsClient::new(
        ClientConfig::new(generate_client_id(FIDESCTL_CLI), "linux", "fidesctl", "1.0.0")
            .server_url(&collector.url)
            .version_header("X-Other-Version"),
    )
    .unwrap();

    let details = EventDetails::new("cli_command", Utc::now() - Duration::seconds(1));
    match client.send_event(&details).await {
        Err(ClientError::Send { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Missing required header(s)");
        }
        other => panic!("expected missing header, got {other:?}"),
    }
    assert!(collector.warehouse.recent_events(10).unwrap().is_empty());

    collector.stop().await;
}
