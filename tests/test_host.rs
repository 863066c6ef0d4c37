//! Integration tests over the `printkit` facade.
//!
//! A G-code file on disk is streamed through a mock transport so the
//! whole stack runs together: file source, normalization, connection
//! worker, and the re-exported types the host binary is built from.

use printkit::{
    CommunicationState, ConnectionParams, JobOutcome, LineTransport, PrinterConnection, Result,
    SettingsManager,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Transport that acknowledges every write and records the wire
#[derive(Clone, Default)]
struct OkLink {
    sent: Arc<Mutex<Vec<String>>>,
    inbox: Arc<Mutex<VecDeque<String>>>,
}

impl OkLink {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl LineTransport for OkLink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.sent.lock().unwrap().push(line.to_string());
        self.inbox.lock().unwrap().push_back("ok".to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.inbox.lock().unwrap().pop_front())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}

async fn wait_for_state(connection: &PrinterConnection, want: CommunicationState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while connection.state() != want {
        if Instant::now() > deadline {
            panic!("timed out waiting for state {:?}", want);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn file_print_streams_the_normalized_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.gcode");
    std::fs::write(
        &path,
        "; generated by a slicer\nG28 ; home all\nM104 S210\nG1 X10 Y10 F3000\n\nG1 X20 Y15 E5.5 ; draw\nM400\n",
    )
    .unwrap();

    let params = ConnectionParams {
        port: "mock".to_string(),
        timeout_ms: 250,
        temperature_poll_secs: 0,
        ..Default::default()
    };
    let connection = PrinterConnection::new(params);
    let link = OkLink::default();

    connection.connect_with(Box::new(link.clone())).await.unwrap();
    connection.start_print(&path).await.unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    assert_eq!(
        link.sent(),
        vec![
            "G28",
            "M104 S210",
            "G1 X10 Y10 F3000",
            "G1 X20 Y15 E5.5",
            "M400"
        ]
    );

    let job = connection.job().unwrap();
    assert_eq!(*job.outcome(), JobOutcome::Completed);
    assert!(job.description().contains("cube.gcode"));

    let status = connection.status();
    assert_eq!(status.percent_complete, 100.0);
    assert_eq!(status.position.position.x, 20.0);
    assert_eq!(status.position.position.y, 15.0);
    assert_eq!(status.temperatures.hotend.target, 210.0);

    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), CommunicationState::Disconnected);
}

#[tokio::test]
async fn missing_file_is_rejected_before_touching_the_printer() {
    let connection = PrinterConnection::new(ConnectionParams {
        port: "mock".to_string(),
        ..Default::default()
    });
    let link = OkLink::default();
    connection.connect_with(Box::new(link.clone())).await.unwrap();

    let result = connection.start_print("/no/such/file.gcode").await;
    assert!(result.is_err());
    assert!(link.sent().is_empty());
    assert_eq!(connection.state(), CommunicationState::Connected);
}

#[test]
fn settings_round_trip_through_the_facade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut manager = SettingsManager::with_path(&path).unwrap();
    manager.config_mut().connection.baud_rate = 250_000;
    manager.config_mut().add_recent_file("/prints/cube.gcode".into());
    manager.save().unwrap();

    let reloaded = SettingsManager::with_path(&path).unwrap();
    assert_eq!(reloaded.config().connection.baud_rate, 250_000);
    assert_eq!(reloaded.config().recent_files.len(), 1);
}
