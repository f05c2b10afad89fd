// Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use tetsuoni_bot::delivery::{ChatRef, ImageHost, Messenger, ProfileDirectory, Reply};
use tetsuoni_bot::error::DeliveryError;
use tetsuoni_bot::map::render::{MapRenderer, MarkerStyle};
use tetsuoni_bot::map::stations::{Coordinates, StationRegistry};
use tetsuoni_bot::map::teams::TeamAssignments;
use tetsuoni_bot::policy::CompletionPolicy;
use tetsuoni_bot::tracker::ParticipantTracker;
use tetsuoni_bot::workflow::Workflow;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Image host that keeps every upload in memory.
#[derive(Default)]
pub struct RecordingHost {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: bool,
}

impl RecordingHost {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn last_upload(&self) -> Option<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageHost for RecordingHost {
    async fn upload(&self, jpeg: Vec<u8>, name: &str) -> Result<String, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((name.to_string(), jpeg));
        Ok(format!("https://img.test/{}", uploads.len()))
    }
}

/// Messenger that records replies instead of sending them.
#[derive(Default)]
pub struct RecordingMessenger {
    pub replies: Mutex<Vec<(String, Reply)>>,
}

impl RecordingMessenger {
    pub fn replies(&self) -> Vec<(String, Reply)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply(&self, reply_token: &str, reply: &Reply) -> Result<(), DeliveryError> {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), reply.clone()));
        Ok(())
    }
}

/// Profile directory backed by a fixed table.
#[derive(Default)]
pub struct FixedDirectory {
    pub names: HashMap<String, String>,
}

impl FixedDirectory {
    pub fn with(names: &[(&str, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ProfileDirectory for FixedDirectory {
    async fn display_name(&self, _chat: &ChatRef, user_id: &str) -> Option<String> {
        self.names.get(user_id).cloned()
    }
}

/// Registry with `渋谷` at (100,100) and `東京` at (400,400) on a 500x500 map.
pub fn registry() -> Arc<StationRegistry> {
    Arc::new(
        StationRegistry::new(
            Coordinates::Pixel {
                reference_width: 500,
                reference_height: 500,
            },
            [("渋谷", (100.0, 100.0)), ("東京", (400.0, 400.0))],
        )
        .unwrap(),
    )
}

pub struct Harness {
    pub workflow: Arc<Workflow>,
    pub host: Arc<RecordingHost>,
}

pub fn harness(
    registry: Arc<StationRegistry>,
    renderer: MapRenderer,
    required: usize,
    allow_updates: bool,
    host: RecordingHost,
) -> Harness {
    let host = Arc::new(host);
    let tracker = ParticipantTracker::new(
        registry,
        CompletionPolicy::new(required).unwrap(),
        allow_updates,
    );
    let workflow = Workflow::new(
        tracker,
        Arc::new(renderer),
        Arc::new(TeamAssignments::default()),
        host.clone(),
        Arc::new(FixedDirectory::with(&[("U-alice", "alice"), ("U-bob", "bob")])),
    );
    Harness {
        workflow: Arc::new(workflow),
        host,
    }
}

/// Harness over a blank white 500x500 map.
pub fn white_map_harness(required: usize, allow_updates: bool, host: RecordingHost) -> Harness {
    let registry = registry();
    let renderer = MapRenderer::with_image(
        RgbImage::from_pixel(500, 500, WHITE),
        registry.clone(),
        MarkerStyle {
            radius: 10,
            outline_width: 2,
            ..MarkerStyle::default()
        },
        None,
    );
    harness(registry, renderer, required, allow_updates, host)
}
