#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use nojoom_telemetry::settings::UploaderConfig;
use nojoom_telemetry::telemetry::{
    DeliveryError, DeliveryFuture, SharedToken, TelemetryEvent, TelemetryTransport,
    TelemetryUploader,
};
use tokio::sync::Notify;

pub const TOKEN: &str = "test-session-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Network,
    Status(u16),
}

impl Reply {
    fn into_result(self) -> Result<(), DeliveryError> {
        match self {
            Reply::Ok => Ok(()),
            Reply::Network => Err(DeliveryError::Network("connection refused".into())),
            Reply::Status(code) => Err(DeliveryError::Status { code }),
        }
    }
}

#[derive(Default)]
struct Script {
    single_reply: Option<Reply>,
    batch_reply: Option<Reply>,
    single_gate: Option<Arc<Notify>>,
    batch_gate: Option<Arc<Notify>>,
    singles: Vec<TelemetryEvent>,
    batches: Vec<Vec<TelemetryEvent>>,
    tokens: Vec<String>,
}

/// In-memory transport that records every call and answers as scripted.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_single(&self, reply: Reply) {
        self.script.lock().unwrap().single_reply = Some(reply);
    }

    pub fn reply_batch(&self, reply: Reply) {
        self.script.lock().unwrap().batch_reply = Some(reply);
    }

    /// Single sends block until the returned gate is notified.
    pub fn hold_singles(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().single_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Batch sends block until the returned gate is notified.
    pub fn hold_batches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().batch_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn release_batches(&self) {
        self.script.lock().unwrap().batch_gate = None;
    }

    pub fn singles(&self) -> Vec<TelemetryEvent> {
        self.script.lock().unwrap().singles.clone()
    }

    pub fn batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.script.lock().unwrap().batches.clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.script.lock().unwrap().tokens.clone()
    }

    pub fn call_count(&self) -> usize {
        let script = self.script.lock().unwrap();
        script.singles.len() + script.batches.len()
    }
}

impl TelemetryTransport for ScriptedTransport {
    fn send_single<'a>(&'a self, token: &'a str, event: &'a TelemetryEvent) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let (reply, gate) = {
                let mut script = self.script.lock().unwrap();
                script.singles.push(event.clone());
                script.tokens.push(token.to_string());
                (script.single_reply.unwrap_or(Reply::Ok), script.single_gate.clone())
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            reply.into_result()
        })
    }

    fn send_batch<'a>(&'a self, token: &'a str, events: &'a [TelemetryEvent]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let (reply, gate) = {
                let mut script = self.script.lock().unwrap();
                script.batches.push(events.to_vec());
                script.tokens.push(token.to_string());
                (script.batch_reply.unwrap_or(Reply::Ok), script.batch_gate.clone())
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            reply.into_result()
        })
    }
}

pub fn signed_in() -> SharedToken {
    SharedToken::new(Some(TOKEN.to_string()))
}

pub fn uploader_with(
    config: UploaderConfig,
    transport: &Arc<ScriptedTransport>,
    token: SharedToken,
) -> TelemetryUploader {
    TelemetryUploader::new(config, transport.clone(), Arc::new(token))
}

/// Enabled uploader, signed in, default timings.
pub fn uploader(transport: &Arc<ScriptedTransport>) -> TelemetryUploader {
    uploader_with(UploaderConfig::default(), transport, signed_in())
}

/// Let spawned tasks run until they park.
pub async fn yield_a_while() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
